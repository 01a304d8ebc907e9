use super::VideoSource;
use crate::cvmat;
use crate::error::{PipelineError, Result};
use image::RgbImage;
use opencv::{prelude::*, videoio};
use std::path::Path;

/// Video container decoded through OpenCV's VideoCapture
pub struct OpenCvSource {
    capture: videoio::VideoCapture,
    frame: Mat,
    total: u64,
    width: u32,
    height: u32,
    finished: bool,
}

impl OpenCvSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .to_str()
            .ok_or_else(|| PipelineError::unreadable(path, "path is not valid UTF-8"))?;

        let capture = videoio::VideoCapture::from_file(name, videoio::CAP_ANY)
            .map_err(|err| PipelineError::unreadable(path, err.to_string()))?;
        if !capture.is_opened()? {
            return Err(PipelineError::unreadable(path, "VideoCapture refused the file"));
        }

        let total = capture.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;

        tracing::info!(
            "Opened {} with OpenCV: {} frames at {}x{}",
            path.display(),
            total,
            width,
            height
        );

        Ok(Self {
            capture,
            frame: Mat::default(),
            total,
            width,
            height,
            finished: false,
        })
    }
}

impl VideoSource for OpenCvSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }
        if !self.capture.read(&mut self.frame)? || self.frame.empty() {
            self.finished = true;
            return Ok(None);
        }

        let frame = cvmat::bgr_to_rgb(&self.frame)?;
        if frame.dimensions() != (self.width, self.height) {
            return Err(PipelineError::FrameSizeMismatch {
                expected: (self.width, self.height),
                actual: frame.dimensions(),
            });
        }
        Ok(Some(frame))
    }

    fn frame_count(&self) -> u64 {
        self.total
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release() {
            tracing::warn!("Failed to release video capture: {}", err);
        }
    }
}
