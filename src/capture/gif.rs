use super::VideoSource;
use crate::error::{PipelineError, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, RgbImage};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Animated GIF decoded up front into composited RGB frames
pub struct GifSource {
    frames: VecDeque<RgbImage>,
    total: u64,
    width: u32,
    height: u32,
}

impl GifSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Decoding GIF video {}", path.display());

        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => PipelineError::not_found(path),
            _ => PipelineError::unreadable(path, err.to_string()),
        })?;

        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|err| PipelineError::unreadable(path, err.to_string()))?;

        let frames: VecDeque<RgbImage> = decoder
            .into_frames()
            .collect_frames()
            .map_err(|err| PipelineError::unreadable(path, err.to_string()))?
            .into_iter()
            .map(|frame| DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8())
            .collect();

        let (width, height) = frames
            .front()
            .map(|frame| frame.dimensions())
            .ok_or_else(|| PipelineError::unreadable(path, "GIF has no frames"))?;

        tracing::info!("Found {} frames at {}x{}", frames.len(), width, height);

        Ok(Self {
            total: frames.len() as u64,
            frames,
            width,
            height,
        })
    }
}

impl VideoSource for GifSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }

    fn frame_count(&self) -> u64 {
        self.total
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
