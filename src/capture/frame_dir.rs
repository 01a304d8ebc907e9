use super::VideoSource;
use crate::error::{PipelineError, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Directory of still images played back in file-name order
pub struct FrameDirectory {
    files: Vec<PathBuf>,
    cursor: usize,
    width: u32,
    height: u32,
}

impl FrameDirectory {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        tracing::info!("Reading frame directory {}", dir.display());

        let entries =
            std::fs::read_dir(dir).map_err(|err| PipelineError::unreadable(dir, err.to_string()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    FRAME_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                });
            if path.is_file() && is_frame {
                files.push(path);
            }
        }
        files.sort();

        let first = files
            .first()
            .ok_or_else(|| PipelineError::unreadable(dir, "directory holds no image frames"))?;
        let (width, height) = image::image_dimensions(first)
            .map_err(|err| PipelineError::unreadable(first, err.to_string()))?;

        tracing::info!("Found {} frames at {}x{}", files.len(), width, height);

        Ok(Self {
            files,
            cursor: 0,
            width,
            height,
        })
    }
}

impl VideoSource for FrameDirectory {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let frame = image::open(path)?.to_rgb8();
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn frame_count(&self) -> u64 {
        self.files.len() as u64
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
