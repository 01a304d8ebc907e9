mod frame_dir;
mod gif;
#[cfg(feature = "opencv")]
mod opencv_file;

pub use frame_dir::FrameDirectory;
pub use gif::GifSource;
#[cfg(feature = "opencv")]
pub use opencv_file::OpenCvSource;

use crate::error::{PipelineError, Result};
use image::RgbImage;
use std::path::Path;

/// Trait for video sources
pub trait VideoSource {
    /// Read the next frame, `None` once the stream is exhausted
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Total number of frames, as reported by the backend
    fn frame_count(&self) -> u64;

    /// Get the resolution of decoded frames
    fn resolution(&self) -> (u32, u32);
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_frame()
    }

    fn frame_count(&self) -> u64 {
        (**self).frame_count()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }
}

/// Open a video by path, picking the backend from what the path points at
///
/// Directories are read as numbered still frames, `.gif` files are decoded
/// natively, everything else needs the `opencv` feature.
pub fn open_video<P: AsRef<Path>>(path: P) -> Result<Box<dyn VideoSource>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(PipelineError::not_found(path));
    }

    if path.is_dir() {
        return Ok(Box::new(FrameDirectory::open(path)?));
    }

    let is_gif = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"));
    if is_gif {
        return Ok(Box::new(GifSource::open(path)?));
    }

    open_container(path)
}

#[cfg(feature = "opencv")]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(OpenCvSource::open(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_container(path: &Path) -> Result<Box<dyn VideoSource>> {
    tracing::warn!(
        "{} needs a build with `--features opencv`; without it only .gif files and \
         frame directories can be opened",
        path.display()
    );
    Err(PipelineError::unreadable(
        path,
        "container not supported without the `opencv` feature (use a .gif or a frame directory)",
    ))
}
