use crate::error::{PipelineError, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// What a saved PNG holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Frame with overlays
    Original,
    /// Foreground mask
    Foreground,
    /// Foreground mask after noise reduction
    ForegroundDenoised,
}

impl SnapshotKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SnapshotKind::Original => "ori",
            SnapshotKind::Foreground => "fg",
            SnapshotKind::ForegroundDenoised => "fg_dup",
        }
    }

    pub fn file_name(self, frame_index: u64) -> String {
        format!("{}_{}.png", self.prefix(), frame_index)
    }
}

/// Per-video snapshot folder: `<root>/<video stem>`
///
/// `root` defaults to the directory holding the video.
pub fn snapshot_dir(video: &Path, root: Option<&Path>) -> Result<PathBuf> {
    let stem = video
        .file_stem()
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| PipelineError::InvalidVideoPath(video.to_path_buf()))?;
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => video.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(root.join(stem))
}

/// Writes PNG snapshots at maximum compression, creating the folder on first use
pub struct SnapshotWriter {
    dir: PathBuf,
    created: bool,
}

impl SnapshotWriter {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            created: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_frame(&mut self, frame_index: u64, frame: &RgbImage) -> Result<PathBuf> {
        self.write(
            SnapshotKind::Original,
            frame_index,
            frame.as_raw(),
            frame.dimensions(),
            ExtendedColorType::Rgb8,
        )
    }

    pub fn save_mask(
        &mut self,
        kind: SnapshotKind,
        frame_index: u64,
        mask: &GrayImage,
    ) -> Result<PathBuf> {
        self.write(kind, frame_index, mask.as_raw(), mask.dimensions(), ExtendedColorType::L8)
    }

    fn write(
        &mut self,
        kind: SnapshotKind,
        frame_index: u64,
        data: &[u8],
        (width, height): (u32, u32),
        color: ExtendedColorType,
    ) -> Result<PathBuf> {
        if !self.created {
            std::fs::create_dir_all(&self.dir)?;
            self.created = true;
        }

        let path = self.dir.join(kind.file_name(frame_index));
        let writer = BufWriter::new(File::create(&path)?);
        let encoder =
            PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
        encoder.write_image(data, width, height, color)?;

        tracing::debug!("Saved {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn folder_strips_the_extension() {
        let dir = snapshot_dir(Path::new("videos/seq_01.mp4"), None).unwrap();
        assert_eq!(dir, PathBuf::from("videos/seq_01"));

        let dir = snapshot_dir(Path::new("clip.webm"), Some(Path::new("out"))).unwrap();
        assert_eq!(dir, PathBuf::from("out/clip"));

        // no extension at all: the whole name is kept
        let dir = snapshot_dir(Path::new("frames/take2"), None).unwrap();
        assert_eq!(dir, PathBuf::from("frames/take2"));
    }

    #[test]
    fn path_without_a_name_is_rejected() {
        assert!(snapshot_dir(Path::new("/"), None).is_err());
    }

    #[test]
    fn writes_named_pngs_into_a_fresh_folder() {
        let root = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::new(root.path().join("seq_01"));

        let frame = RgbImage::from_pixel(6, 4, Rgb([10, 20, 30]));
        let mask = GrayImage::from_pixel(6, 4, Luma([255]));
        let ori = writer.save_frame(12, &frame).unwrap();
        let fg = writer.save_mask(SnapshotKind::Foreground, 12, &mask).unwrap();
        let dup = writer
            .save_mask(SnapshotKind::ForegroundDenoised, 12, &mask)
            .unwrap();

        assert!(ori.ends_with("seq_01/ori_12.png"));
        assert!(fg.ends_with("seq_01/fg_12.png"));
        assert!(dup.ends_with("seq_01/fg_dup_12.png"));

        let reread = image::open(&ori).unwrap().to_rgb8();
        assert_eq!(reread, frame);
        let reread = image::open(&fg).unwrap().to_luma8();
        assert_eq!(reread, mask);
    }
}
