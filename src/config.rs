use crate::error::{PipelineError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Video used when the "Default" menu entry is chosen
pub const DEFAULT_VIDEO: &str = "seq_01.mp4";

/// Cascade file looked up in the working directory unless overridden
pub const DEFAULT_CASCADE: &str = "haarcascade_frontalface_default.xml";

/// Which detection strategy a run uses. Chosen once, before any frame is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// Background subtraction A. Never subtracts anything.
    Mog,
    /// Background subtraction B, Gaussian mixture with optional noise reduction.
    Mog2,
    /// Haar cascade frontal face detection.
    Face,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 3] = [DetectorKind::Mog, DetectorKind::Mog2, DetectorKind::Face];

    pub fn menu_id(self) -> u32 {
        match self {
            DetectorKind::Mog => 1,
            DetectorKind::Mog2 => 2,
            DetectorKind::Face => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DetectorKind::Mog => "MOG",
            DetectorKind::Mog2 => "MOG2",
            DetectorKind::Face => "Face cascade",
        }
    }

    /// Background-subtraction detectors produce masks worth displaying and saving.
    pub fn produces_mask(self) -> bool {
        matches!(self, DetectorKind::Mog | DetectorKind::Mog2)
    }
}

impl TryFrom<u32> for DetectorKind {
    type Error = PipelineError;

    fn try_from(id: u32) -> Result<Self> {
        DetectorKind::ALL
            .into_iter()
            .find(|kind| kind.menu_id() == id)
            .ok_or(PipelineError::UnknownDetectorType(id))
    }
}

/// Parameters shared by the detector implementations
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Apply a morphological opening to the foreground mask
    pub noise_reduction: bool,
    /// Width and height of the elliptical opening kernel
    pub kernel_size: u32,
    /// Subtraction regions must be strictly larger than this
    pub min_area: u32,
    pub history: u32,
    pub var_threshold: f32,
    pub detect_shadows: bool,
    pub cascade_path: PathBuf,
    pub scale_factor: f32,
    pub min_neighbors: u32,
    /// Smallest face window, in pixels per side
    pub min_face_size: u32,
    /// Face regions must be strictly larger than this
    pub face_min_area: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            noise_reduction: false,
            kernel_size: 6,
            min_area: 100,
            history: 500,
            var_threshold: 16.0,
            detect_shadows: true,
            cascade_path: PathBuf::from(DEFAULT_CASCADE),
            scale_factor: 1.1,
            min_neighbors: 3,
            min_face_size: 50,
            face_min_area: 1,
        }
    }
}

/// Everything a run needs, fixed once the run starts
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub video: PathBuf,
    pub detector: DetectorKind,
    pub settings: DetectorSettings,
    /// Show frames and masks on the display
    pub show_playback: bool,
    /// Block for a key every N frames; `None` plays continuously
    pub pause_every: Option<u32>,
    /// Delay between frames during continuous playback
    pub playback_delay: Duration,
    /// Save snapshots every `save_every` frames
    pub save_frames: bool,
    pub save_every: u32,
    /// Root for snapshot folders; defaults to the video's own directory
    pub output_root: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new<P: Into<PathBuf>>(video: P, detector: DetectorKind) -> Self {
        Self {
            video: video.into(),
            detector,
            settings: DetectorSettings::default(),
            show_playback: true,
            pause_every: Some(10),
            playback_delay: Duration::from_millis(24),
            save_frames: false,
            save_every: 10,
            output_root: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pause_every == Some(0) {
            return Err(PipelineError::selection("pause interval must be at least 1"));
        }
        if self.save_every == 0 {
            return Err(PipelineError::selection("save interval must be at least 1"));
        }
        if self.settings.kernel_size == 0 {
            return Err(PipelineError::selection("kernel size must be at least 1"));
        }
        if self.settings.scale_factor <= 1.0 {
            return Err(PipelineError::selection("scale factor must be greater than 1"));
        }
        Ok(())
    }
}
