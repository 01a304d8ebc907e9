//! Error types for the detection pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the pipeline library
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a video could not be opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOpenKind {
    NotFound,
    Unreadable(String),
}

impl std::fmt::Display for SourceOpenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceOpenKind::NotFound => write!(f, "file not found"),
            SourceOpenKind::Unreadable(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// Errors that can end a run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not open video {}: {kind}", path.display())]
    SourceOpen { path: PathBuf, kind: SourceOpenKind },

    #[error("Not a valid choice: {0}")]
    InvalidSelection(String),

    #[error("Non-valid analysis type {0}")]
    UnknownDetectorType(u32),

    #[error("Cascade model error: {0}")]
    Cascade(String),

    #[error("Frame size {actual:?} does not match background model size {expected:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Cannot derive an output folder from video path {}", .0.display())]
    InvalidVideoPath(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl PipelineError {
    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        Self::SourceOpen {
            path: path.into(),
            kind: SourceOpenKind::NotFound,
        }
    }

    pub fn unreadable<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::SourceOpen {
            path: path.into(),
            kind: SourceOpenKind::Unreadable(reason.into()),
        }
    }

    pub fn cascade<S: Into<String>>(msg: S) -> Self {
        Self::Cascade(msg.into())
    }

    pub fn selection<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSelection(msg.into())
    }

    /// Errors that end the run quietly after being logged, the way a bad menu
    /// answer or a missing video does.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::SourceOpen { .. } | Self::InvalidSelection(_) | Self::UnknownDetectorType(_)
        )
    }
}
