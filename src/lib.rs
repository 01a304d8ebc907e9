//! Motion and face detection over video files
//!
//! A run reads frames from a [`capture::VideoSource`], hands each one to a
//! [`detection::Detector`], draws the result with [`overlay`] and shows or
//! saves it through [`output`].

pub mod capture;
pub mod config;
#[cfg(feature = "opencv")]
pub mod cvmat;
pub mod detection;
pub mod error;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod prompt;

pub use config::{DetectorKind, DetectorSettings, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{analyze, start_analysis, Pipeline, RunSummary, StopReason, Tally};
