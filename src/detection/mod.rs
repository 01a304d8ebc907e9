mod cascade;
mod face;
mod mixture;
mod morphology;
#[cfg(feature = "opencv")]
mod native;
mod regions;
mod subtractor;
pub mod types;

pub use cascade::{group_rectangles, HaarCascade, MultiScaleParams};
pub use face::{equalized_luma, FaceDetector};
pub use mixture::{GaussianMixture, MixtureParams};
pub use morphology::{elliptical_kernel, open_elliptical};
#[cfg(feature = "opencv")]
pub use native::{OpenCvFaceDetector, OpenCvMog2Detector};
pub use regions::{bounding_regions, external_contours};
pub use subtractor::{Mog2Detector, MogStub};
pub use types::{filter_by_area, Detection, Detector, FrameDetections, Region};

use crate::config::{DetectorKind, DetectorSettings};
use crate::error::Result;

/// Build the detector for `kind`
///
/// Loading the face cascade happens here, so a broken model file fails the
/// run before any frame is read. With the `opencv` feature MOG2 and the face
/// cascade run through OpenCV itself.
pub fn create_detector(
    kind: DetectorKind,
    settings: &DetectorSettings,
) -> Result<Box<dyn Detector>> {
    tracing::info!("Creating {} detector", kind.label());
    let detector: Box<dyn Detector> = match kind {
        DetectorKind::Mog => Box::new(MogStub::new()),
        #[cfg(feature = "opencv")]
        DetectorKind::Mog2 => Box::new(OpenCvMog2Detector::new(settings)),
        #[cfg(not(feature = "opencv"))]
        DetectorKind::Mog2 => Box::new(Mog2Detector::new(settings)),
        #[cfg(feature = "opencv")]
        DetectorKind::Face => Box::new(OpenCvFaceDetector::new(settings)?),
        #[cfg(not(feature = "opencv"))]
        DetectorKind::Face => Box::new(FaceDetector::new(settings)?),
    };
    Ok(detector)
}
