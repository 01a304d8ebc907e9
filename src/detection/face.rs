use super::cascade::{HaarCascade, MultiScaleParams};
use super::types::{Detection, Detector, FrameDetections};
use crate::config::DetectorSettings;
use crate::error::Result;
use image::{imageops, GrayImage, RgbImage};
use imageproc::contrast::equalize_histogram;

/// Frontal face detection with a Haar cascade
pub struct FaceDetector {
    cascade: HaarCascade,
    params: MultiScaleParams,
    min_area: u32,
}

impl FaceDetector {
    /// Load the cascade named in `settings`; a missing or broken file is fatal
    pub fn new(settings: &DetectorSettings) -> Result<Self> {
        let cascade = HaarCascade::load(&settings.cascade_path)?;
        Ok(Self::with_cascade(cascade, settings))
    }

    pub fn with_cascade(cascade: HaarCascade, settings: &DetectorSettings) -> Self {
        Self {
            cascade,
            params: MultiScaleParams {
                scale_factor: settings.scale_factor,
                min_neighbors: settings.min_neighbors,
                min_size: (settings.min_face_size, settings.min_face_size),
                max_size: None,
            },
            min_area: settings.face_min_area,
        }
    }
}

/// Single-channel, histogram-equalised copy of the frame
pub fn equalized_luma(frame: &RgbImage) -> GrayImage {
    let gray = imageops::grayscale(frame);
    equalize_histogram(&gray)
}

impl Detector for FaceDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detection> {
        let _span = tracing::debug_span!("face_detect").entered();

        let gray = equalized_luma(frame);
        let candidates = self.cascade.detect_multi_scale(&gray, &self.params);
        let found = FrameDetections::from_candidates(candidates, self.min_area);
        tracing::debug!("{} faces", found.regions.len());

        Ok(Detection::Found(found))
    }

    fn name(&self) -> &str {
        "Face cascade"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::cascade::tests::{edge_image, EDGE_CASCADE};
    use crate::error::PipelineError;
    use image::{DynamicImage, Rgb};

    #[test]
    fn missing_cascade_file_is_fatal() {
        let settings = DetectorSettings {
            cascade_path: "/no/such/cascade.xml".into(),
            ..DetectorSettings::default()
        };
        let err = FaceDetector::new(&settings).err().unwrap();
        assert!(matches!(err, PipelineError::Cascade(_)));
    }

    #[test]
    fn equalization_stretches_a_dim_frame() {
        let frame = RgbImage::from_fn(16, 16, |x, _| {
            let v = 100 + x as u8;
            Rgb([v, v, v])
        });
        let gray = equalized_luma(&frame);
        let max = gray.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(max, 255);
    }

    #[test]
    fn detections_come_without_masks() {
        let cascade = HaarCascade::parse(EDGE_CASCADE).unwrap();
        let settings = DetectorSettings {
            min_face_size: 24,
            ..DetectorSettings::default()
        };
        let mut detector = FaceDetector::with_cascade(cascade, &settings);

        let frame = DynamicImage::ImageLuma8(edge_image(48, 24)).to_rgb8();
        let detection = detector.detect(&frame).unwrap();
        let found = detection.detections().unwrap();
        assert!(!found.regions.is_empty());
        assert!(found.mask.is_none());
        assert!(found.contours.is_empty());
    }
}
