//! Detectors backed by OpenCV's own background subtractor and cascade classifier

use super::types::{Detection, Detector, FrameDetections, Region};
use crate::config::DetectorSettings;
use crate::cvmat;
use crate::error::{PipelineError, Result};
use image::RgbImage;
use imageproc::point::Point as Pixel;
use opencv::{
    core::{self, Mat, Point, Ptr, Rect, Scalar, Size, Vector, BORDER_CONSTANT},
    imgproc::{self, CHAIN_APPROX_NONE, MORPH_ELLIPSE, MORPH_OPEN, RETR_EXTERNAL},
    objdetect,
    prelude::*,
    video::{self, BackgroundSubtractorMOG2},
};
use std::path::Path;

/// Mask values above this are foreground; shadows sit below it
const FOREGROUND_THRESHOLD: f64 = 200.0;

/// MOG2 through `cv::BackgroundSubtractorMOG2`
pub struct OpenCvMog2Detector {
    history: u32,
    var_threshold: f32,
    detect_shadows: bool,
    noise_reduction: bool,
    kernel_size: u32,
    min_area: u32,
    subtractor: Option<Ptr<BackgroundSubtractorMOG2>>,
    dimensions: (u32, u32),
    initializations: u32,
}

impl OpenCvMog2Detector {
    pub fn new(settings: &DetectorSettings) -> Self {
        Self {
            history: settings.history,
            var_threshold: settings.var_threshold,
            detect_shadows: settings.detect_shadows,
            noise_reduction: settings.noise_reduction,
            kernel_size: settings.kernel_size,
            min_area: settings.min_area,
            subtractor: None,
            dimensions: (0, 0),
            initializations: 0,
        }
    }

    pub fn initializations(&self) -> u32 {
        self.initializations
    }

    fn ensure_subtractor(&mut self, dimensions: (u32, u32)) -> Result<()> {
        if self.subtractor.is_some() {
            // OpenCV silently reinitialises on a size change; treat it as an error instead
            if dimensions != self.dimensions {
                return Err(PipelineError::FrameSizeMismatch {
                    expected: self.dimensions,
                    actual: dimensions,
                });
            }
            return Ok(());
        }

        tracing::info!(
            "Initializing OpenCV MOG2 detection: history={}, threshold={}, shadows={}",
            self.history,
            self.var_threshold,
            self.detect_shadows
        );
        self.subtractor = Some(video::create_background_subtractor_mog2(
            self.history as i32,
            self.var_threshold as f64,
            self.detect_shadows,
        )?);
        self.dimensions = dimensions;
        self.initializations += 1;
        Ok(())
    }

    fn open(&self, mask: &Mat) -> Result<Mat> {
        let side = self.kernel_size as i32;
        let kernel = imgproc::get_structuring_element(
            MORPH_ELLIPSE,
            Size::new(side, side),
            Point::new(-1, -1),
        )?;
        let mut opened = Mat::default();
        imgproc::morphology_ex(
            mask,
            &mut opened,
            MORPH_OPEN,
            &kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            Scalar::default(),
        )?;
        Ok(opened)
    }
}

fn contour_regions(mask: &Mat) -> Result<(Vec<Vec<Pixel<i32>>>, Vec<Region>)> {
    let mut binary = Mat::default();
    imgproc::threshold(mask, &mut binary, FOREGROUND_THRESHOLD, 255.0, imgproc::THRESH_BINARY)?;

    let mut found: Vector<Vector<Point>> = Vector::new();
    imgproc::find_contours(
        &mut binary,
        &mut found,
        RETR_EXTERNAL,
        CHAIN_APPROX_NONE,
        Point::new(0, 0),
    )?;

    let mut contours = Vec::with_capacity(found.len());
    let mut regions = Vec::with_capacity(found.len());
    for contour in found.iter() {
        let rect = imgproc::bounding_rect(&contour)?;
        regions.push(Region::new(rect.x, rect.y, rect.width as u32, rect.height as u32));
        contours.push(contour.iter().map(|p| Pixel::new(p.x, p.y)).collect());
    }
    Ok((contours, regions))
}

impl Detector for OpenCvMog2Detector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detection> {
        let _span = tracing::debug_span!("mog2_detect").entered();

        self.ensure_subtractor(frame.dimensions())?;
        let bgr = cvmat::rgb_to_bgr(frame)?;
        let mut raw = Mat::default();
        if let Some(subtractor) = self.subtractor.as_mut() {
            video::BackgroundSubtractorTrait::apply(subtractor, &bgr, &mut raw, -1.0)?;
        }

        let opened = if self.noise_reduction {
            Some(self.open(&raw)?)
        } else {
            None
        };
        let (contours, candidates) = contour_regions(opened.as_ref().unwrap_or(&raw))?;

        let mut found = FrameDetections::from_candidates(candidates, self.min_area);
        tracing::debug!(
            "{} contours, {} regions above {} px",
            contours.len(),
            found.regions.len(),
            self.min_area
        );
        found.contours = contours;
        found.mask = Some(cvmat::mat_to_gray(&raw)?);
        found.denoised_mask = opened.as_ref().map(cvmat::mat_to_gray).transpose()?;

        Ok(Detection::Found(found))
    }

    fn name(&self) -> &str {
        "MOG2 (OpenCV)"
    }
}

/// Frontal faces through `cv::CascadeClassifier`
pub struct OpenCvFaceDetector {
    classifier: objdetect::CascadeClassifier,
    scale_factor: f64,
    min_neighbors: i32,
    min_size: Size,
    min_area: u32,
}

impl OpenCvFaceDetector {
    /// Load the cascade named in `settings`; a missing or broken file is fatal
    pub fn new(settings: &DetectorSettings) -> Result<Self> {
        let path = settings.cascade_path.as_path();
        let classifier = load_classifier(path)?;
        tracing::info!("Loaded cascade {} with OpenCV", path.display());
        let side = settings.min_face_size as i32;
        Ok(Self {
            classifier,
            scale_factor: settings.scale_factor as f64,
            min_neighbors: settings.min_neighbors as i32,
            min_size: Size::new(side, side),
            min_area: settings.face_min_area,
        })
    }
}

fn load_classifier(path: &Path) -> Result<objdetect::CascadeClassifier> {
    if !path.is_file() {
        return Err(PipelineError::cascade(format!(
            "cannot read {}: no such file",
            path.display()
        )));
    }
    let name = path
        .to_str()
        .ok_or_else(|| PipelineError::cascade(format!("{} is not valid UTF-8", path.display())))?;
    let classifier = objdetect::CascadeClassifier::new(name)
        .map_err(|err| PipelineError::cascade(format!("{}: {}", path.display(), err)))?;
    if classifier.empty()? {
        return Err(PipelineError::cascade(format!(
            "{} holds no usable classifier",
            path.display()
        )));
    }
    Ok(classifier)
}

impl Detector for OpenCvFaceDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detection> {
        let _span = tracing::debug_span!("face_detect").entered();

        let gray = cvmat::rgb_to_gray(frame)?;
        let mut equalized = Mat::default();
        imgproc::equalize_hist(&gray, &mut equalized)?;

        let mut faces = core::Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            &equalized,
            &mut faces,
            self.scale_factor,
            self.min_neighbors,
            0,
            self.min_size,
            Size::default(),
        )?;

        let candidates = faces
            .iter()
            .map(|rect| Region::new(rect.x, rect.y, rect.width as u32, rect.height as u32))
            .collect();
        let found = FrameDetections::from_candidates(candidates, self.min_area);
        tracing::debug!("{} faces", found.regions.len());

        Ok(Detection::Found(found))
    }

    fn name(&self) -> &str {
        "Face cascade (OpenCV)"
    }
}
