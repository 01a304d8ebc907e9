use super::mixture::{GaussianMixture, MixtureParams};
use super::morphology::open_elliptical;
use super::regions::{bounding_regions, external_contours};
use super::types::{Detection, Detector, FrameDetections};
use crate::config::DetectorSettings;
use crate::error::Result;
use image::RgbImage;

/// Background subtraction A
///
/// Goes through lazy initialisation like a real subtractor, then reports
/// every frame as not implemented.
#[derive(Debug, Default)]
pub struct MogStub {
    initializations: u32,
}

impl MogStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initializations(&self) -> u32 {
        self.initializations
    }
}

impl Detector for MogStub {
    fn detect(&mut self, _frame: &RgbImage) -> Result<Detection> {
        if self.initializations == 0 {
            tracing::info!("Initializing MOG detection");
            tracing::warn!("MOG subtraction is not implemented; frames pass through undetected");
            self.initializations += 1;
        }
        Ok(Detection::NotImplemented { detector: "MOG" })
    }

    fn name(&self) -> &str {
        "MOG"
    }
}

/// Background subtraction B: Gaussian mixture, optional opening, external contours
pub struct Mog2Detector {
    params: MixtureParams,
    noise_reduction: bool,
    kernel_size: u32,
    min_area: u32,
    model: Option<GaussianMixture>,
    initializations: u32,
}

impl Mog2Detector {
    pub fn new(settings: &DetectorSettings) -> Self {
        Self {
            params: MixtureParams::new(
                settings.history,
                settings.var_threshold,
                settings.detect_shadows,
            ),
            noise_reduction: settings.noise_reduction,
            kernel_size: settings.kernel_size,
            min_area: settings.min_area,
            model: None,
            initializations: 0,
        }
    }

    /// How many times the background model has been created this run
    pub fn initializations(&self) -> u32 {
        self.initializations
    }

    fn model_for(&mut self, frame: &RgbImage) -> &mut GaussianMixture {
        let params = &self.params;
        let initializations = &mut self.initializations;
        self.model.get_or_insert_with(|| {
            let (width, height) = frame.dimensions();
            tracing::info!(
                "Initializing MOG2 detection: history={}, threshold={}, shadows={}",
                params.history,
                params.var_threshold,
                params.detect_shadows
            );
            *initializations += 1;
            GaussianMixture::new(params.clone(), width, height)
        })
    }
}

impl Detector for Mog2Detector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detection> {
        let _span = tracing::debug_span!("mog2_detect").entered();

        let mask = self.model_for(frame).apply(frame)?;
        let denoised = self
            .noise_reduction
            .then(|| open_elliptical(&mask, self.kernel_size));

        let contours = external_contours(denoised.as_ref().unwrap_or(&mask));
        let candidates = bounding_regions(&contours);

        let mut found = FrameDetections::from_candidates(candidates, self.min_area);
        tracing::debug!(
            "{} contours, {} regions above {} px",
            contours.len(),
            found.regions.len(),
            self.min_area
        );
        found.contours = contours;
        found.mask = Some(mask);
        found.denoised_mask = denoised;

        Ok(Detection::Found(found))
    }

    fn name(&self) -> &str {
        "MOG2"
    }
}
