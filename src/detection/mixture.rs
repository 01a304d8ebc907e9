use crate::error::{PipelineError, Result};
use image::{GrayImage, Luma, RgbImage};
use ndarray::{Array2, Array3, Array4};

/// Gaussian components tracked per pixel
pub const MAX_MODES: usize = 5;

const CHANNELS: usize = 3;

/// Tuning of the per-pixel mixture model
#[derive(Debug, Clone)]
pub struct MixtureParams {
    /// Number of frames the model effectively remembers
    pub history: u32,
    /// Squared Mahalanobis distance under which a pixel counts as background
    pub var_threshold: f32,
    pub detect_shadows: bool,
    /// Share of total weight that makes up the background
    pub background_ratio: f32,
    /// Squared distance under which a pixel updates an existing mode
    pub var_threshold_gen: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    pub complexity_reduction: f32,
    pub shadow_value: u8,
    /// Darkest brightness ratio still treated as a shadow
    pub shadow_threshold: f32,
}

impl MixtureParams {
    pub fn new(history: u32, var_threshold: f32, detect_shadows: bool) -> Self {
        Self {
            history,
            var_threshold,
            detect_shadows,
            ..Self::default()
        }
    }

    pub fn learning_rate(&self) -> f32 {
        1.0 / self.history.max(1) as f32
    }
}

impl Default for MixtureParams {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 16.0,
            detect_shadows: true,
            background_ratio: 0.9,
            var_threshold_gen: 9.0,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            complexity_reduction: 0.05,
            shadow_value: 127,
            shadow_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Mode {
    weight: f32,
    variance: f32,
    mean: [f32; CHANNELS],
}

/// Adaptive per-pixel Gaussian mixture background model
///
/// Modes are kept sorted by weight, strongest first. The first frame seeds one
/// mode per pixel and is reported as pure background.
pub struct GaussianMixture {
    params: MixtureParams,
    width: u32,
    height: u32,
    weights: Array3<f32>,
    variances: Array3<f32>,
    means: Array4<f32>,
    counts: Array2<u8>,
    frames_seen: u64,
}

impl GaussianMixture {
    pub fn new(params: MixtureParams, width: u32, height: u32) -> Self {
        let (h, w) = (height as usize, width as usize);
        Self {
            params,
            width,
            height,
            weights: Array3::zeros((h, w, MAX_MODES)),
            variances: Array3::zeros((h, w, MAX_MODES)),
            means: Array4::zeros((h, w, MAX_MODES, CHANNELS)),
            counts: Array2::zeros((h, w)),
            frames_seen: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Update the model with `frame` and classify its pixels
    ///
    /// Mask values: 0 background, `shadow_value` shadow, 255 foreground.
    pub fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        if frame.dimensions() != self.dimensions() {
            return Err(PipelineError::FrameSizeMismatch {
                expected: self.dimensions(),
                actual: frame.dimensions(),
            });
        }

        let mut mask = GrayImage::new(self.width, self.height);

        if self.frames_seen == 0 {
            self.seed(frame);
            self.frames_seen = 1;
            return Ok(mask);
        }
        self.frames_seen += 1;

        let alpha = self.params.learning_rate();
        for (x, y, pixel) in frame.enumerate_pixels() {
            let (row, col) = (y as usize, x as usize);
            let data = [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];

            let (mut modes, mut count) = self.load(row, col);
            let background = update_pixel(&self.params, alpha, &mut modes, &mut count, data);

            let value = if background {
                0
            } else if self.params.detect_shadows && is_shadow(&self.params, &modes[..count], data) {
                self.params.shadow_value
            } else {
                255
            };

            self.store(row, col, &modes, count);
            mask.put_pixel(x, y, Luma([value]));
        }

        Ok(mask)
    }

    fn seed(&mut self, frame: &RgbImage) {
        for (x, y, pixel) in frame.enumerate_pixels() {
            let (row, col) = (y as usize, x as usize);
            self.counts[[row, col]] = 1;
            self.weights[[row, col, 0]] = 1.0;
            self.variances[[row, col, 0]] = self.params.var_init;
            for c in 0..CHANNELS {
                self.means[[row, col, 0, c]] = pixel[c] as f32;
            }
        }
    }

    fn load(&self, row: usize, col: usize) -> ([Mode; MAX_MODES], usize) {
        let count = self.counts[[row, col]] as usize;
        let mut modes = [Mode::default(); MAX_MODES];
        for (k, mode) in modes.iter_mut().enumerate().take(count) {
            mode.weight = self.weights[[row, col, k]];
            mode.variance = self.variances[[row, col, k]];
            for c in 0..CHANNELS {
                mode.mean[c] = self.means[[row, col, k, c]];
            }
        }
        (modes, count)
    }

    fn store(&mut self, row: usize, col: usize, modes: &[Mode; MAX_MODES], count: usize) {
        self.counts[[row, col]] = count as u8;
        for (k, mode) in modes.iter().enumerate().take(count) {
            self.weights[[row, col, k]] = mode.weight;
            self.variances[[row, col, k]] = mode.variance;
            for c in 0..CHANNELS {
                self.means[[row, col, k, c]] = mode.mean[c];
            }
        }
    }
}

fn distance2(mean: &[f32; CHANNELS], data: &[f32; CHANNELS]) -> f32 {
    mean.iter()
        .zip(data)
        .map(|(m, d)| (m - d) * (m - d))
        .sum()
}

/// Fold one observation into a pixel's modes, returning whether it is background
fn update_pixel(
    params: &MixtureParams,
    alpha: f32,
    modes: &mut [Mode; MAX_MODES],
    count: &mut usize,
    data: [f32; CHANNELS],
) -> bool {
    let decay = 1.0 - alpha;
    let prune = -alpha * params.complexity_reduction;

    let mut fits = false;
    let mut background = false;
    let mut total_weight = 0.0f32;

    for mode in modes[..*count].iter_mut() {
        let mut weight = decay * mode.weight + prune;

        if !fits {
            let dist2 = distance2(&mode.mean, &data);

            if total_weight < params.background_ratio
                && dist2 < params.var_threshold * mode.variance
            {
                background = true;
            }

            if dist2 < params.var_threshold_gen * mode.variance {
                fits = true;
                weight += alpha;
                let k = alpha / weight;
                for (m, d) in mode.mean.iter_mut().zip(&data) {
                    *m -= k * (*m - d);
                }
                mode.variance = (mode.variance + k * (dist2 - mode.variance))
                    .clamp(params.var_min, params.var_max);
            }
        }

        mode.weight = weight;
        total_weight += weight;
    }

    // drop modes whose weight decayed away
    let mut kept = 0;
    for i in 0..*count {
        if modes[i].weight >= -prune {
            modes[kept] = modes[i];
            kept += 1;
        }
    }

    if !fits {
        let slot = if kept < MAX_MODES {
            kept += 1;
            kept - 1
        } else {
            weakest(&modes[..kept])
        };
        modes[slot] = Mode {
            weight: if kept == 1 { 1.0 } else { alpha },
            variance: params.var_init,
            mean: data,
        };
    }
    *count = kept;

    let sum: f32 = modes[..kept].iter().map(|mode| mode.weight).sum();
    if sum > 0.0 {
        for mode in modes[..kept].iter_mut() {
            mode.weight /= sum;
        }
    }
    modes[..kept].sort_by(|a, b| b.weight.total_cmp(&a.weight));

    background
}

fn weakest(modes: &[Mode]) -> usize {
    modes
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.weight.total_cmp(&b.weight))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

/// A pixel is a shadow when it is a uniformly darker copy of a background mode
fn is_shadow(params: &MixtureParams, modes: &[Mode], data: [f32; CHANNELS]) -> bool {
    let mut total_weight = 0.0f32;

    for mode in modes {
        let numerator: f32 = mode.mean.iter().zip(&data).map(|(m, d)| m * d).sum();
        let denominator: f32 = mode.mean.iter().map(|m| m * m).sum();
        if denominator == 0.0 {
            return false;
        }

        if numerator <= denominator && numerator >= params.shadow_threshold * denominator {
            let a = numerator / denominator;
            let dist2a: f32 = mode
                .mean
                .iter()
                .zip(&data)
                .map(|(m, d)| (a * m - d) * (a * m - d))
                .sum();
            if dist2a < params.var_threshold * mode.variance * a * a {
                return true;
            }
        }

        total_weight += mode.weight;
        if total_weight > params.background_ratio {
            return false;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn flat(shade: u8) -> RgbImage {
        RgbImage::from_pixel(16, 12, Rgb([shade, shade, shade]))
    }

    fn with_patch(shade: u8, patch: u8) -> RgbImage {
        let mut frame = flat(shade);
        for y in 4..8 {
            for x in 4..8 {
                frame.put_pixel(x, y, Rgb([patch, patch, patch]));
            }
        }
        frame
    }

    #[test]
    fn first_frame_seeds_an_empty_mask() {
        let mut model = GaussianMixture::new(MixtureParams::default(), 16, 12);
        let mask = model.apply(&with_patch(10, 250)).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
        assert_eq!(model.frames_seen(), 1);
    }

    #[test]
    fn static_scene_stays_background() {
        let mut model = GaussianMixture::new(MixtureParams::default(), 16, 12);
        for _ in 0..20 {
            let mask = model.apply(&flat(40)).unwrap();
            assert!(mask.pixels().all(|p| p[0] == 0));
        }
    }

    #[test]
    fn new_object_is_foreground_until_it_leaves() {
        let mut model = GaussianMixture::new(MixtureParams::default(), 16, 12);
        model.apply(&flat(10)).unwrap();
        model.apply(&flat(10)).unwrap();

        for _ in 0..5 {
            let mask = model.apply(&with_patch(10, 250)).unwrap();
            assert_eq!(mask.get_pixel(5, 5)[0], 255);
            assert_eq!(mask.get_pixel(0, 0)[0], 0);
        }

        let mask = model.apply(&flat(10)).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn darker_copy_of_background_is_a_shadow() {
        let mut model = GaussianMixture::new(MixtureParams::default(), 16, 12);
        for _ in 0..3 {
            model.apply(&flat(200)).unwrap();
        }
        let mask = model.apply(&with_patch(200, 140)).unwrap();
        assert_eq!(mask.get_pixel(5, 5)[0], 127);

        let params = MixtureParams::new(500, 16.0, false);
        let mut model = GaussianMixture::new(params, 16, 12);
        for _ in 0..3 {
            model.apply(&flat(200)).unwrap();
        }
        let mask = model.apply(&with_patch(200, 140)).unwrap();
        assert_eq!(mask.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn mismatched_frame_size_is_rejected() {
        let mut model = GaussianMixture::new(MixtureParams::default(), 16, 12);
        let err = model.apply(&RgbImage::new(8, 8)).unwrap_err();
        assert!(matches!(err, PipelineError::FrameSizeMismatch { .. }));
    }

    #[test]
    fn modes_never_exceed_capacity() {
        let mut model = GaussianMixture::new(MixtureParams::default(), 16, 12);
        for shade in (0..=250u8).step_by(25) {
            model.apply(&flat(shade)).unwrap();
        }
        assert!(model.counts.iter().all(|&count| count as usize <= MAX_MODES));
        let weights: f32 = (0..model.counts[[0, 0]] as usize)
            .map(|k| model.weights[[0, 0, k]])
            .sum();
        assert!((weights - 1.0).abs() < 1e-3);
    }
}
