use crate::error::Result;
use image::{GrayImage, RgbImage};
use imageproc::point::Point;

/// Axis-aligned detection rectangle in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest region containing every point, edges inclusive
    pub fn bounding(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(
            min_x,
            min_y,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        ))
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Everything a working detector found in one frame
#[derive(Debug, Clone, Default)]
pub struct FrameDetections {
    /// Regions before the minimum-area filter
    pub candidates: Vec<Region>,
    /// Regions that passed the filter; these get drawn
    pub regions: Vec<Region>,
    /// Raw outlines, drawn as-is
    pub contours: Vec<Vec<Point<i32>>>,
    /// Foreground mask straight from the background model
    pub mask: Option<GrayImage>,
    /// Mask after noise reduction, when enabled
    pub denoised_mask: Option<GrayImage>,
}

impl FrameDetections {
    /// Keep only candidates strictly larger than `min_area`
    pub fn from_candidates(candidates: Vec<Region>, min_area: u32) -> Self {
        let regions = filter_by_area(&candidates, min_area);
        Self {
            candidates,
            regions,
            ..Self::default()
        }
    }
}

pub fn filter_by_area(regions: &[Region], min_area: u32) -> Vec<Region> {
    regions
        .iter()
        .copied()
        .filter(|region| region.area() > min_area as u64)
        .collect()
}

/// Outcome of running a detector on one frame
#[derive(Debug, Clone)]
pub enum Detection {
    Found(FrameDetections),
    /// The detector exists but performs no detection
    NotImplemented { detector: &'static str },
}

impl Detection {
    pub fn detections(&self) -> Option<&FrameDetections> {
        match self {
            Detection::Found(found) => Some(found),
            Detection::NotImplemented { .. } => None,
        }
    }

    pub fn regions(&self) -> &[Region] {
        self.detections()
            .map(|found| found.regions.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_implemented(&self) -> bool {
        matches!(self, Detection::Found(_))
    }
}

/// Common interface for frame detectors
///
/// Stateful detectors (background models) carry their state across calls for
/// the lifetime of a run.
pub trait Detector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Detection>;

    /// Get the detector name (for logging)
    fn name(&self) -> &str;
}
