use super::types::Region;
use image::GrayImage;
use imageproc::contours::{find_contours_with_threshold, BorderType};
use imageproc::point::Point;

/// Mask values above this are foreground; shadows sit below it
const FOREGROUND_THRESHOLD: u8 = 200;

/// Outer borders of top-level foreground blobs; holes and islands inside holes
/// are skipped
pub fn external_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours_with_threshold::<i32>(mask, FOREGROUND_THRESHOLD)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .map(|contour| contour.points)
        .collect()
}

/// Bounding rectangle of every contour
pub fn bounding_regions(contours: &[Vec<Point<i32>>]) -> Vec<Region> {
    contours
        .iter()
        .filter_map(|points| Region::bounding(points))
        .collect()
}
