use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_open, Mask};

/// Filled ellipse inscribed in a `width` x `height` box, anchored at its centre
///
/// Row extents follow the usual structuring-element construction: each row
/// spans `round(rx * sqrt(1 - dy^2 / ry^2))` pixels either side of the centre.
pub fn elliptical_kernel(width: u32, height: u32) -> GrayImage {
    let width = width.max(1);
    let height = height.max(1);
    let rx = (width / 2) as f64;
    let ry = (height / 2) as f64;
    let inv_rx2 = if rx > 0.0 { 1.0 / (rx * rx) } else { 0.0 };

    let mut kernel = GrayImage::new(width, height);
    for row in 0..height {
        let dy = row as f64 - ry;
        if dy.abs() > ry {
            continue;
        }
        let dx = (rx * ((ry * ry - dy * dy) * inv_rx2).sqrt()).round();
        let start = (rx - dx).max(0.0) as u32;
        let end = ((rx + dx + 1.0) as u32).min(width);
        for col in start..end {
            kernel.put_pixel(col, row, Luma([255]));
        }
    }
    kernel
}

/// Morphological opening of `mask` with an elliptical kernel of the given size
///
/// Even sizes grow by one so the kernel is symmetric about its anchor; the
/// opening then only ever removes foreground.
pub fn open_elliptical(mask: &GrayImage, size: u32) -> GrayImage {
    let _span = tracing::debug_span!("noise_reduction", size).entered();

    let side = (size | 1).min(255);
    let kernel = elliptical_kernel(side, side);
    let center = (side / 2) as u8;
    let element = Mask::from_image(&kernel, center, center);
    grayscale_open(mask, &element)
}
