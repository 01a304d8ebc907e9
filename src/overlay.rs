//! Frame overlays: HUD text, contour outlines and detection boxes

use crate::detection::FrameDetections;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const HUD_ANCHOR: (i32, i32) = (10, 2);
const HUD_PADDING: u32 = 3;
const TEXT_SCALE: u32 = 2;
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const LINE_GAP: u32 = 2;

const HUD_BACKING: Rgb<u8> = Rgb([255, 255, 255]);
const HUD_TEXT: Rgb<u8> = Rgb([0, 0, 0]);
const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const NOTICE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Frame label, total-frame label and current-index label
pub fn hud_lines(index: u64, total: u64) -> [String; 3] {
    [
        "FRAME".to_string(),
        format!("TOTAL: {}", total),
        format!("INDEX: {}", index),
    ]
}

/// Draw the HUD at its fixed anchor and return the backing rectangle
///
/// The backing is repainted before the text, so drawing twice with the same
/// indices leaves the frame unchanged.
pub fn draw_hud(frame: &mut RgbImage, index: u64, total: u64) -> Rect {
    let lines = hud_lines(index, total);
    let longest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0) as u32;

    let advance = (GLYPH_WIDTH + 1) * TEXT_SCALE;
    let line_height = GLYPH_HEIGHT * TEXT_SCALE + LINE_GAP;
    let width = longest * advance + 2 * HUD_PADDING;
    let height = lines.len() as u32 * line_height + 2 * HUD_PADDING;

    let backing = Rect::at(HUD_ANCHOR.0, HUD_ANCHOR.1).of_size(width, height);
    draw_filled_rect_mut(frame, backing, HUD_BACKING);

    for (row, line) in lines.iter().enumerate() {
        let x = HUD_ANCHOR.0 + HUD_PADDING as i32;
        let y = HUD_ANCHOR.1 + (HUD_PADDING + row as u32 * line_height) as i32;
        draw_text(frame, line, x, y, HUD_TEXT);
    }

    backing
}

/// Outline every raw contour and box every region that passed the area filter
pub fn draw_detections(frame: &mut RgbImage, found: &FrameDetections) {
    let (width, height) = frame.dimensions();
    for contour in &found.contours {
        for point in contour {
            if point.x >= 0
                && point.y >= 0
                && (point.x as u32) < width
                && (point.y as u32) < height
            {
                frame.put_pixel(point.x as u32, point.y as u32, CONTOUR_COLOR);
            }
        }
    }

    for region in &found.regions {
        if region.width == 0 || region.height == 0 {
            continue;
        }
        let rect = Rect::at(region.x, region.y).of_size(region.width, region.height);
        draw_hollow_rect_mut(frame, rect, BOX_COLOR);
    }
}

/// One line of text under the HUD, used to flag detectors that do nothing
pub fn draw_notice(frame: &mut RgbImage, text: &str) {
    let y = frame.height() as i32 - (GLYPH_HEIGHT * TEXT_SCALE + HUD_PADDING) as i32;
    draw_text(frame, text, HUD_ANCHOR.0, y, NOTICE_COLOR);
}

/// Draw text with the built-in 5x7 font, clipped to the frame
pub fn draw_text(frame: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    let (width, height) = frame.dimensions();
    let advance = ((GLYPH_WIDTH + 1) * TEXT_SCALE) as i32;

    for (i, ch) in text.to_uppercase().chars().enumerate() {
        let origin_x = x + i as i32 * advance;
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..TEXT_SCALE {
                    for dx in 0..TEXT_SCALE {
                        let px = origin_x + (col * TEXT_SCALE + dx) as i32;
                        let py = y + (row as u32 * TEXT_SCALE + dy) as i32;
                        if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                            frame.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        ' ' => [0; 7],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Region;
    use imageproc::point::Point;

    #[test]
    fn hud_is_stable_when_redrawn() {
        let mut frame = RgbImage::from_pixel(200, 120, Rgb([30, 60, 90]));
        let first = draw_hud(&mut frame, 42, 300);
        let once = frame.clone();
        let second = draw_hud(&mut frame, 42, 300);

        assert_eq!(first, second);
        assert_eq!(once, frame);
    }

    #[test]
    fn hud_backing_sits_at_the_anchor() {
        let mut frame = RgbImage::new(200, 120);
        let backing = draw_hud(&mut frame, 7, 9);
        assert_eq!((backing.left(), backing.top()), HUD_ANCHOR);
        let corner = frame.get_pixel(HUD_ANCHOR.0 as u32, HUD_ANCHOR.1 as u32);
        assert_eq!(*corner, HUD_BACKING);
    }

    #[test]
    fn boxes_and_outlines_are_drawn() {
        let mut frame = RgbImage::new(50, 50);
        let found = FrameDetections {
            regions: vec![Region::new(10, 10, 20, 15)],
            contours: vec![vec![Point::new(40, 40), Point::new(41, 40), Point::new(60, 60)]],
            ..FrameDetections::default()
        };
        draw_detections(&mut frame, &found);

        assert_eq!(*frame.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*frame.get_pixel(29, 24), BOX_COLOR);
        assert_eq!(*frame.get_pixel(20, 17), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(40, 40), CONTOUR_COLOR);
    }

    #[test]
    fn text_is_clipped_at_the_frame_edge() {
        let mut frame = RgbImage::new(8, 8);
        draw_text(&mut frame, "8888", 2, 2, Rgb([255, 255, 255]));
        assert!(frame.pixels().any(|p| p[0] == 255));
    }
}
