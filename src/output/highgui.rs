use super::{Display, Key, Pacing};
use crate::cvmat;
use crate::error::Result;
use image::{GrayImage, RgbImage};
use opencv::highgui;
use std::collections::HashSet;

/// OpenCV HighGUI windows
#[derive(Default)]
pub struct HighGuiDisplay {
    windows: HashSet<String>,
}

impl HighGuiDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_window(&mut self, window: &str) -> Result<()> {
        if !self.windows.contains(window) {
            highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
            self.windows.insert(window.to_string());
        }
        Ok(())
    }
}

impl Display for HighGuiDisplay {
    fn show_frame(&mut self, window: &str, frame: &RgbImage) -> Result<()> {
        self.ensure_window(window)?;
        highgui::imshow(window, &cvmat::rgb_to_bgr(frame)?)?;
        Ok(())
    }

    fn show_mask(&mut self, window: &str, mask: &GrayImage) -> Result<()> {
        self.ensure_window(window)?;
        highgui::imshow(window, &cvmat::gray_to_mat(mask)?)?;
        Ok(())
    }

    fn wait_key(&mut self, pacing: Pacing) -> Result<Option<Key>> {
        let delay = match pacing {
            Pacing::Delay(delay) => (delay.as_millis() as i32).max(1),
            Pacing::Block => 0,
        };
        Ok(Key::from_code(highgui::wait_key(delay)?))
    }

    fn close(&mut self) -> Result<()> {
        highgui::destroy_all_windows()?;
        self.windows.clear();
        Ok(())
    }
}
