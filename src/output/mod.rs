mod console;
#[cfg(feature = "opencv")]
mod highgui;
mod snapshot;

pub use console::{ConsoleDisplay, NullDisplay};
#[cfg(feature = "opencv")]
pub use highgui::HighGuiDisplay;
pub use snapshot::{snapshot_dir, SnapshotKind, SnapshotWriter};

use crate::error::Result;
use image::{GrayImage, RgbImage};
use std::time::Duration;

pub const WINDOW_VIDEO: &str = "Video";
pub const WINDOW_MASK: &str = "Foreground";
pub const WINDOW_DENOISED: &str = "Foreground (denoised)";

/// How long the loop waits for a key after showing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Continuous playback
    Delay(Duration),
    /// Halt until a key arrives
    Block,
}

/// Keys the interaction loop understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Save,
    Correct,
    Wrong,
    Both,
    Quit,
    Other(char),
}

impl Key {
    pub fn from_char(ch: char) -> Self {
        match ch.to_ascii_lowercase() {
            's' => Key::Save,
            'c' => Key::Correct,
            'w' => Key::Wrong,
            'b' => Key::Both,
            'q' | '\u{1b}' => Key::Quit,
            other => Key::Other(other),
        }
    }

    /// Decode a raw key code as returned by window toolkits
    pub fn from_code(code: i32) -> Option<Self> {
        if code < 0 {
            return None;
        }
        char::from_u32((code & 0xff) as u32).map(Key::from_char)
    }
}

/// Trait for display surfaces
pub trait Display {
    fn show_frame(&mut self, window: &str, frame: &RgbImage) -> Result<()>;

    fn show_mask(&mut self, window: &str, mask: &GrayImage) -> Result<()>;

    /// Wait according to `pacing`, returning the key pressed if any
    fn wait_key(&mut self, pacing: Pacing) -> Result<Option<Key>>;

    /// Tear down every window; called once when the loop ends
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
