use super::{Display, Key, Pacing};
use crate::error::Result;
use image::{GrayImage, RgbImage};
use std::io::{self, BufRead, StdinLock};

/// Display that shows nothing and never reports a key
#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show_frame(&mut self, _window: &str, _frame: &RgbImage) -> Result<()> {
        Ok(())
    }

    fn show_mask(&mut self, _window: &str, _mask: &GrayImage) -> Result<()> {
        Ok(())
    }

    fn wait_key(&mut self, _pacing: Pacing) -> Result<Option<Key>> {
        Ok(None)
    }
}

/// Terminal stand-in for a window: frames are logged, keys are read as lines
///
/// Blocking waits read one line and use its first character; an empty line or
/// end of input counts as "no key".
pub struct ConsoleDisplay<R> {
    input: R,
}

impl ConsoleDisplay<StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self::new(io::stdin().lock())
    }
}

impl<R: BufRead> ConsoleDisplay<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }
}

impl<R: BufRead> Display for ConsoleDisplay<R> {
    fn show_frame(&mut self, window: &str, frame: &RgbImage) -> Result<()> {
        tracing::debug!("[{}] frame {}x{}", window, frame.width(), frame.height());
        Ok(())
    }

    fn show_mask(&mut self, window: &str, mask: &GrayImage) -> Result<()> {
        let foreground = mask.pixels().filter(|p| p[0] == 255).count();
        tracing::debug!("[{}] {} foreground pixels", window, foreground);
        Ok(())
    }

    fn wait_key(&mut self, pacing: Pacing) -> Result<Option<Key>> {
        match pacing {
            Pacing::Delay(delay) => {
                std::thread::sleep(delay);
                Ok(None)
            }
            Pacing::Block => {
                tracing::info!("Key? [s]ave [c]orrect [w]rong [b]oth [q]uit, Enter to continue");
                let mut line = String::new();
                if self.input.read_line(&mut line)? == 0 {
                    return Ok(None);
                }
                Ok(line.trim().chars().next().map(Key::from_char))
            }
        }
    }
}
