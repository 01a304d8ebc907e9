//! Interactive console menus used when a choice was not given on the command line

use crate::config::{DetectorKind, DEFAULT_VIDEO};
use crate::error::{PipelineError, Result};
use std::io::{self, BufRead, StdinLock, Stdout, Write};
use std::path::PathBuf;

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// `(1) Default` picks the bundled sequence, `(2) Custom` asks for a path
    pub fn select_video(&mut self) -> Result<PathBuf> {
        writeln!(self.output, "(1) Default ({})", DEFAULT_VIDEO)?;
        writeln!(self.output, "(2) Custom")?;
        match self.ask_number("Select video: ")? {
            1 => Ok(PathBuf::from(DEFAULT_VIDEO)),
            2 => {
                let path = self.ask("Enter the file path: ")?;
                if path.is_empty() {
                    return Err(PipelineError::selection("empty file path"));
                }
                Ok(PathBuf::from(path))
            }
            other => Err(PipelineError::selection(format!(
                "{} is not a valid video choice",
                other
            ))),
        }
    }

    /// A number outside the menu is an unknown detector, anything else is an invalid answer
    pub fn select_detector(&mut self) -> Result<DetectorKind> {
        for kind in DetectorKind::ALL {
            writeln!(self.output, "({}) {}", kind.menu_id(), kind.label())?;
        }
        let id = self.ask_number("Select analysis type: ")?;
        DetectorKind::try_from(id)
    }

    /// Yes/no question answered with 0 or 1
    pub fn toggle(&mut self, label: &str) -> Result<bool> {
        match self.ask_number(&format!("{} (0/1): ", label))? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(PipelineError::selection(format!(
                "{} is not a valid answer for {}",
                other, label
            ))),
        }
    }

    fn ask_number(&mut self, question: &str) -> Result<u32> {
        let answer = self.ask(question)?;
        answer
            .parse()
            .map_err(|_| PipelineError::selection(format!("'{}' is not a number", answer)))
    }

    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(PipelineError::selection("no answer given"));
        }
        Ok(line.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(answers: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(answers.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn default_video_is_the_bundled_sequence() {
        let mut prompt = prompter("1\n");
        assert_eq!(prompt.select_video().unwrap(), PathBuf::from(DEFAULT_VIDEO));
        let shown = String::from_utf8(prompt.output).unwrap();
        assert!(shown.contains("(1) Default (seq_01.mp4)"));
        assert!(shown.contains("Select video: "));
    }

    #[test]
    fn custom_video_reads_a_path() {
        let mut prompt = prompter("2\n  clips/walk.gif \n");
        assert_eq!(prompt.select_video().unwrap(), PathBuf::from("clips/walk.gif"));
    }

    #[test]
    fn out_of_range_video_choice_is_invalid() {
        let err = prompter("7\n").select_video().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSelection(_)));
        assert!(err.is_user_facing());
    }

    #[test]
    fn detector_menu_lists_every_kind() {
        let mut prompt = prompter("3\n");
        assert_eq!(prompt.select_detector().unwrap(), DetectorKind::Face);
        let shown = String::from_utf8(prompt.output).unwrap();
        assert!(shown.contains("(1) MOG\n"));
        assert!(shown.contains("(2) MOG2\n"));
    }

    #[test]
    fn unknown_detector_number_is_reported_as_such() {
        let err = prompter("99\n").select_detector().unwrap_err();
        assert!(matches!(err, PipelineError::UnknownDetectorType(99)));

        let err = prompter("mog\n").select_detector().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSelection(_)));
    }

    #[test]
    fn toggles_accept_zero_and_one_only() {
        let mut prompt = prompter("1\n0\n2\n");
        assert!(prompt.toggle("Noise reduction").unwrap());
        assert!(!prompt.toggle("Save frames").unwrap());
        assert!(prompt.toggle("Save frames").is_err());
    }

    #[test]
    fn closed_input_is_an_invalid_selection() {
        let err = prompter("").toggle("Save frames").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSelection(_)));
    }
}
