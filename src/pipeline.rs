use crate::capture::{open_video, VideoSource};
use crate::config::{DetectorKind, PipelineConfig};
use crate::detection::{create_detector, Detection, Detector};
use crate::error::Result;
use crate::output::{
    snapshot_dir, Display, Key, Pacing, SnapshotKind, SnapshotWriter, WINDOW_DENOISED,
    WINDOW_MASK, WINDOW_VIDEO,
};
use crate::overlay;
use image::RgbImage;

/// Manual classification counts entered from the keyboard
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub correct: u64,
    pub wrong: u64,
    pub both: u64,
}

impl Tally {
    /// Count a classification key; returns false for keys that are not one
    pub fn record(&mut self, key: Key) -> bool {
        match key {
            Key::Correct => self.correct += 1,
            Key::Wrong => self.wrong += 1,
            Key::Both => self.both += 1,
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Opened,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    UserAbort,
}

/// Mutable bookkeeping of one run
#[derive(Debug, Clone)]
pub struct RunState {
    pub phase: RunPhase,
    /// Index of the frame being processed, starting at 0
    pub frame_index: u64,
    pub frames_processed: u64,
    pub tally: Tally,
    pub snapshots_saved: u64,
    pub regions_drawn: u64,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: RunPhase::Idle,
            frame_index: 0,
            frames_processed: 0,
            tally: Tally::default(),
            snapshots_saved: 0,
            regions_drawn: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub frames_processed: u64,
    pub tally: Tally,
    pub snapshots_saved: u64,
    pub regions_drawn: u64,
}

/// One run over one video: source → detector → overlay → display/snapshots
pub struct Pipeline<S, D> {
    config: PipelineConfig,
    source: S,
    display: D,
    detector: Box<dyn Detector>,
    snapshots: SnapshotWriter,
    state: RunState,
}

impl<S: VideoSource, D: Display> Pipeline<S, D> {
    pub fn new(config: PipelineConfig, source: S, display: D) -> Result<Self> {
        config.validate()?;
        let detector = create_detector(config.detector, &config.settings)?;
        Self::with_detector(config, source, display, detector)
    }

    pub fn with_detector(
        config: PipelineConfig,
        source: S,
        display: D,
        detector: Box<dyn Detector>,
    ) -> Result<Self> {
        config.validate()?;
        let dir = snapshot_dir(&config.video, config.output_root.as_deref())?;
        let state = RunState {
            phase: RunPhase::Opened,
            ..RunState::default()
        };
        Ok(Self {
            config,
            source,
            display,
            detector,
            snapshots: SnapshotWriter::new(dir),
            state,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Process frames until the stream ends or the user aborts
    ///
    /// The display is closed on every exit path once the loop has started, and
    /// the state is left in `RunPhase::Stopped` whatever the outcome.
    pub fn run(&mut self) -> Result<RunSummary> {
        let (width, height) = self.source.resolution();
        tracing::info!(
            "Starting analysis of {} ({}x{}, {} frames) with {}",
            self.config.video.display(),
            width,
            height,
            self.source.frame_count(),
            self.detector.name()
        );
        self.state.phase = RunPhase::Running;

        let outcome = self.run_loop();
        let closed = self.display.close();
        self.state.phase = RunPhase::Stopped;

        let stop_reason = outcome?;
        closed?;

        let summary = RunSummary {
            stop_reason,
            frames_processed: self.state.frames_processed,
            tally: self.state.tally,
            snapshots_saved: self.state.snapshots_saved,
            regions_drawn: self.state.regions_drawn,
        };
        tracing::info!(
            "Analysis stopped ({:?}) after {} frames. Correct: {}, Wrong: {}, Both: {}",
            summary.stop_reason,
            summary.frames_processed,
            summary.tally.correct,
            summary.tally.wrong,
            summary.tally.both
        );
        Ok(summary)
    }

    fn run_loop(&mut self) -> Result<StopReason> {
        let total = self.source.frame_count();

        while let Some(mut frame) = self.source.next_frame()? {
            let index = self.state.frame_index;
            let detection = self.detector.detect(&frame)?;

            match &detection {
                Detection::Found(found) => {
                    overlay::draw_detections(&mut frame, found);
                    self.state.regions_drawn += found.regions.len() as u64;
                }
                Detection::NotImplemented { detector } => {
                    overlay::draw_notice(&mut frame, &format!("{} NOT IMPLEMENTED", detector));
                }
            }
            overlay::draw_hud(&mut frame, index, total);

            tracing::debug!(
                "Frame {}/{}: {} regions",
                index,
                total,
                detection.regions().len()
            );

            let mut saved = false;
            if self.config.save_frames && index % self.config.save_every as u64 == 0 {
                self.save_snapshots(index, &frame, &detection)?;
                saved = true;
            }

            let key = if self.config.show_playback {
                self.show(&frame, &detection)?;
                let pacing = self.pacing_for(index);
                self.display.wait_key(pacing)?
            } else {
                None
            };

            self.state.frames_processed += 1;
            self.state.frame_index += 1;

            match key {
                Some(Key::Quit) => {
                    tracing::info!("Abort requested at frame {}", index);
                    return Ok(StopReason::UserAbort);
                }
                Some(Key::Save) if !saved => self.save_snapshots(index, &frame, &detection)?,
                Some(Key::Save) => {}
                Some(key) => {
                    if self.state.tally.record(key) {
                        let tally = self.state.tally;
                        tracing::info!(
                            "Correct: {}, Wrong: {}, Both: {}",
                            tally.correct,
                            tally.wrong,
                            tally.both
                        );
                    } else {
                        tracing::debug!("Ignoring key {:?}", key);
                    }
                }
                None => {}
            }
        }

        Ok(StopReason::EndOfStream)
    }

    fn pacing_for(&self, index: u64) -> Pacing {
        match self.config.pause_every {
            Some(every) if index % every as u64 == 0 => Pacing::Block,
            _ => Pacing::Delay(self.config.playback_delay),
        }
    }

    fn show(&mut self, frame: &RgbImage, detection: &Detection) -> Result<()> {
        self.display.show_frame(WINDOW_VIDEO, frame)?;
        if let Some(found) = detection.detections() {
            if let Some(mask) = &found.mask {
                self.display.show_mask(WINDOW_MASK, mask)?;
            }
            if let Some(denoised) = &found.denoised_mask {
                self.display.show_mask(WINDOW_DENOISED, denoised)?;
            }
        }
        Ok(())
    }

    fn save_snapshots(
        &mut self,
        index: u64,
        frame: &RgbImage,
        detection: &Detection,
    ) -> Result<()> {
        self.snapshots.save_frame(index, frame)?;
        if let Some(found) = detection.detections() {
            if let Some(mask) = &found.mask {
                self.snapshots.save_mask(SnapshotKind::Foreground, index, mask)?;
            }
            if let Some(denoised) = &found.denoised_mask {
                self.snapshots
                    .save_mask(SnapshotKind::ForegroundDenoised, index, denoised)?;
            }
        }
        self.state.snapshots_saved += 1;
        tracing::info!(
            "Saved frame {} to {}",
            index,
            self.snapshots.dir().display()
        );
        Ok(())
    }
}

/// Run with a detector given by its menu id
///
/// An unknown id fails before a single frame is read; the source is dropped
/// on that path like on every other.
pub fn start_analysis<S: VideoSource, D: Display>(
    source: S,
    display: D,
    mut config: PipelineConfig,
    detector_id: u32,
) -> Result<RunSummary> {
    config.detector = DetectorKind::try_from(detector_id)?;
    let mut pipeline = Pipeline::new(config, source, display)?;
    pipeline.run()
}

/// Open the configured video and run it through the pipeline
pub fn analyze<D: Display>(config: PipelineConfig, display: D) -> Result<RunSummary> {
    config.validate()?;
    let source = open_video(&config.video)?;
    tracing::info!("Found video. Starting analysis.");
    let mut pipeline = Pipeline::new(config, source, display)?;
    pipeline.run()
}
