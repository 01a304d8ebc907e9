use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use motionlab::capture::{open_video, FrameDirectory, GifSource, VideoSource};
use motionlab::detection::{Detector, Mog2Detector, Region};
use motionlab::output::{
    Display, Key, NullDisplay, Pacing, WINDOW_DENOISED, WINDOW_MASK, WINDOW_VIDEO,
};
use motionlab::{
    analyze, start_analysis, DetectorKind, DetectorSettings, Pipeline, PipelineConfig,
    PipelineError, StopReason, Tally,
};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs::File;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

const SIDE: u32 = 64;
const DARK: u8 = 20;
const SQUARE: Region = Region {
    x: 24,
    y: 24,
    width: 16,
    height: 16,
};

/// Frame `n` (1-based) of the synthetic clip: a white square in frames 3 to 7
fn clip_frame(n: u32) -> RgbImage {
    let mut frame = RgbImage::from_pixel(SIDE, SIDE, Rgb([DARK, DARK, DARK]));
    if (3..=7).contains(&n) {
        for y in 24..40 {
            for x in 24..40 {
                frame.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
    }
    frame
}

fn write_clip(path: &Path) {
    let file = File::create(path).unwrap();
    let mut encoder = GifEncoder::new(file);
    let frames = (1..=10).map(|n| {
        let rgb = clip_frame(n);
        let rgba = RgbaImage::from_fn(SIDE, SIDE, |x, y| {
            let p = rgb.get_pixel(x, y);
            Rgba([p[0], p[1], p[2], 255])
        });
        Frame::from_parts(rgba, 0, 0, Delay::from_numer_denom_ms(40, 1))
    });
    encoder.encode_frames(frames).unwrap();
}

fn write_frame_dir(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    for n in 1..=10 {
        clip_frame(n)
            .save(dir.join(format!("frame_{:03}.png", n)))
            .unwrap();
    }
}

fn mog2_config(video: &Path, noise_reduction: bool) -> PipelineConfig {
    let mut config = PipelineConfig::new(video, DetectorKind::Mog2);
    config.settings.noise_reduction = noise_reduction;
    config.playback_delay = Duration::ZERO;
    config
}

#[derive(Default)]
struct DisplayLog {
    windows: Vec<String>,
    pacing: Vec<Pacing>,
    closed: bool,
}

/// Display that replays a fixed list of key presses
struct ScriptedDisplay {
    keys: VecDeque<Option<Key>>,
    log: Rc<RefCell<DisplayLog>>,
}

impl ScriptedDisplay {
    fn new(keys: &[Option<Key>]) -> (Self, Rc<RefCell<DisplayLog>>) {
        let log = Rc::new(RefCell::new(DisplayLog::default()));
        let display = Self {
            keys: keys.iter().copied().collect(),
            log: Rc::clone(&log),
        };
        (display, log)
    }
}

impl Display for ScriptedDisplay {
    fn show_frame(&mut self, window: &str, _frame: &RgbImage) -> motionlab::Result<()> {
        self.log.borrow_mut().windows.push(window.to_string());
        Ok(())
    }

    fn show_mask(&mut self, window: &str, _mask: &GrayImage) -> motionlab::Result<()> {
        self.log.borrow_mut().windows.push(window.to_string());
        Ok(())
    }

    fn wait_key(&mut self, pacing: Pacing) -> motionlab::Result<Option<Key>> {
        self.log.borrow_mut().pacing.push(pacing);
        Ok(self.keys.pop_front().flatten())
    }

    fn close(&mut self) -> motionlab::Result<()> {
        self.log.borrow_mut().closed = true;
        Ok(())
    }
}

/// In-memory source that records how it was used
struct CountingSource {
    frames: VecDeque<RgbImage>,
    reads: Rc<Cell<u32>>,
    dropped: Rc<Cell<bool>>,
}

impl VideoSource for CountingSource {
    fn next_frame(&mut self) -> motionlab::Result<Option<RgbImage>> {
        self.reads.set(self.reads.get() + 1);
        Ok(self.frames.pop_front())
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn resolution(&self) -> (u32, u32) {
        (SIDE, SIDE)
    }
}

impl Drop for CountingSource {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

#[test]
fn mog2_tracks_the_square_while_it_is_visible() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_clip(&path);

    let settings = DetectorSettings {
        noise_reduction: true,
        ..DetectorSettings::default()
    };
    let mut detector = Mog2Detector::new(&settings);
    let mut source = open_video(&path).unwrap();
    assert_eq!(source.frame_count(), 10);

    let mut n = 0;
    while let Some(frame) = source.next_frame().unwrap() {
        n += 1;
        let detection = detector.detect(&frame).unwrap();
        let regions = detection.regions();
        match n {
            1 | 2 | 8..=10 => assert!(regions.is_empty(), "frame {n}: {regions:?}"),
            4..=7 => assert!(
                regions.iter().any(|region| region.overlaps(&SQUARE)),
                "frame {n}: {regions:?}"
            ),
            _ => {}
        }
    }
    assert_eq!(n, 10);
}

#[test]
fn noise_reduction_never_adds_candidates() {
    let background = RgbImage::from_pixel(SIDE, SIDE, Rgb([DARK, DARK, DARK]));
    let noisy = |seed: u32| {
        let mut frame = background.clone();
        for i in 0..12 {
            let x = (seed * 7 + i * 13) % SIDE;
            let y = (seed * 11 + i * 5) % SIDE;
            frame.put_pixel(x, y, Rgb([250, 250, 250]));
        }
        for y in 30..50 {
            for x in 30..50 {
                frame.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        frame
    };

    let plain = DetectorSettings::default();
    let denoised = DetectorSettings {
        noise_reduction: true,
        ..DetectorSettings::default()
    };
    let mut without = Mog2Detector::new(&plain);
    let mut with = Mog2Detector::new(&denoised);

    without.detect(&background).unwrap();
    with.detect(&background).unwrap();
    for seed in 1..6 {
        let frame = noisy(seed);
        let raw = without.detect(&frame).unwrap();
        let opened = with.detect(&frame).unwrap();
        let raw_count = raw.detections().unwrap().candidates.len();
        let opened_count = opened.detections().unwrap().candidates.len();
        assert!(opened_count <= raw_count, "seed {seed}: {opened_count} > {raw_count}");
    }
}

#[test]
fn unknown_detector_reads_nothing_and_releases_the_source() {
    let reads = Rc::new(Cell::new(0));
    let dropped = Rc::new(Cell::new(false));
    let source = CountingSource {
        frames: (1..=3).map(clip_frame).collect(),
        reads: Rc::clone(&reads),
        dropped: Rc::clone(&dropped),
    };

    let config = mog2_config(Path::new("clip.gif"), false);
    let err = start_analysis(source, NullDisplay, config, 99).unwrap_err();

    assert!(matches!(err, PipelineError::UnknownDetectorType(99)));
    assert!(err.is_user_facing());
    assert_eq!(reads.get(), 0);
    assert!(dropped.get());
}

#[test]
fn menu_ids_select_the_detector() {
    let reads = Rc::new(Cell::new(0));
    let dropped = Rc::new(Cell::new(false));
    let source = CountingSource {
        frames: (1..=10).map(clip_frame).collect(),
        reads: Rc::clone(&reads),
        dropped: Rc::clone(&dropped),
    };

    let mut config = mog2_config(Path::new("clip.gif"), false);
    config.show_playback = false;
    let summary = start_analysis(source, NullDisplay, config, 2).unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.frames_processed, 10);
    assert!(summary.regions_drawn > 0);
    assert_eq!(reads.get(), 11);
    assert!(dropped.get());
}

#[test]
fn classification_keys_are_tallied_and_save_writes_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_clip(&path);

    let mut config = mog2_config(&path, true);
    config.pause_every = Some(1);
    let keys = [
        Some(Key::Correct),
        Some(Key::Wrong),
        Some(Key::Both),
        Some(Key::Save),
        Some(Key::Other('x')),
        Some(Key::Correct),
    ];
    let (display, log) = ScriptedDisplay::new(&keys);

    let source = GifSource::open(&path).unwrap();
    let summary = Pipeline::new(config, source, display).unwrap().run().unwrap();

    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(summary.frames_processed, 10);
    assert_eq!(
        summary.tally,
        Tally {
            correct: 2,
            wrong: 1,
            both: 1
        }
    );
    assert_eq!(summary.snapshots_saved, 1);

    let saved = dir.path().join("clip");
    assert!(saved.join("ori_3.png").is_file());
    assert!(saved.join("fg_3.png").is_file());
    assert!(saved.join("fg_dup_3.png").is_file());
    assert!(!saved.join("ori_4.png").exists());

    let log = log.borrow();
    assert!(log.closed);
    assert!(log.pacing.iter().all(|pacing| *pacing == Pacing::Block));
    assert_eq!(log.windows.iter().filter(|w| *w == WINDOW_VIDEO).count(), 10);
    assert_eq!(log.windows.iter().filter(|w| *w == WINDOW_MASK).count(), 10);
    assert_eq!(log.windows.iter().filter(|w| *w == WINDOW_DENOISED).count(), 10);
}

#[test]
fn quit_key_stops_the_run_and_closes_the_display() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_clip(&path);

    let (display, log) = ScriptedDisplay::new(&[None, None, Some(Key::Quit), Some(Key::Correct)]);
    let source = GifSource::open(&path).unwrap();
    let summary = Pipeline::new(mog2_config(&path, false), source, display)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::UserAbort);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.tally, Tally::default());
    assert!(log.borrow().closed);
}

#[test]
fn playback_pauses_on_the_configured_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_clip(&path);

    let mut config = mog2_config(&path, false);
    config.pause_every = Some(4);
    config.playback_delay = Duration::from_millis(5);
    let (display, log) = ScriptedDisplay::new(&[]);
    let source = GifSource::open(&path).unwrap();
    Pipeline::new(config, source, display).unwrap().run().unwrap();

    let blocked: Vec<usize> = log
        .borrow()
        .pacing
        .iter()
        .enumerate()
        .filter(|(_, pacing)| **pacing == Pacing::Block)
        .map(|(index, _)| index)
        .collect();
    assert_eq!(blocked, vec![0, 4, 8]);
    assert_eq!(log.borrow().pacing[1], Pacing::Delay(Duration::from_millis(5)));
}

#[test]
fn headless_run_saves_periodic_snapshots_from_a_frame_directory() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("walk");
    write_frame_dir(&frames);
    let out = dir.path().join("out");

    let mut config = mog2_config(&frames, false);
    config.show_playback = false;
    config.save_frames = true;
    config.save_every = 5;
    config.output_root = Some(out.clone());

    let source = FrameDirectory::open(&frames).unwrap();
    let detector = Box::new(Mog2Detector::new(&config.settings));
    let summary = Pipeline::with_detector(config, source, NullDisplay, detector)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.snapshots_saved, 2);
    let saved = out.join("walk");
    for name in ["ori_0.png", "fg_0.png", "ori_5.png", "fg_5.png"] {
        assert!(saved.join(name).is_file(), "{name} missing");
    }
    assert!(!saved.join("fg_dup_0.png").exists());
    assert!(!saved.join("ori_1.png").exists());

    let mask = image::open(saved.join("fg_5.png")).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (SIDE, SIDE));
    assert_eq!(*mask.get_pixel(32, 32), image::Luma([255]));
}

#[test]
fn mog_stub_runs_to_the_end_without_regions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_clip(&path);

    let config = PipelineConfig::new(&path, DetectorKind::Mog);
    let (display, log) = ScriptedDisplay::new(&[]);
    let source = GifSource::open(&path).unwrap();
    let summary = Pipeline::new(config, source, display).unwrap().run().unwrap();

    assert_eq!(summary.frames_processed, 10);
    assert_eq!(summary.regions_drawn, 0);
    assert!(log.borrow().windows.iter().all(|w| w == WINDOW_VIDEO));
}

#[test]
fn frame_size_change_fails_the_run_but_closes_the_display() {
    let reads = Rc::new(Cell::new(0));
    let dropped = Rc::new(Cell::new(false));
    let source = CountingSource {
        frames: VecDeque::from(vec![clip_frame(1), RgbImage::new(32, 32)]),
        reads: Rc::clone(&reads),
        dropped: Rc::clone(&dropped),
    };

    let (display, log) = ScriptedDisplay::new(&[]);
    let err = Pipeline::new(mog2_config(Path::new("clip.gif"), false), source, display)
        .unwrap()
        .run()
        .unwrap_err();

    assert!(matches!(err, PipelineError::FrameSizeMismatch { .. }));
    assert!(!err.is_user_facing());
    assert!(log.borrow().closed);
    assert!(dropped.get());
}

#[test]
fn missing_video_is_reported_before_the_run() {
    let err = analyze(mog2_config(Path::new("/no/such/seq_01.mp4"), false), NullDisplay)
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceOpen { .. }));
    assert!(err.is_user_facing());
}

#[test]
fn broken_cascade_is_fatal_at_start_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    write_clip(&path);
    let cascade = dir.path().join("cascade.xml");
    std::fs::write(&cascade, "<opencv_storage></opencv_storage>").unwrap();

    let mut config = PipelineConfig::new(&path, DetectorKind::Face);
    config.settings.cascade_path = cascade;
    let err = analyze(config, NullDisplay).unwrap_err();

    assert!(matches!(err, PipelineError::Cascade(_)));
    assert!(!err.is_user_facing());
}
