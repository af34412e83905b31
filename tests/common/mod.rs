//! Shared test rig: simulated hardware and a fast-clock configuration.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use puzzlebox::config::Config;
use puzzlebox::hardware::{Cue, CueSink, DigitalInput, DigitalOutput, HardwareSet};
use puzzlebox::results::ResultsLog;
use puzzlebox::rfid::{RfidTag, TagSource};
use puzzlebox::{Result, TrialEngine};
use tempfile::TempDir;

/// Output line that goes nowhere.
pub struct NullOutput;

impl DigitalOutput for NullOutput {
    fn set(&mut self, _active: bool) {}
}

/// Feeder confirmation switch that completes a revolution every five
/// polls.
pub struct RevolvingSwitch {
    polls: AtomicU32,
}

impl RevolvingSwitch {
    pub fn new() -> Self {
        Self { polls: AtomicU32::new(0) }
    }
}

impl DigitalInput for RevolvingSwitch {
    fn is_active(&self) -> bool {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) % 5;
        (2..4).contains(&n)
    }
}

/// Cue sink that records every cue played.
pub struct RecordingCues {
    played: Arc<Mutex<Vec<Cue>>>,
}

impl RecordingCues {
    pub fn new() -> (Self, Arc<Mutex<Vec<Cue>>>) {
        let played = Arc::new(Mutex::new(Vec::new()));
        (Self { played: Arc::clone(&played) }, played)
    }
}

impl CueSink for RecordingCues {
    fn play(&mut self, cue: Cue) {
        self.played.lock().unwrap().push(cue);
    }
}

/// Tag source scripted on wall-clock time: each window emits frames for
/// one tag, gaps emit silence.
pub struct TimedSource {
    start: Instant,
    windows: Vec<(Duration, Duration, &'static str)>,
}

impl TimedSource {
    pub fn new(windows: Vec<(Duration, Duration, &'static str)>) -> Self {
        Self { start: Instant::now(), windows }
    }
}

impl TagSource for TimedSource {
    fn poll_frame(&mut self) -> Result<Option<RfidTag>> {
        let elapsed = self.start.elapsed();
        for (from, to, tag) in &self.windows {
            if elapsed >= *from && elapsed < *to {
                return Ok(Some(frame(tag)));
            }
        }
        Ok(None)
    }
}

/// A well-formed frame for the given tag number.
pub fn frame(tag: &str) -> RfidTag {
    RfidTag {
        record_type: "TAG".to_string(),
        reader_id: "01".to_string(),
        timestamp: NaiveDate::from_ymd_opt(2019, 5, 12)
            .unwrap()
            .and_hms_opt(13, 45, 2)
            .unwrap(),
        tag_number: tag.to_string(),
    }
}

/// A configuration with every wait shrunk to keep tests fast.
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.presence.rfid_timeout_secs = 0.2;
    config.presence.new_animal_timeout_secs = 0.1;
    config.presence.reliability_delay_threshold_secs = 0.15;
    config.presence.time_until_reliable_secs = 10.0;
    config.timing.input_poll_ms = 1;
    config.timing.idle_poll_ms = 1;
    config.timing.timeout_tick_ms = 1;
    config.timing.min_feed_interval_ms = 0;
    config.timing.feed_engage_poll_ms = 0;
    config.timing.feed_release_poll_ms = 0;
    config.timing.press_recheck_ms = 0;
    config.timing.press_warmup_ms = 0;
    config.timing.entry_pause_ms = 0;
    config.failure.fail_delay_secs = 0;
    config
}

/// An assembled engine over simulated hardware plus the paths its
/// output lands in.
pub struct Rig {
    pub engine: TrialEngine,
    pub cues: Arc<Mutex<Vec<Cue>>>,
    pub records_path: PathBuf,
    pub results_path: PathBuf,
    pub dir: TempDir,
}

pub fn rig(config: Config, source: TimedSource) -> Rig {
    // RUST_LOG=debug surfaces the engine's tracing during a test run.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let records_path = dir.path().join("records.json");
    let results_dir = dir.path().join("results");
    let (cue_sink, cues) = RecordingCues::new();
    let hardware = HardwareSet {
        motor_drive: Box::new(NullOutput),
        motor_standby: Box::new(NullOutput),
        feeder_switch: Box::new(RevolvingSwitch::new()),
        led_left: Box::new(NullOutput),
        led_right: Box::new(NullOutput),
    };
    let results = ResultsLog::new(&results_dir, "results.csv").unwrap();
    let results_path = results.combined_path();
    let engine = TrialEngine::new(
        config,
        hardware,
        Box::new(source),
        Box::new(cue_sink),
        records_path.clone(),
        results,
    )
    .unwrap();
    Rig { engine, cues, records_path, results_path, dir }
}

/// Events column of a results file, in order.
pub fn logged_events(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| line.split(',').nth(1).unwrap_or_default().to_string())
        .collect()
}
