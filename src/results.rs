//! Append-only results log.
//!
//! One CSV record per significant event, appended both to a combined
//! results file and to a per-subject file. Records are never rewritten;
//! the header line is repaired in place if absent or stale so older
//! files stay readable after a schema change.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Answer;
use crate::error::Result;
use crate::Side;

/// Column names, in record order.
pub const HEADER: &[&str] = &[
    "Animal_id",
    "Event",
    "Start_time",
    "End_time",
    "Training_push_count",
    "Current_test",
    "Current_block",
    "Current_trial",
    "Failed_current_trial",
    "Failed_trials",
    "Failed_blocks",
    "LED_status",
    "Push",
    "Correct",
    "Reward_count",
    "Successful_trials_in_window",
];

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Significant engine events, one record each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Subject arrived and collected an entry reward
    Entry,
    /// Rewarded training push on the left
    TrainingPushLeft,
    /// Rewarded training push on the right
    TrainingPushRight,
    /// Training push rewarded from the pooled either-side budget
    TrainingPushEither,
    /// Training push with no remaining reward budget
    TrainingPushNoReward,
    /// Correct trial response
    Success,
    /// Incorrect trial response
    Failure,
    /// Subject departed
    Departed,
    /// Subject departed while a timeout was counting down
    DepartedDuringTimeout,
    /// Push while the daily reward budget was exhausted
    PushWhileOutOfFood,
}

impl Event {
    /// Record name as written to the results file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "Entry",
            Self::TrainingPushLeft => "Training_push_left",
            Self::TrainingPushRight => "Training_push_right",
            Self::TrainingPushEither => "Training_push_either",
            Self::TrainingPushNoReward => "Training_push_no_reward",
            Self::Success => "Success",
            Self::Failure => "Failure",
            Self::Departed => "Departed",
            Self::DepartedDuringTimeout => "Departed_during_timeout",
            Self::PushWhileOutOfFood => "Push_while_out_of_food",
        }
    }
}

/// One results record: the event plus the running counters at log time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Subject tag id
    pub animal_id: String,
    /// What happened
    pub event: Event,
    /// When the interaction started
    pub start: DateTime<Local>,
    /// When the interaction ended
    pub end: DateTime<Local>,
    /// Pooled training push rewards collected
    pub training_push_count: u32,
    /// Current test index (0 = training)
    pub current_test: usize,
    /// Current block
    pub current_block: u32,
    /// Current trial within the block
    pub current_trial: usize,
    /// Failures on the current trial
    pub failed_current_trial: u32,
    /// Failed trials in the current block
    pub failed_trials: u32,
    /// Failed blocks in the current test
    pub failed_blocks: u32,
    /// Indicator state at log time
    pub led_status: String,
    /// Which button was pushed, if any
    pub push: Option<Side>,
    /// The expected answer, if the event had one
    pub expected: Option<Answer>,
    /// Rewards dispensed today
    pub reward_count: u32,
    /// Successful trials currently in the sliding window
    pub window_successes: u32,
}

impl EventRecord {
    /// Serialize as one CSV line (no trailing newline).
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        let fields = [
            self.animal_id.clone(),
            self.event.as_str().to_string(),
            self.start.format(TIME_FORMAT).to_string(),
            self.end.format(TIME_FORMAT).to_string(),
            self.training_push_count.to_string(),
            self.current_test.to_string(),
            self.current_block.to_string(),
            self.current_trial.to_string(),
            self.failed_current_trial.to_string(),
            self.failed_trials.to_string(),
            self.failed_blocks.to_string(),
            self.led_status.clone(),
            self.push.map_or_else(|| "NA".to_string(), |s| s.label().to_string()),
            self.expected.map_or_else(|| "NA".to_string(), |a| a.label().to_string()),
            self.reward_count.to_string(),
            self.window_successes.to_string(),
        ];
        fields.join(",")
    }
}

/// Appends event records to the combined and per-subject results files.
pub struct ResultsLog {
    dir: PathBuf,
    file_name: String,
    /// Subjects whose per-animal header has been checked this session
    headers_checked: HashSet<String>,
}

impl ResultsLog {
    /// Open (creating if needed) the results directory and repair the
    /// combined file's header.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or combined file cannot be
    /// prepared.
    pub fn new<P: AsRef<Path>>(dir: P, file_name: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let log = Self {
            dir,
            file_name: file_name.to_string(),
            headers_checked: HashSet::new(),
        };
        ensure_header(&log.combined_path())?;
        Ok(log)
    }

    /// Path of the combined results file.
    #[must_use]
    pub fn combined_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Path of one subject's results file.
    #[must_use]
    pub fn animal_path(&self, animal_id: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", animal_id, self.file_name))
    }

    /// Append one record to the combined and per-subject files.
    ///
    /// # Errors
    ///
    /// Returns an error when either file cannot be written.
    pub fn append(&mut self, record: &EventRecord) -> Result<()> {
        let animal_path = self.animal_path(&record.animal_id);
        if self.headers_checked.insert(record.animal_id.clone()) {
            ensure_header(&animal_path)?;
        }
        let line = record.to_csv_line();
        debug!(event = record.event.as_str(), animal = %record.animal_id, "logging result");
        append_line(&self.combined_path(), &line)?;
        append_line(&animal_path, &line)?;
        Ok(())
    }
}

fn header_line() -> String {
    format!("#{}", HEADER.join(","))
}

/// Make sure `path` starts with the current header: a stale header line
/// is replaced, a missing one is inserted, records are left untouched.
fn ensure_header(path: &Path) -> Result<()> {
    let header = header_line();
    let Ok(content) = fs::read_to_string(path) else {
        fs::write(path, format!("{header}\n"))?;
        return Ok(());
    };
    let mut lines: Vec<&str> = content.lines().collect();
    match lines.first() {
        Some(first) if *first == header => return Ok(()),
        Some(first) if first.starts_with('#') => {
            lines[0] = &header;
            let body = lines.join("\n");
            fs::write(path, format!("{body}\n"))?;
        }
        _ => {
            fs::write(path, format!("{header}\n{content}"))?;
        }
    }
    Ok(())
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}
