//! The trial engine: control cycle and experiment progression.
//!
//! A single-threaded cooperative loop: wait for a subject, run training
//! or testing, judge responses, escalate failures, and idle out a subject
//! that has exhausted its tests or the daily reward budget. All record
//! mutation happens here, on the loop; the only concurrent context is the
//! button edge callback behind [`InputArbiter`].
//!
//! Timeouts keep polling for departure each tick. Departure during a
//! timeout is logged once and suspends further listening, but never
//! shortens the remaining countdown.

mod progress;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Datelike, Local};
use tracing::{debug, info, warn};

use crate::config::{Answer, Config, TestDefinition};
use crate::error::Result;
use crate::hardware::{
    Cue, CueSink, FeedError, FeederController, FeederTiming, HardwareSet, Indicators, InputArbiter,
};
use crate::results::{Event, EventRecord, ResultsLog};
use crate::rfid::{IdentityResolver, Presence, ResolverConfig, TagSource};
use crate::select::AnswerSelector;
use crate::subject::{schema, RecordStore};
use crate::Side;

/// What ended a wait on the subject.
enum Response {
    /// A button was pushed
    Push(Side),
    /// The subject departed
    Departed,
    /// Shutdown was requested
    Interrupted,
}

/// Orchestrates the control cycle over all collaborators.
pub struct TrialEngine {
    config: Config,
    tests: Vec<TestDefinition>,
    records: RecordStore,
    records_path: PathBuf,
    results: ResultsLog,
    resolver: IdentityResolver,
    arbiter: Arc<InputArbiter>,
    feeder: FeederController,
    indicators: Indicators,
    cues: Box<dyn CueSink>,
    source: Box<dyn TagSource>,
    selector: AnswerSelector,
    shutdown: Arc<AtomicBool>,
    /// Tag id of the subject being served
    active: Option<String>,
    /// An entry reward may still be granted for the current contact
    entry_pending: bool,
    /// The subject left during a timeout; wrap up at the next cycle
    pending_departure: bool,
    last_timed_feed: Option<Instant>,
}

impl TrialEngine {
    /// Assemble the engine: parse tests, load records, and wire the
    /// hardware seams.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unusable test definitions or a
    /// store error when the record file exists but cannot be decoded.
    pub fn new(
        config: Config,
        hardware: HardwareSet,
        source: Box<dyn TagSource>,
        cues: Box<dyn CueSink>,
        records_path: PathBuf,
        results: ResultsLog,
    ) -> Result<Self> {
        config.validate()?;
        let tests = config.test_definitions()?;
        let records = RecordStore::load(&records_path, config.blocks.trials_in_block)?;
        let feeder = FeederController::new(
            hardware.motor_drive,
            hardware.motor_standby,
            hardware.feeder_switch,
            FeederTiming::from(&config.timing),
        );
        let arbiter = Arc::new(InputArbiter::new(feeder.status(), (&config.timing).into()));
        let resolver =
            IdentityResolver::new(ResolverConfig::from(&config.presence), Instant::now());
        let indicators = Indicators::new(hardware.led_left, hardware.led_right);
        Ok(Self {
            config,
            tests,
            records,
            records_path,
            results,
            resolver,
            arbiter,
            feeder,
            indicators,
            cues,
            source,
            selector: AnswerSelector::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            active: None,
            entry_pending: false,
            pending_departure: false,
            last_timed_feed: None,
        })
    }

    /// The press arbiter, for wiring the button edge callbacks.
    #[must_use]
    pub fn arbiter(&self) -> Arc<InputArbiter> {
        Arc::clone(&self.arbiter)
    }

    /// Flag that stops the control loop at its next checkpoint.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// The loaded record store (counters, preferences, shuffle state).
    #[must_use]
    pub const fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Run the control loop until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (illegal answer resolution, IO
    /// failure on the record store or results log, scanner transport
    /// failure). Record state is persisted before returning.
    pub fn run(&mut self) -> Result<()> {
        self.cues.neutral_frame();
        info!(tests = self.tests.len(), animals = self.records.animal_count(), "controller running");
        let outcome = self.run_loop();
        if let Err(err) = self.persist() {
            warn!(%err, "could not persist records during shutdown");
        }
        self.indicators.both_off();
        info!("controller stopped");
        outcome
    }

    fn run_loop(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::Acquire) {
            self.cycle()?;
        }
        Ok(())
    }

    /// One control cycle, dispatched on the engine state.
    fn cycle(&mut self) -> Result<()> {
        if self.pending_departure {
            return self.finish_pending_departure();
        }
        let Some(active) = self.active.clone() else {
            return self.wait_for_subject();
        };
        if self.config.is_ignored(&active) {
            info!(tag = %active, "subject is on the ignore list, waiting for departure");
            self.wait_for_departure(&active)
        } else if !self.subject_has_tests_left(&active) {
            info!(tag = %active, "subject has finished all its tests, waiting for departure");
            self.wait_for_departure(&active)
        } else if self.records.global().rewards_today < self.config.rewards.daily_max {
            if self.records.animal(&active).is_some_and(|a| a.current_test == 0) {
                self.training(&active)
            } else {
                self.testing(&active)
            }
        } else {
            self.out_of_food(&active)
        }
    }

    // ------------------------------------------------------------------
    // Subject arrival and departure
    // ------------------------------------------------------------------

    fn wait_for_subject(&mut self) -> Result<()> {
        self.indicators.both_on();
        let idle = Duration::from_millis(self.config.timing.idle_poll_ms);
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(());
            }
            let frame = self.source.poll_frame()?;
            let tag = frame.as_ref().map(|t| t.tag_number.as_str());
            if let Presence::Present(id) = self.resolver.poll(Instant::now(), tag) {
                self.activate(&id);
                return Ok(());
            }
            thread::sleep(idle);
        }
    }

    fn activate(&mut self, tag: &str) {
        self.roll_experiment_day(Local::now());
        let record = self.records.get_or_insert(tag, self.config.blocks.trials_in_block);
        for spec in schema::ANIMAL_FIELDS {
            if let Some(value) = record.field_value(spec.name) {
                debug!(tag, field = spec.name, value = %value, "{}", spec.description);
            }
        }
        self.active = Some(tag.to_string());
        self.entry_pending = true;
        info!(tag, "serving subject");
    }

    /// The experiment day flips at noon; a new day resets the daily
    /// reward count.
    fn roll_experiment_day(&mut self, now: DateTime<Local>) {
        let day = (now - chrono::Duration::hours(12)).day();
        let global = self.records.global_mut();
        if global.reward_day != day {
            info!(day, "new experiment day, daily reward count reset");
            global.reward_day = day;
            global.rewards_today = 0;
        }
    }

    fn handle_departure(&mut self, active: &str, start: DateTime<Local>) -> Result<()> {
        self.log_event(active, Event::Departed, start, Local::now(), None, None)?;
        self.on_departure()
    }

    /// A departure detected during a timeout is wrapped up here, at the
    /// next cycle boundary, so the timeout clock was never shortened.
    fn finish_pending_departure(&mut self) -> Result<()> {
        if let Some(active) = self.active.clone() {
            let now = Local::now();
            self.log_event(&active, Event::Departed, now, now, None, None)?;
        }
        self.on_departure()
    }

    fn on_departure(&mut self) -> Result<()> {
        self.arbiter.disarm();
        self.resolver.release();
        self.active = None;
        self.entry_pending = false;
        self.pending_departure = false;
        self.persist()
    }

    fn persist(&mut self) -> Result<()> {
        self.records.save(&self.records_path)
    }

    // ------------------------------------------------------------------
    // Training
    // ------------------------------------------------------------------

    fn training(&mut self, active: &str) -> Result<()> {
        let start = Local::now();
        self.entry_reward(active)?;

        let Some(record) = self.records.animal(active) else {
            return Ok(());
        };
        let push_count_either = record.push_count_either;
        let entry_count = record.entry_count;

        if self.config.rewards.push_reward_either > push_count_either {
            self.indicators.both_on();
            match self.wait_for_response()? {
                Response::Push(side) => self.training_push(active, side, start),
                Response::Departed => self.handle_departure(active, start),
                Response::Interrupted => Ok(()),
            }
        } else if self.config.rewards.entry_reward <= entry_count {
            if let Some(record) = self.records.animal_mut(active) {
                record.current_test = 1;
                record.sliding_window.reset(self.config.blocks.trials_in_block);
            }
            info!(tag = active, "training complete, advancing to testing");
            Ok(())
        } else {
            // No push budget left, but entry rewards remain: the subject
            // may keep collecting them without leaving first.
            self.entry_pending = true;
            Ok(())
        }
    }

    /// Grant the entry reward for a fresh contact, bounded by the entry
    /// budget.
    fn entry_reward(&mut self, active: &str) -> Result<()> {
        if !self.entry_pending {
            return Ok(());
        }
        let entry_count = match self.records.animal(active) {
            Some(record) => record.entry_count,
            None => return Ok(()),
        };
        if entry_count >= self.config.rewards.entry_reward {
            return Ok(());
        }
        if self.dispense() {
            if let Some(record) = self.records.animal_mut(active) {
                record.entry_count += 1;
            }
            self.entry_pending = false;
            let now = Local::now();
            self.log_event(active, Event::Entry, now, now, None, None)?;
            thread::sleep(Duration::from_millis(self.config.timing.entry_pause_ms));
        }
        Ok(())
    }

    fn training_push(&mut self, active: &str, side: Side, start: DateTime<Local>) -> Result<()> {
        #[derive(PartialEq)]
        enum Budget {
            Side,
            Either,
            Exhausted,
        }

        let rewards = self.config.rewards.clone();
        let budget = {
            let Some(record) = self.records.animal_mut(active) else {
                return Ok(());
            };
            // Every training push feeds the preference statistics,
            // rewarded or not.
            match side {
                Side::Left => record.training_push_left += 1,
                Side::Right => record.training_push_right += 1,
            }
            let side_budget = match side {
                Side::Left => rewards.push_reward_left,
                Side::Right => rewards.push_reward_right,
            };
            let either_budget = rewards
                .push_reward_either
                .saturating_sub(rewards.push_reward_right + rewards.push_reward_left);
            let either_claimed = record
                .push_count_either
                .saturating_sub(record.push_count_right)
                .saturating_sub(record.push_count_left);
            if side_budget > record.side_rewards(side) {
                Budget::Side
            } else if either_claimed < either_budget {
                Budget::Either
            } else {
                Budget::Exhausted
            }
        };

        let event = match budget {
            Budget::Side => {
                if !self.dispense() {
                    return Ok(());
                }
                if let Some(record) = self.records.animal_mut(active) {
                    record.push_count_either += 1;
                    match side {
                        Side::Left => record.push_count_left += 1,
                        Side::Right => record.push_count_right += 1,
                    }
                }
                match side {
                    Side::Left => Event::TrainingPushLeft,
                    Side::Right => Event::TrainingPushRight,
                }
            }
            Budget::Either => {
                if !self.dispense() {
                    return Ok(());
                }
                if let Some(record) = self.records.animal_mut(active) {
                    record.push_count_either += 1;
                }
                Event::TrainingPushEither
            }
            Budget::Exhausted => {
                info!(%side, "no training rewards left for this side");
                Event::TrainingPushNoReward
            }
        };
        self.log_event(active, event, start, Local::now(), Some(side), None)
    }

    // ------------------------------------------------------------------
    // Testing
    // ------------------------------------------------------------------

    fn testing(&mut self, active: &str) -> Result<()> {
        let start = Local::now();
        self.entry_reward(active)?;

        let Some(record) = self.records.animal(active) else {
            return Ok(());
        };
        let current_test = record.current_test;
        if current_test == 0 || !self.subject_has_tests_left(active) {
            return Ok(());
        }
        let test = self.tests[current_test - 1].clone();

        let (answer, cue) = {
            let Some((animal, global)) = self.records.pair_mut(active) else {
                return Ok(());
            };
            self.selector.next_trial(&test, animal, global)?
        };

        self.indicators.set_pattern(cue);
        match self.wait_for_response()? {
            Response::Push(side) => self.judge_response(active, answer, side, start),
            Response::Departed => self.handle_departure(active, start),
            Response::Interrupted => Ok(()),
        }
    }

    fn judge_response(
        &mut self,
        active: &str,
        answer: Answer,
        side: Side,
        start: DateTime<Local>,
    ) -> Result<()> {
        let end = Local::now();
        let repeat = if answer.accepts(side) {
            self.dispense();
            if let Some(record) = self.records.animal_mut(active) {
                progress::apply_trial_success(record);
                if answer == Answer::Input {
                    // An input trial teaches the preference.
                    record.preference = Some(side);
                }
            }
            self.log_event(active, Event::Success, start, end, Some(side), Some(answer))?;
            false
        } else {
            self.cues.play(Cue::Failure);
            let effects = match self.records.animal_mut(active) {
                Some(record) => progress::apply_trial_failure(&self.config, record),
                None => return Ok(()),
            };
            self.log_event(active, Event::Failure, start, end, Some(side), Some(answer))?;
            self.indicators.both_off();
            self.run_timeout(self.config.fail_delay())?;
            if effects.escalate {
                self.run_timeout(self.config.failed_trials_timeout())?;
                if let Some(record) = self.records.animal_mut(active) {
                    record.failed_trials = 0;
                }
                self.cues.play(Cue::TimeoutExceeded);
            }
            effects.repeat
        };

        if let Some(record) = self.records.animal_mut(active) {
            progress::advance_trial(record, repeat);
        }
        self.check_block_completion(active)
    }

    fn check_block_completion(&mut self, active: &str) -> Result<()> {
        let completion = match self.records.animal(active) {
            Some(record) => progress::check_block(&self.config, record),
            None => return Ok(()),
        };
        match completion {
            progress::BlockCompletion::Pending => return Ok(()),
            progress::BlockCompletion::Success => {
                info!(tag = active, "block succeeded");
                let effects = match self.records.animal_mut(active) {
                    Some(record) => {
                        progress::apply_block_success(&self.config, self.tests.len(), record)
                    }
                    None => return Ok(()),
                };
                if effects.test_advanced {
                    info!(tag = active, "test passed, advancing");
                }
                if effects.between_test_pause {
                    self.run_timeout(self.config.between_test_timeout())?;
                }
            }
            progress::BlockCompletion::Failure => {
                info!(tag = active, "block failed");
                let escalate = match self.records.animal_mut(active) {
                    Some(record) => progress::apply_block_failure(&self.config, record),
                    None => return Ok(()),
                };
                if escalate {
                    self.indicators.both_off();
                    self.run_timeout(self.config.failed_blocks_timeout())?;
                    if let Some(record) = self.records.animal_mut(active) {
                        record.failed_blocks = 0;
                    }
                    self.cues.play(Cue::TimeoutExceeded);
                }
            }
        }
        if let Some(record) = self.records.animal_mut(active) {
            progress::end_block(&self.config, record);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Waiting, timeouts, budget exhaustion
    // ------------------------------------------------------------------

    /// Wait until the subject pushes a button or departs.
    fn wait_for_response(&mut self) -> Result<Response> {
        thread::sleep(Duration::from_millis(self.config.timing.press_warmup_ms));
        self.arbiter.arm();
        let poll = Duration::from_millis(self.config.timing.input_poll_ms);
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                self.arbiter.disarm();
                return Ok(Response::Interrupted);
            }
            if let Some(side) = self.arbiter.poll() {
                self.arbiter.disarm();
                debug!(%side, "push detected");
                return Ok(Response::Push(side));
            }
            self.maybe_timed_feed();
            let frame = self.source.poll_frame()?;
            let tag = frame.as_ref().map(|t| t.tag_number.as_str());
            if matches!(self.resolver.poll(Instant::now(), tag), Presence::Departed) {
                self.arbiter.disarm();
                return Ok(Response::Departed);
            }
            thread::sleep(poll);
        }
    }

    /// Unconditional periodic feeding while waiting for input, for
    /// long-unattended deployments.
    fn maybe_timed_feed(&mut self) {
        let interval = self.config.timed_feed_interval();
        if interval.is_zero() {
            return;
        }
        let now = Instant::now();
        match self.last_timed_feed {
            None => self.last_timed_feed = Some(now),
            Some(last) if now.duration_since(last) > interval => {
                self.dispense();
                self.last_timed_feed = Some(now);
            }
            Some(_) => {}
        }
    }

    /// Count down a timeout, still polling for departure each tick.
    /// Departure is logged once; the clock keeps running.
    fn run_timeout(&mut self, duration: Duration) -> Result<()> {
        if duration.is_zero() {
            return Ok(());
        }
        let start = Local::now();
        info!(secs = duration.as_secs(), "timeout started");
        let tick = Duration::from_millis(self.config.timing.timeout_tick_ms.max(1));
        let mut remaining = duration;
        let mut watching = self.active.is_some() && !self.pending_departure;
        while !remaining.is_zero() {
            let step = tick.min(remaining);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(());
            }
            if watching {
                let frame = self.source.poll_frame()?;
                let tag = frame.as_ref().map(|t| t.tag_number.as_str());
                if matches!(self.resolver.poll(Instant::now(), tag), Presence::Departed) {
                    if let Some(active) = self.active.clone() {
                        self.log_event(
                            &active,
                            Event::DepartedDuringTimeout,
                            start,
                            Local::now(),
                            None,
                            None,
                        )?;
                    }
                    self.pending_departure = true;
                    watching = false;
                }
            }
        }
        Ok(())
    }

    /// The daily budget is gone: stop acting, keep logging pushes, wait
    /// for the subject to leave.
    fn out_of_food(&mut self, active: &str) -> Result<()> {
        self.indicators.both_off();
        info!(tag = active, "daily reward budget exhausted, waiting for departure");
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let start = Local::now();
            match self.wait_for_response()? {
                Response::Push(side) => {
                    self.cues.play(Cue::Failure);
                    self.log_event(
                        active,
                        Event::PushWhileOutOfFood,
                        start,
                        Local::now(),
                        Some(side),
                        None,
                    )?;
                }
                Response::Departed => {
                    self.handle_departure(active, start)?;
                    break;
                }
                Response::Interrupted => break,
            }
        }
        self.persist()
    }

    /// Idle until the subject departs (ignored tag, or tests exhausted).
    fn wait_for_departure(&mut self, active: &str) -> Result<()> {
        self.indicators.both_off();
        let start = Local::now();
        let tick = Duration::from_millis(self.config.timing.timeout_tick_ms.max(1));
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Ok(());
            }
            let frame = self.source.poll_frame()?;
            let tag = frame.as_ref().map(|t| t.tag_number.as_str());
            if matches!(self.resolver.poll(Instant::now(), tag), Presence::Departed) {
                return self.handle_departure(active, start);
            }
            thread::sleep(tick);
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn subject_has_tests_left(&self, active: &str) -> bool {
        self.records
            .animal(active)
            .is_some_and(|record| progress::has_tests_left(&self.config, self.tests.len(), record))
    }

    /// Run a feed cycle; a completed cycle counts against the daily
    /// budget. Contention is informational, never an error.
    fn dispense(&mut self) -> bool {
        match self.feeder.feed(Instant::now()) {
            Ok(()) => {
                self.records.global_mut().rewards_today += 1;
                true
            }
            Err(FeedError::Busy) => {
                info!("feed request dropped");
                false
            }
        }
    }

    fn log_event(
        &mut self,
        animal_id: &str,
        event: Event,
        start: DateTime<Local>,
        end: DateTime<Local>,
        push: Option<Side>,
        expected: Option<Answer>,
    ) -> Result<()> {
        let Some(record) = self.records.animal(animal_id) else {
            return Ok(());
        };
        let event_record = EventRecord {
            animal_id: animal_id.to_string(),
            event,
            start,
            end,
            training_push_count: record.push_count_either,
            current_test: record.current_test,
            current_block: record.current_block,
            current_trial: record.trial_count,
            failed_current_trial: record.failed_current_trial,
            failed_trials: record.failed_trials,
            failed_blocks: record.failed_blocks,
            led_status: self.indicators.status(),
            push,
            expected,
            reward_count: self.records.global().rewards_today,
            window_successes: record.sliding_window.sum(),
        };
        self.results.append(&event_record)
    }
}
