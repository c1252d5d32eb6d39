//! Run-wide statistics fed by per-worker lifecycle callbacks.
//!
//! [`StatisticsAggregator`] is shared by every worker of a run and only holds
//! what must be combined across workers: entity counters, collected failures,
//! the run-wide worst status and the run timer. Each worker drives its own
//! [`Worker`], which owns the execution context and node tree and is never
//! shared.
//!
//! The stories wrapper hooks (`before_stories_steps` / `after_stories_steps`)
//! switch status recording off while run-level hooks execute, so a broken
//! setup step does not leak into the run verdict through the scenario path.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::context::ExecutionContext;
use crate::core::known_issue::{AssertionFailure, verification_status};
use crate::core::node::{ClosedNode, NodeTree};
use crate::core::statistic::{Entity, Statistics, empty_statistics};
use crate::core::status::{ExitCode, Status, worsen};
use crate::io::statistics_store::write_statistics;
use crate::matcher::KnownIssueMatcher;

/// Stage of a stories wrapper hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    After,
}

/// A scenario about to run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub title: String,
    /// Number of steps declared by the scenario. A scenario with steps that
    /// ends up running none of them is reported as skipped.
    #[serde(default)]
    pub steps: usize,
}

impl Scenario {
    pub fn new(title: impl Into<String>, steps: usize) -> Self {
        Self {
            title: title.into(),
            steps,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    #[default]
    Executable,
    /// Documentation-only step; never opens a node.
    Comment,
}

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// Verification failed; the outcome follows the assertion failures
    /// reported while the step ran.
    Verification,
    /// The step could not complete (exception, timeout, bad input).
    Error(String),
}

/// One collected failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub story: Option<String>,
    pub scenario: Option<String>,
    pub message: String,
}

#[derive(Debug, Default)]
struct Stopwatch {
    started: Option<Instant>,
    elapsed: Duration,
}

impl Stopwatch {
    fn start(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed += started.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        self.elapsed + self.started.map_or(Duration::ZERO, |started| started.elapsed())
    }
}

#[derive(Debug)]
struct Records {
    statistics: Statistics,
    failures: Option<Vec<Failure>>,
}

/// Process-wide outcome accumulator shared by all workers.
#[derive(Debug)]
pub struct StatisticsAggregator {
    matcher: KnownIssueMatcher,
    statistics_dir: Option<PathBuf>,
    records: Mutex<Records>,
    status: Mutex<Option<Status>>,
    recording: AtomicBool,
    stopwatch: Mutex<Stopwatch>,
}

impl StatisticsAggregator {
    pub fn new(matcher: KnownIssueMatcher) -> Self {
        Self {
            matcher,
            statistics_dir: None,
            records: Mutex::new(Records {
                statistics: empty_statistics(),
                failures: None,
            }),
            status: Mutex::new(None),
            recording: AtomicBool::new(true),
            stopwatch: Mutex::new(Stopwatch::default()),
        }
    }

    /// Write `statistics.json` into `dir` when the run ends.
    pub fn with_statistics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.statistics_dir = Some(dir.into());
        self
    }

    pub fn collect_failures(self, enabled: bool) -> Self {
        lock(&self.records).failures = enabled.then(Vec::new);
        self
    }

    /// Driver for one worker.
    pub fn worker(&self) -> Worker<'_> {
        Worker::new(self, ExecutionContext::new())
    }

    /// Driver for a worker executing a dry run.
    pub fn dry_run_worker(&self) -> Worker<'_> {
        Worker::new(self, ExecutionContext::dry_run(true))
    }

    /// Snapshot of the counters.
    pub fn statistics(&self) -> Statistics {
        lock(&self.records).statistics.clone()
    }

    /// Snapshot of collected failures, `None` when collection is disabled.
    pub fn failures(&self) -> Option<Vec<Failure>> {
        lock(&self.records).failures.clone()
    }

    /// Worst status recorded for the run so far.
    pub fn status(&self) -> Option<Status> {
        *lock(&self.status)
    }

    pub fn calculate_exit_code(&self) -> ExitCode {
        ExitCode::from_status(self.status())
    }

    /// Time spent between the end of the before-stories hooks and the start
    /// of the after-stories hooks.
    pub fn duration(&self) -> Duration {
        lock(&self.stopwatch).elapsed()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Write the current counters to the statistics directory, if configured.
    pub fn persist(&self) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.statistics_dir else {
            return Ok(None);
        };
        let statistics = self.statistics();
        write_statistics(dir, &statistics).map(Some)
    }

    fn change_status(&self, candidate: Status) {
        if !self.is_recording() {
            return;
        }
        let mut status = lock(&self.status);
        *status = Some(worsen(*status, candidate));
    }

    fn record_node(&self, closed: ClosedNode) {
        if !closed.counted {
            return;
        }
        let mut records = lock(&self.records);
        records
            .statistics
            .entry(closed.entity)
            .or_default()
            .record(closed.status);
    }

    fn add_failure(&self, failure: Failure) {
        if let Some(failures) = lock(&self.records).failures.as_mut() {
            failures.push(failure);
        }
    }

    fn set_recording(&self, enabled: bool) {
        self.recording.store(enabled, Ordering::SeqCst);
    }

    fn start_timer(&self) {
        lock(&self.stopwatch).start();
    }

    fn stop_timer(&self) {
        lock(&self.stopwatch).stop();
    }
}

/// Recover the guard from a poisoned lock.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct StepFrame {
    node_opened: bool,
    failures: Vec<AssertionFailure>,
}

/// Per-worker lifecycle driver.
///
/// Callbacks must arrive in execution order. Unbalanced story, batch or node
/// callbacks return an error; the worker should be discarded after one.
#[derive(Debug)]
pub struct Worker<'a> {
    aggregator: &'a StatisticsAggregator,
    context: ExecutionContext,
    tree: NodeTree,
    steps: Vec<StepFrame>,
    reporting_enabled: bool,
    runtime_data: BTreeMap<String, String>,
}

impl<'a> Worker<'a> {
    fn new(aggregator: &'a StatisticsAggregator, context: ExecutionContext) -> Self {
        Self {
            aggregator,
            context,
            tree: NodeTree::new(),
            steps: Vec::new(),
            reporting_enabled: true,
            runtime_data: BTreeMap::new(),
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Number of currently open nodes.
    pub fn open_nodes(&self) -> usize {
        self.tree.depth()
    }

    fn bookkeeping(&self) -> bool {
        !self.context.is_dry_run()
    }

    pub fn before_stories_steps(&mut self, phase: Phase) {
        if phase == Phase::After {
            self.aggregator.stop_timer();
        }
        self.aggregator.set_recording(false);
    }

    pub fn after_stories_steps(&mut self, phase: Phase) {
        self.aggregator.set_recording(true);
        match phase {
            Phase::Before => self.aggregator.start_timer(),
            Phase::After => match self.aggregator.persist() {
                Ok(Some(path)) => debug!(path = %path.display(), "statistics written"),
                Ok(None) => {}
                Err(err) => warn!(error = %format!("{err:#}"), "unable to write statistics"),
            },
        }
    }

    pub fn before_batch(&mut self, key: &str) -> Result<()> {
        self.context.put_running_batch(key)
    }

    pub fn after_batch(&mut self) -> Result<String> {
        self.context.remove_running_batch()
    }

    pub fn before_story(&mut self, name: &str, given: bool) -> Result<()> {
        self.context.push_running_story(name, given)?;
        if !given {
            self.tree.clear();
            self.steps.clear();
        }
        if self.bookkeeping() {
            self.tree
                .start(if given { Entity::GivenStory } else { Entity::Story });
        }
        Ok(())
    }

    pub fn after_story(&mut self, given: bool) -> Result<()> {
        let story = self.context.pop_running_story(given)?;
        if self.bookkeeping() {
            let closed = self.end_node()?;
            debug!(story = %story.name, status = closed.status.label(), "story finished");
        }
        if !given {
            self.tree.clear();
        }
        Ok(())
    }

    pub fn before_scenario(&mut self, scenario: &Scenario) -> Result<()> {
        self.context.start_scenario(&scenario.title)?;
        if self.bookkeeping() {
            self.tree.start(Entity::Scenario).has_children = scenario.steps > 0;
        }
        Ok(())
    }

    /// An examples-table row (0-based) of the running scenario starts.
    pub fn example(&mut self, index: usize) {
        self.context.start_example(index);
    }

    /// The scenario was filtered out before running; it only affects the run status.
    pub fn scenario_excluded(&mut self, title: &str, reason: &str) {
        debug!(scenario = title, reason, "scenario excluded");
        self.aggregator.change_status(Status::Skipped);
    }

    pub fn after_scenario(&mut self) -> Result<()> {
        if self.bookkeeping() {
            self.end_node()?;
        }
        self.context.finish_scenario();
        Ok(())
    }

    pub fn before_step(&mut self, step: &str, kind: StepKind) {
        if kind == StepKind::Comment {
            return;
        }
        self.context.start_step(step);
        let node_opened = self.reporting_enabled && self.bookkeeping() && !self.tree.is_empty();
        if node_opened {
            self.tree.start(Entity::Step);
        }
        self.steps.push(StepFrame {
            node_opened,
            failures: Vec::new(),
        });
    }

    pub fn comment(&mut self, step: &str) {
        debug!(step, "comment");
    }

    pub fn successful(&mut self, step: &str) -> Result<()> {
        let frame = self.pop_step();
        self.close_step(step, frame, Status::Passed)
    }

    pub fn ignorable(&mut self, step: &str) -> Result<()> {
        let frame = self.pop_step();
        self.close_step(step, frame, Status::Skipped)
    }

    pub fn pending(&mut self, step: &str) -> Result<()> {
        let frame = self.pop_step();
        self.close_step(step, frame, Status::Pending)
    }

    pub fn not_performed(&mut self, step: &str) -> Result<()> {
        let frame = self.pop_step();
        self.close_step(step, frame, Status::Skipped)
    }

    /// A step failed. Verification failures resolve to known issues only when
    /// every assertion failure of the step is an open known issue; any other
    /// error makes the step broken.
    pub fn failed(&mut self, step: &str, failure: StepFailure) -> Result<()> {
        let frame = self.pop_step();
        let status = match &failure {
            StepFailure::Verification => {
                verification_status(frame.as_ref().map_or(&[][..], |frame| frame.failures.as_slice()))
            }
            StepFailure::Error(message) => {
                if self.reporting_enabled && self.bookkeeping() {
                    self.add_failure(message.clone());
                }
                Status::Broken
            }
        };
        self.close_step(step, frame, status)
    }

    /// Classify a failed assertion of the running step and fold its status
    /// into the step node.
    ///
    /// In a dry run nothing is matched or recorded.
    pub fn assertion_failed(&mut self, message: &str) -> Result<AssertionFailure> {
        if !self.bookkeeping() {
            return Ok(AssertionFailure {
                message: message.to_string(),
                known_issue: None,
            });
        }

        let info = self.context.test_info();
        let known_issue =
            self.aggregator
                .matcher
                .known_issue(message, info.as_ref(), &self.runtime_data);
        let failure = AssertionFailure {
            message: message.to_string(),
            known_issue,
        };
        self.add_failure(message.to_string());

        let update_node = match self.steps.last() {
            Some(frame) => frame.node_opened,
            None => !self.tree.is_empty(),
        };
        if update_node {
            self.tree.update_tail_status(failure.status())?;
        }
        if let Some(frame) = self.steps.last_mut() {
            frame.failures.push(failure.clone());
        }
        Ok(failure)
    }

    /// Steps started while reporting is disabled never open nodes; their
    /// outcomes still reach the run status.
    pub fn set_reporting_enabled(&mut self, enabled: bool) {
        self.reporting_enabled = enabled;
    }

    /// Set (or with `None`, clear) a runtime value consulted by catalog `dataPatterns`.
    pub fn set_runtime_data(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.runtime_data.insert(name.to_string(), value);
            }
            None => {
                self.runtime_data.remove(name);
            }
        }
    }

    fn pop_step(&mut self) -> Option<StepFrame> {
        let frame = self.steps.pop()?;
        self.context.finish_step();
        Some(frame)
    }

    fn close_step(&mut self, step: &str, frame: Option<StepFrame>, status: Status) -> Result<()> {
        if let Some(frame) = frame {
            if frame.node_opened {
                self.tree.update_tail_status(status)?;
                self.end_node()?;
            }
            // Nested step failures belong to the enclosing composite step as well.
            if let Some(parent) = self.steps.last_mut() {
                parent.failures.extend(frame.failures);
            }
        } else {
            debug!(step, "step outcome without a running step");
        }
        self.aggregator.change_status(status);
        Ok(())
    }

    fn end_node(&mut self) -> Result<ClosedNode> {
        let closed = self.tree.end()?;
        self.aggregator.record_node(closed);
        Ok(closed)
    }

    fn add_failure(&self, message: String) {
        let story = self.context.running_story();
        self.aggregator.add_failure(Failure {
            story: story.map(|story| story.name.clone()),
            scenario: story
                .and_then(|story| story.scenario.as_ref())
                .map(|scenario| scenario.title()),
            message,
        });
    }
}
