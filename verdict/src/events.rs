//! Typed lifecycle events and in-order replay into a [`Worker`].
//!
//! An event log is JSON Lines: one object per line tagged by `"event"`.
//! Blank lines are ignored.
//!
//! ```text
//! {"event":"before_story","name":"Login"}
//! {"event":"before_scenario","title":"Valid user","steps":1}
//! {"event":"before_step","step":"Then I see home"}
//! {"event":"successful","step":"Then I see home"}
//! {"event":"after_scenario"}
//! {"event":"after_story"}
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::{Phase, Scenario, StepFailure, StepKind, Worker};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    BeforeStoriesSteps {
        phase: Phase,
    },
    AfterStoriesSteps {
        phase: Phase,
    },
    BeforeBatch {
        key: String,
    },
    AfterBatch,
    BeforeStory {
        name: String,
        #[serde(default)]
        given: bool,
    },
    AfterStory {
        #[serde(default)]
        given: bool,
    },
    BeforeScenario {
        title: String,
        #[serde(default)]
        steps: usize,
    },
    Example {
        index: usize,
    },
    ScenarioExcluded {
        title: String,
        reason: String,
    },
    AfterScenario,
    BeforeStep {
        step: String,
        #[serde(default)]
        kind: StepKind,
    },
    Comment {
        step: String,
    },
    Successful {
        step: String,
    },
    Ignorable {
        step: String,
    },
    Pending {
        step: String,
    },
    NotPerformed {
        step: String,
    },
    /// Without `error` the step failed verification; with it the step is broken.
    Failed {
        step: String,
        #[serde(default)]
        error: Option<String>,
    },
    AssertionFailed {
        message: String,
    },
    Reporting {
        enabled: bool,
    },
    RuntimeData {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
}

impl LifecycleEvent {
    /// Deliver this event to `worker`.
    pub fn apply(&self, worker: &mut Worker<'_>) -> Result<()> {
        match self {
            LifecycleEvent::BeforeStoriesSteps { phase } => worker.before_stories_steps(*phase),
            LifecycleEvent::AfterStoriesSteps { phase } => worker.after_stories_steps(*phase),
            LifecycleEvent::BeforeBatch { key } => worker.before_batch(key)?,
            LifecycleEvent::AfterBatch => {
                worker.after_batch()?;
            }
            LifecycleEvent::BeforeStory { name, given } => worker.before_story(name, *given)?,
            LifecycleEvent::AfterStory { given } => worker.after_story(*given)?,
            LifecycleEvent::BeforeScenario { title, steps } => {
                worker.before_scenario(&Scenario::new(title.as_str(), *steps))?;
            }
            LifecycleEvent::Example { index } => worker.example(*index),
            LifecycleEvent::ScenarioExcluded { title, reason } => {
                worker.scenario_excluded(title, reason);
            }
            LifecycleEvent::AfterScenario => worker.after_scenario()?,
            LifecycleEvent::BeforeStep { step, kind } => worker.before_step(step, *kind),
            LifecycleEvent::Comment { step } => worker.comment(step),
            LifecycleEvent::Successful { step } => worker.successful(step)?,
            LifecycleEvent::Ignorable { step } => worker.ignorable(step)?,
            LifecycleEvent::Pending { step } => worker.pending(step)?,
            LifecycleEvent::NotPerformed { step } => worker.not_performed(step)?,
            LifecycleEvent::Failed { step, error } => {
                let failure = error
                    .clone()
                    .map_or(StepFailure::Verification, StepFailure::Error);
                worker.failed(step, failure)?;
            }
            LifecycleEvent::AssertionFailed { message } => {
                worker.assertion_failed(message)?;
            }
            LifecycleEvent::Reporting { enabled } => worker.set_reporting_enabled(*enabled),
            LifecycleEvent::RuntimeData { name, value } => worker.set_runtime_data(name, value.clone()),
        }
        Ok(())
    }
}

/// Parse a JSON Lines event log. Errors name the offending line.
pub fn parse_events(source: &str, contents: &str) -> Result<Vec<LifecycleEvent>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse event at {source}:{}", index + 1))
        })
        .collect()
}

pub fn read_events(path: &Path) -> Result<Vec<LifecycleEvent>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read events {}", path.display()))?;
    parse_events(&path.display().to_string(), &contents)
}

/// Feed `events` to `worker` in order, stopping at the first contract violation.
pub fn replay<I>(worker: &mut Worker<'_>, events: I) -> Result<usize>
where
    I: IntoIterator<Item = LifecycleEvent>,
{
    let mut delivered = 0;
    for event in events {
        event
            .apply(worker)
            .with_context(|| format!("event #{}: {event:?}", delivered + 1))?;
        delivered += 1;
    }
    debug!(delivered, "events replayed");
    Ok(delivered)
}
