//! Per-worker execution context: running stories, scenario, steps and batch.
//!
//! One `ExecutionContext` exists per worker and is never shared. Push/pop of
//! stories and batches must be paired; an unbalanced call is a lifecycle
//! contract violation and is reported as an error the caller should not
//! recover from.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

/// Scenario currently executing inside a running story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningScenario {
    title: String,
    example_index: Option<usize>,
}

impl RunningScenario {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            example_index: None,
        }
    }

    /// Title including the 1-based example row, e.g. `"Login [2]"`.
    pub fn title(&self) -> String {
        match self.example_index {
            Some(index) => format!("{} [{}]", self.title, index + 1),
            None => self.title.clone(),
        }
    }
}

/// A story (or given story) currently executing on this worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningStory {
    pub name: String,
    pub given: bool,
    pub scenario: Option<RunningScenario>,
    /// Running step names, innermost last. Composite steps nest.
    pub steps: Vec<String>,
}

impl RunningStory {
    pub fn new(name: impl Into<String>, given: bool) -> Self {
        Self {
            name: name.into(),
            given,
            scenario: None,
            steps: Vec::new(),
        }
    }

    pub fn current_step(&self) -> Option<&str> {
        self.steps.last().map(String::as_str)
    }
}

/// Identity of the currently executing test, captured when an assertion fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    pub suite: Option<String>,
    pub case: Option<String>,
    pub step: Option<String>,
}

/// Per-worker store of the running-story stack, batch and dry-run flag.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    stories: Vec<RunningStory>,
    batch: Option<String>,
    dry_run: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Enter a story. A given story nests under the current one; a root story
    /// starts a fresh stack.
    pub fn push_running_story(&mut self, name: &str, given: bool) -> Result<()> {
        if name.trim().is_empty() {
            bail!("story name must not be empty");
        }
        if given {
            if self.stories.is_empty() {
                bail!("given story '{name}' started outside of a running story");
            }
        } else {
            self.stories.clear();
        }
        self.stories.push(RunningStory::new(name, given));
        Ok(())
    }

    /// Leave the innermost story, which must have been entered with the same `given` flag.
    pub fn pop_running_story(&mut self, given: bool) -> Result<RunningStory> {
        let tail = self
            .stories
            .last()
            .ok_or_else(|| anyhow!("no running story to remove"))?;
        if tail.given != given {
            bail!(
                "running story '{}' is {} but a {} story end was received",
                tail.name,
                story_label(tail.given),
                story_label(given)
            );
        }
        self.stories
            .pop()
            .ok_or_else(|| anyhow!("no running story to remove"))
    }

    pub fn running_story(&self) -> Option<&RunningStory> {
        self.stories.last()
    }

    pub fn running_story_mut(&mut self) -> Option<&mut RunningStory> {
        self.stories.last_mut()
    }

    /// Root story of the current chain (the story that is not a given story).
    pub fn root_story(&self) -> Option<&RunningStory> {
        self.stories.first()
    }

    /// Running stories from the most nested given story up to the root.
    pub fn stories_chain(&self) -> impl Iterator<Item = &RunningStory> {
        self.stories.iter().rev()
    }

    pub fn start_scenario(&mut self, title: &str) -> Result<()> {
        let story = self
            .running_story_mut()
            .ok_or_else(|| anyhow!("scenario '{title}' started outside of a running story"))?;
        story.scenario = Some(RunningScenario::new(title));
        Ok(())
    }

    /// Mark the running scenario as executing the examples row at `index` (0-based).
    pub fn start_example(&mut self, index: usize) {
        if let Some(scenario) = self
            .running_story_mut()
            .and_then(|story| story.scenario.as_mut())
        {
            scenario.example_index = Some(index);
        }
    }

    pub fn finish_scenario(&mut self) {
        if let Some(story) = self.running_story_mut() {
            story.scenario = None;
        }
    }

    /// Record a running step. Steps outside of any story (run-level hooks) are not tracked.
    pub fn start_step(&mut self, step: &str) {
        if let Some(story) = self.running_story_mut() {
            story.steps.push(step.to_string());
        }
    }

    pub fn finish_step(&mut self) -> Option<String> {
        self.running_story_mut().and_then(|story| story.steps.pop())
    }

    /// Snapshot of the current story/scenario/step, or `None` outside of a story.
    pub fn test_info(&self) -> Option<TestInfo> {
        let story = self.running_story()?;
        Some(TestInfo {
            suite: Some(story.name.clone()),
            case: story.scenario.as_ref().map(RunningScenario::title),
            step: story.current_step().map(str::to_string),
        })
    }

    pub fn put_running_batch(&mut self, key: &str) -> Result<()> {
        if let Some(current) = &self.batch {
            bail!("batch '{key}' started while batch '{current}' is still running");
        }
        self.batch = Some(key.to_string());
        Ok(())
    }

    pub fn running_batch(&self) -> Result<&str> {
        self.batch
            .as_deref()
            .ok_or_else(|| anyhow!("no running batch"))
    }

    pub fn remove_running_batch(&mut self) -> Result<String> {
        self.batch.take().ok_or_else(|| anyhow!("no running batch"))
    }
}

fn story_label(given: bool) -> &'static str {
    if given { "a given" } else { "a root" }
}
