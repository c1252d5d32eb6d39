//! Test-only helpers for building catalogs, configs and event logs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::core::known_issue::{KnownIssueCatalog, KnownIssueIdentifier};
use crate::events::LifecycleEvent;
use crate::io::catalog::CATALOG_FILE;
use crate::io::config::CONFIG_FILE;

/// Identifier with only an assertion pattern set.
pub fn identifier(assertion: &str) -> KnownIssueIdentifier {
    KnownIssueIdentifier {
        assertion_pattern: assertion.to_string(),
        ..KnownIssueIdentifier::default()
    }
}

/// Compiled catalog of assertion-only identifiers, in the given order.
pub fn catalog_of(entries: &[(&str, &str)]) -> Arc<KnownIssueCatalog> {
    let identifiers = entries
        .iter()
        .map(|(id, assertion)| (id.to_string(), identifier(assertion)))
        .collect();
    Arc::new(KnownIssueCatalog::compile(identifiers).expect("valid test catalog"))
}

/// A scenario with a single step that ends with `outcome`.
///
/// `outcome` is one of the step terminal events (successful, failed, ...);
/// `assertions` are reported while the step runs.
pub fn single_step_story(
    story: &str,
    scenario: &str,
    step: &str,
    assertions: &[&str],
    outcome: LifecycleEvent,
) -> Vec<LifecycleEvent> {
    let mut events = vec![
        LifecycleEvent::BeforeStory {
            name: story.to_string(),
            given: false,
        },
        LifecycleEvent::BeforeScenario {
            title: scenario.to_string(),
            steps: 1,
        },
        LifecycleEvent::BeforeStep {
            step: step.to_string(),
            kind: Default::default(),
        },
    ];
    events.extend(assertions.iter().map(|message| LifecycleEvent::AssertionFailed {
        message: message.to_string(),
    }));
    events.push(outcome);
    events.push(LifecycleEvent::AfterScenario);
    events.push(LifecycleEvent::AfterStory { given: false });
    events
}

/// Temporary project directory holding `verdict.toml`, a catalog and event logs.
pub struct TestProject {
    pub temp: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            temp: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join(CONFIG_FILE)
    }

    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.config_path();
        fs::write(&path, contents).expect("write config");
        path
    }

    /// Write the default catalog file (`known-issues.json`).
    pub fn write_catalog(&self, contents: &str) -> PathBuf {
        let path = self.root().join(CATALOG_FILE);
        fs::write(&path, contents).expect("write catalog");
        path
    }

    /// Write `events` as a JSON Lines log.
    pub fn write_events(&self, name: &str, events: &[LifecycleEvent]) -> PathBuf {
        let path = self.root().join(name);
        let mut buf = String::new();
        for event in events {
            buf.push_str(&serde_json::to_string(event).expect("serialize event"));
            buf.push('\n');
        }
        fs::write(&path, buf).expect("write events");
        path
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
