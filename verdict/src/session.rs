//! Wiring a run from `verdict.toml`: catalog, matcher, aggregator.
//!
//! The CLI commands go through here; embedders can use the same builders.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::aggregator::{Failure, StatisticsAggregator};
use crate::core::context::TestInfo;
use crate::core::known_issue::{AssertionFailure, KnownIssueCatalog};
use crate::core::statistic::Statistics;
use crate::core::status::{ExitCode, Status};
use crate::events::{read_events, replay};
use crate::io::catalog::load_catalog;
use crate::io::config::VerdictConfig;
use crate::io::issue_state::StaticIssueStates;
use crate::matcher::KnownIssueMatcher;

pub fn build_catalog(config: &VerdictConfig) -> Result<KnownIssueCatalog> {
    load_catalog(&config.catalog_paths, &config.properties)
}

/// Matcher over the configured catalog, with pinned issue states if any.
pub fn build_matcher(config: &VerdictConfig) -> Result<KnownIssueMatcher> {
    let catalog = build_catalog(config)?;
    info!(entries = catalog.len(), "known issue catalog ready");
    let mut matcher = KnownIssueMatcher::new(Arc::new(catalog))
        .detect_potentially_known(config.detect_potentially_known);
    if !config.issue_states.is_empty() {
        matcher = matcher.with_issue_states(Arc::new(StaticIssueStates::new(
            config.issue_states.clone(),
        )));
    }
    Ok(matcher)
}

pub fn build_aggregator(config: &VerdictConfig) -> Result<StatisticsAggregator> {
    Ok(StatisticsAggregator::new(build_matcher(config)?)
        .with_statistics_dir(config.statistics_dir.clone())
        .collect_failures(config.collect_failures))
}

/// Classify a single failure message outside of any run.
pub fn classify(
    config: &VerdictConfig,
    message: &str,
    info: Option<&TestInfo>,
    data: &BTreeMap<String, String>,
) -> Result<AssertionFailure> {
    let matcher = build_matcher(config)?;
    Ok(AssertionFailure {
        message: message.to_string(),
        known_issue: matcher.known_issue(message, info, data),
    })
}

/// Outcome of replaying an event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub events: usize,
    pub status: Option<Status>,
    pub exit_code: ExitCode,
    pub duration_ms: u128,
    pub statistics: Statistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<Failure>>,
}

impl RunSummary {
    fn from_aggregator(events: usize, aggregator: &StatisticsAggregator) -> Self {
        Self {
            events,
            status: aggregator.status(),
            exit_code: aggregator.calculate_exit_code(),
            duration_ms: aggregator.duration().as_millis(),
            statistics: aggregator.statistics(),
            failures: aggregator.failures(),
        }
    }
}

/// Replay a JSON Lines event log through a single worker.
///
/// `statistics.json` is written by the log's own after-stories event.
pub fn replay_file(config: &VerdictConfig, events_path: &Path, dry_run: bool) -> Result<RunSummary> {
    let events = read_events(events_path)?;
    let aggregator = build_aggregator(config)?;
    let mut worker = if dry_run {
        aggregator.dry_run_worker()
    } else {
        aggregator.worker()
    };
    let delivered = replay(&mut worker, events)
        .with_context(|| format!("replay {}", events_path.display()))?;
    Ok(RunSummary::from_aggregator(delivered, &aggregator))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::known_issue::IssueState;
    use crate::core::statistic::Entity;

    fn config_in(root: &Path) -> VerdictConfig {
        VerdictConfig::default().resolve_paths(root)
    }

    #[test]
    fn classify_uses_pinned_issue_states() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("known-issues.json"),
            r#"{ "ISSUE-1": { "assertionPattern": "boom", "tracker": "JIRA" } }"#,
        )
        .expect("write catalog");
        let mut config = config_in(temp.path());

        let open = classify(&config, "boom", None, &BTreeMap::new()).expect("classify");
        assert_eq!(open.status(), Status::KnownIssuesOnly);

        config.issue_states.insert(
            "JIRA/ISSUE-1".to_string(),
            IssueState {
                status: Some("Closed".to_string()),
                resolution: Some("Fixed".to_string()),
                fixed: true,
            },
        );
        let fixed = classify(&config, "boom", None, &BTreeMap::new()).expect("classify");
        assert!(fixed.known_issue.as_ref().is_some_and(|issue| issue.fixed));
        assert_eq!(fixed.status(), Status::Failed);
    }

    #[test]
    fn potentially_known_detection_follows_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("known-issues.json"),
            r#"{ "ISSUE-1": { "assertionPattern": "boom", "suitePattern": "Payments" } }"#,
        )
        .expect("write catalog");
        let info = TestInfo {
            suite: Some("Search".to_string()),
            case: None,
            step: None,
        };
        let mut config = config_in(temp.path());

        let loose = classify(&config, "boom", Some(&info), &BTreeMap::new()).expect("classify");
        let issue = loose.known_issue.expect("potentially known");
        assert!(issue.potentially_known);
        assert_eq!(loose.message, "boom");

        config.detect_potentially_known = false;
        let rejected = classify(&config, "boom", Some(&info), &BTreeMap::new()).expect("classify");
        assert_eq!(rejected.known_issue, None);
    }

    #[test]
    fn replay_file_writes_statistics() {
        let temp = tempfile::tempdir().expect("tempdir");
        let events = temp.path().join("events.jsonl");
        fs::write(
            &events,
            r#"{"event":"before_stories_steps","phase":"before"}
{"event":"after_stories_steps","phase":"before"}
{"event":"before_story","name":"Story"}
{"event":"before_scenario","title":"Scenario","steps":1}
{"event":"before_step","step":"Then ok"}
{"event":"successful","step":"Then ok"}
{"event":"after_scenario"}
{"event":"after_story"}
{"event":"before_stories_steps","phase":"after"}
{"event":"after_stories_steps","phase":"after"}
"#,
        )
        .expect("write events");
        let config = config_in(temp.path());

        let summary = replay_file(&config, &events, false).expect("replay");
        assert_eq!(summary.events, 10);
        assert_eq!(summary.exit_code, ExitCode::Passed);
        assert_eq!(summary.statistics[&Entity::Step].passed, 1);
        assert_eq!(summary.failures, None);
        assert!(config.statistics_dir.join("statistics.json").exists());
    }

    #[test]
    fn invalid_catalog_stops_before_replay() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("known-issues.json"),
            r#"{ "ISSUE-1": { "casePattern": "x" } }"#,
        )
        .expect("write catalog");
        let events = temp.path().join("events.jsonl");
        fs::write(&events, "").expect("write events");

        let err = replay_file(&config_in(temp.path()), &events, false).expect_err("invalid");
        assert!(format!("{err:#}").contains("invalid known issues"));
    }
}
