//! Issue-state lookup for matched known issues.
//!
//! The [`IssueStateProvider`] trait decouples known-issue classification from
//! the issue tracker that knows whether a defect is fixed. Tracker clients live
//! outside this crate; [`StaticIssueStates`] serves states pinned in
//! configuration and is what tests use.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::core::known_issue::IssueState;

/// Source of fixed/open state for issues.
pub trait IssueStateProvider: Send + Sync {
    /// State of `issue_id` in `tracker` (if the catalog names one).
    ///
    /// `Ok(None)` means the tracker has no state for the issue.
    fn issue_state(&self, tracker: Option<&str>, issue_id: &str) -> Result<Option<IssueState>>;
}

/// States keyed by issue id, optionally qualified as `tracker/issue-id`.
#[derive(Debug, Clone, Default)]
pub struct StaticIssueStates {
    states: BTreeMap<String, IssueState>,
}

impl StaticIssueStates {
    pub fn new(states: BTreeMap<String, IssueState>) -> Self {
        Self { states }
    }
}

impl IssueStateProvider for StaticIssueStates {
    fn issue_state(&self, tracker: Option<&str>, issue_id: &str) -> Result<Option<IssueState>> {
        let qualified = tracker.and_then(|tracker| self.states.get(&format!("{tracker}/{issue_id}")));
        Ok(qualified.or_else(|| self.states.get(issue_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed() -> IssueState {
        IssueState {
            status: Some("Closed".to_string()),
            resolution: Some("Fixed".to_string()),
            fixed: true,
        }
    }

    #[test]
    fn qualified_key_wins_over_plain_id() {
        let mut states = BTreeMap::new();
        states.insert("JIRA/ISSUE-1".to_string(), closed());
        states.insert("ISSUE-1".to_string(), IssueState::default());
        let provider = StaticIssueStates::new(states);

        let state = provider
            .issue_state(Some("JIRA"), "ISSUE-1")
            .expect("lookup")
            .expect("state");
        assert!(state.fixed);

        let state = provider
            .issue_state(None, "ISSUE-1")
            .expect("lookup")
            .expect("state");
        assert!(!state.fixed);
    }

    #[test]
    fn unknown_issue_has_no_state() {
        let provider = StaticIssueStates::default();
        assert_eq!(provider.issue_state(Some("JIRA"), "ISSUE-9").expect("lookup"), None);
    }
}
