//! Known-issue classification of failed assertions.
//!
//! Combines the pure candidate scoring in [`crate::core::known_issue`] with
//! the fixed/open lookup behind [`IssueStateProvider`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::context::TestInfo;
use crate::core::known_issue::{
    IssueState, KnownIssue, KnownIssueCatalog, RuntimeData, best_candidate,
};
use crate::io::issue_state::IssueStateProvider;

/// Finds the best known issue for a failure message.
///
/// Cheap to clone; the catalog and provider are shared.
#[derive(Clone)]
pub struct KnownIssueMatcher {
    catalog: Arc<KnownIssueCatalog>,
    issue_states: Option<Arc<dyn IssueStateProvider>>,
    detect_potentially_known: bool,
}

impl KnownIssueMatcher {
    pub fn new(catalog: Arc<KnownIssueCatalog>) -> Self {
        Self {
            catalog,
            issue_states: None,
            detect_potentially_known: true,
        }
    }

    pub fn with_issue_states(mut self, provider: Arc<dyn IssueStateProvider>) -> Self {
        self.issue_states = Some(provider);
        self
    }

    /// When disabled, loosely matched (potentially known) entries are rejected.
    pub fn detect_potentially_known(mut self, enabled: bool) -> Self {
        self.detect_potentially_known = enabled;
        self
    }

    /// Classify `failure`, returning `None` when no catalog entry survives.
    pub fn known_issue(
        &self,
        failure: &str,
        info: Option<&TestInfo>,
        data: &dyn RuntimeData,
    ) -> Option<KnownIssue> {
        let candidate = best_candidate(
            &self.catalog,
            failure,
            info,
            data,
            self.detect_potentially_known,
        )?;
        debug!(
            id = candidate.id,
            score = candidate.score,
            potentially_known = candidate.potentially_known,
            "known issue matched"
        );

        let definition = &candidate.identifier.definition;
        let details = self.resolve_state(definition.tracker.as_deref(), candidate.id);
        Some(KnownIssue {
            id: candidate.id.to_string(),
            identifier: definition.clone(),
            potentially_known: candidate.potentially_known,
            fixed: details.as_ref().is_some_and(IssueState::is_fixed),
            details,
        })
    }

    fn resolve_state(&self, tracker: Option<&str>, id: &str) -> Option<IssueState> {
        let provider = self.issue_states.as_ref()?;
        match provider.issue_state(tracker, id) {
            Ok(state) => state,
            Err(err) => {
                warn!(id, tracker = ?tracker, error = %err, "unable to resolve issue state; treating as open");
                None
            }
        }
    }
}

impl std::fmt::Debug for KnownIssueMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownIssueMatcher")
            .field("entries", &self.catalog.len())
            .field("issue_states", &self.issue_states.is_some())
            .field("detect_potentially_known", &self.detect_potentially_known)
            .finish()
    }
}
