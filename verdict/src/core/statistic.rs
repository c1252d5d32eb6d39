//! Per-entity outcome counters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::status::Status;

/// Kind of executable entity tracked by the node tree.
///
/// Declaration order is the persisted order of `statistics.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Entity {
    Story,
    Scenario,
    Step,
    GivenStory,
}

impl Entity {
    pub const ALL: [Entity; 4] = [
        Entity::Story,
        Entity::Scenario,
        Entity::Step,
        Entity::GivenStory,
    ];
}

/// Outcome counters for one entity kind across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistic {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub broken: u64,
    pub skipped: u64,
    pub pending: u64,
    pub known_issue: u64,
}

impl Statistic {
    /// Count one closed node with the given final status.
    pub fn record(&mut self, status: Status) {
        self.total += 1;
        let counter = match status {
            Status::Passed => &mut self.passed,
            Status::Failed => &mut self.failed,
            Status::Broken => &mut self.broken,
            Status::Skipped => &mut self.skipped,
            Status::Pending => &mut self.pending,
            Status::KnownIssuesOnly => &mut self.known_issue,
        };
        *counter += 1;
    }

    pub fn count(&self, status: Status) -> u64 {
        match status {
            Status::Passed => self.passed,
            Status::Failed => self.failed,
            Status::Broken => self.broken,
            Status::Skipped => self.skipped,
            Status::Pending => self.pending,
            Status::KnownIssuesOnly => self.known_issue,
        }
    }
}

/// Counters for every entity kind, always populated for all of [`Entity::ALL`].
pub type Statistics = BTreeMap<Entity, Statistic>;

/// Fresh, zeroed statistics for every entity kind.
pub fn empty_statistics() -> Statistics {
    Entity::ALL
        .iter()
        .map(|entity| (*entity, Statistic::default()))
        .collect()
}
