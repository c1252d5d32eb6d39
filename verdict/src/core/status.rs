//! Outcome statuses and the priority rules that fold them together.
//!
//! Lower priority values are more severe. A status may only be replaced by one
//! that is strictly more severe, so folding any sequence of statuses yields the
//! worst one seen.

use serde::{Deserialize, Serialize};

/// Final outcome of an executed node or of the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Passed,
    KnownIssuesOnly,
    Pending,
    Skipped,
    Failed,
    Broken,
}

/// Severity table, most severe first. `PRIORITIES[i].1 == i`.
pub const PRIORITIES: [(Status, u8); 6] = [
    (Status::Failed, 0),
    (Status::Broken, 1),
    (Status::Pending, 2),
    (Status::KnownIssuesOnly, 3),
    (Status::Skipped, 4),
    (Status::Passed, 5),
];

impl Status {
    /// Severity priority; lower is more severe.
    pub fn priority(self) -> u8 {
        match self {
            Status::Failed => 0,
            Status::Broken => 1,
            Status::Pending => 2,
            Status::KnownIssuesOnly => 3,
            Status::Skipped => 4,
            Status::Passed => 5,
        }
    }

    /// True if `self` is strictly more severe than `other`.
    pub fn is_worse_than(self, other: Status) -> bool {
        self.priority() < other.priority()
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::KnownIssuesOnly => "known issues only",
            Status::Pending => "pending",
            Status::Skipped => "skipped",
            Status::Failed => "failed",
            Status::Broken => "broken",
        }
    }
}

/// Fold `candidate` into `current`: the result is the more severe of the two.
///
/// An unset status always takes the candidate. Equal severity keeps the
/// current value.
pub fn worsen(current: Option<Status>, candidate: Status) -> Status {
    match current {
        Some(status) if !candidate.is_worse_than(status) => status,
        _ => candidate,
    }
}

/// Most severe status in `statuses`, or `None` if empty.
///
/// On equal severity the earliest entry wins.
pub fn most_severe<I: IntoIterator<Item = Status>>(statuses: I) -> Option<Status> {
    statuses
        .into_iter()
        .fold(None, |acc, status| Some(worsen(acc, status)))
}

/// Process exit classification of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCode {
    Passed,
    KnownIssues,
    Failed,
}

impl ExitCode {
    /// Map the run-wide worst status to an exit classification.
    ///
    /// A run that never recorded a status is a failure.
    pub fn from_status(status: Option<Status>) -> Self {
        match status {
            Some(Status::Passed) => ExitCode::Passed,
            Some(Status::KnownIssuesOnly) => ExitCode::KnownIssues,
            _ => ExitCode::Failed,
        }
    }

    /// Numeric process exit code (see [`crate::exit_codes`]).
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Passed => crate::exit_codes::OK,
            ExitCode::KnownIssues => crate::exit_codes::KNOWN_ISSUES,
            ExitCode::Failed => crate::exit_codes::FAILED,
        }
    }
}
