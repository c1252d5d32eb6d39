//! Outcome tracking for BDD test runs.
//!
//! This crate follows the nested execution of stories, given stories,
//! scenarios and steps, resolves each node's final status by severity,
//! classifies failed assertions against a catalog of known issues, and
//! aggregates per-entity counters and a run exit code. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (status priorities, node tree,
//!   execution context, known-issue scoring). No I/O.
//! - **[`io`]**: Side-effecting operations (config and catalog files,
//!   `statistics.json`, issue-state lookup).
//!
//! Orchestration modules ([`aggregator`], [`matcher`], [`events`], [`session`])
//! connect the two and back the CLI commands.

pub mod aggregator;
pub mod core;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod matcher;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
