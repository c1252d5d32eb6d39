//! Deterministic, pure logic shared by the verdict core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod context;
pub mod known_issue;
pub mod node;
pub mod statistic;
pub mod status;
