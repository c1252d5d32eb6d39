//! I/O helpers: configuration, catalog files, issue states, statistics output.

pub mod catalog;
pub mod config;
pub mod issue_state;
pub mod statistics_store;
