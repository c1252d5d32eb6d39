//! Stable exit codes for verdict CLI commands.

/// Run passed, or the command succeeded.
pub const OK: i32 = 0;
/// Run failed (including a run that never recorded a status).
pub const FAILED: i32 = 1;
/// Run failed only because of open known issues.
pub const KNOWN_ISSUES: i32 = 2;
/// Command could not run: invalid config, catalog or event log.
pub const INVALID: i32 = FAILED;
