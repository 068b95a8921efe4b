//! Stable exit codes for runner CLI commands.

/// Command succeeded; for `run`, every script was applied.
pub const OK: i32 = 0;
/// Bad arguments, invalid config, missing script root or an unusable run log.
pub const INVALID: i32 = 1;
/// A script failed; the run log holds the error.
pub const FAILED: i32 = 2;
