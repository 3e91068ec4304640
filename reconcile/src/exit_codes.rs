//! Stable exit codes for reconcile CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/profile, an invariant violation or other errors.
pub const INVALID: i32 = 1;
/// `reconcile setup --apply` finished but at least one executed step failed.
pub const SETUP_FAILED: i32 = 2;
