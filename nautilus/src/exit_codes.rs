//! Stable exit codes for the `nautilus` CLI.

/// Command succeeded, or the job finished with exit status 0.
pub const OK: i32 = 0;
/// Command failed due to invalid config or an internal error.
pub const INVALID: i32 = 1;
/// A path, token or response was rejected before anything ran.
pub const REJECTED: i32 = 2;
/// `nautilus run` watched the job exit non-zero or get stopped.
pub const JOB_FAILED: i32 = 3;
