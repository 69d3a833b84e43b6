//! Stable exit codes for navigator CLI commands.

/// Command succeeded; a walk reached the end of the task.
pub const OK: i32 = 0;
/// Command failed due to an invalid task, config, answers file, or other errors.
pub const INVALID: i32 = 1;
/// `navigator walk` ended early because a rule requested exit.
pub const EXITED: i32 = 2;
/// `navigator walk` stopped at `walk.max_steps` before the task ended.
pub const STEP_LIMIT: i32 = 3;
