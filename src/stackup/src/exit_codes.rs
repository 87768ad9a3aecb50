//! Process exit codes.

/// Setup completed / deployment healthy
pub const SUCCESS: i32 = 0;
/// At least one fatal condition
pub const FAILURE: i32 = 1;
/// Operator declined a confirmation needed to proceed
pub const DECLINED: i32 = 2;
/// Interrupted (Ctrl+C)
pub const INTERRUPTED: i32 = 130;
