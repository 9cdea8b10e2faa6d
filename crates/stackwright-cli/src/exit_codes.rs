//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - a deploy command or composition check failed
pub const ERROR: i32 = 1;

/// Configuration error - missing or malformed config document keys
pub const CONFIG_ERROR: i32 = 2;

/// Render error - the renderer failed for at least one component
pub const RENDER_ERROR: i32 = 3;

/// Namespace error - no namespace could be resolved for a component
pub const NAMESPACE_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Seal error - a secret could not be sealed
pub const SEAL_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
