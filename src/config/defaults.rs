//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Time Window
// ============================================================================

/// Sliding window span (seconds). 7 200 = 2 hours of pumping history.
pub const DEFAULT_WINDOW_SIZE_SECS: f64 = 7_200.0;

// ============================================================================
// Calculator Tolerances
// ============================================================================

/// Maximum gap between the ideal historical timestamp and the sample used (seconds).
pub const DEFAULT_MAX_TIME_DIFF_SECS: f64 = 60.0;

/// Longest travel time accepted from flush volume / rate (minutes).
pub const DEFAULT_MAX_OFFSET_MINUTES: f64 = 120.0;

/// Shortest travel time accepted from flush volume / rate (minutes).
pub const DEFAULT_MIN_OFFSET_MINUTES: f64 = 0.1;

/// Acceptance tolerance for fixed-offset lookups (seconds).
pub const DEFAULT_FIXED_OFFSET_TOLERANCE_SECS: f64 = 60.0;

/// Minimum samples in the window before a rate-derived lookup is attempted.
pub const MIN_SAMPLES_FOR_RATE_DERIVED: usize = 2;

/// Minimum samples in the window before a fixed-offset lookup is attempted.
pub const MIN_SAMPLES_FOR_FIXED: usize = 1;

// ============================================================================
// Offset Parameter
// ============================================================================

/// Initial travel time for fixed-offset deployments (minutes).
pub const DEFAULT_OFFSET_MINUTES: f64 = 5.0;

// ============================================================================
// Config File
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "BHP_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "bhp_config.toml";
