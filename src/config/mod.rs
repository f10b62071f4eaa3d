//! BHP Configuration Module
//!
//! Calculator tolerances loaded from TOML, validated on every write.
//!
//! ## Loading Order
//!
//! 1. `BHP_CONFIG` environment variable (path to TOML file)
//! 2. `bhp_config.toml` in the current working directory
//! 3. Built-in defaults (`config::defaults`)
//!
//! ## Usage
//!
//! ```ignore
//! let config = BhpConfig::load();
//! let coordinator = StreamCoordinator::rate_derived(config)?;
//!
//! // Later, at runtime:
//! coordinator.update_config(&BhpConfigUpdate {
//!     max_time_diff_seconds: Some(30.0),
//!     ..Default::default()
//! })?;
//! ```

mod bhp_config;
pub mod defaults;
pub mod validation;

pub use bhp_config::*;
