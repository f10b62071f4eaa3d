//! Shared value types for the bottom-hole concentration engine
//!
//! - `Sample`: one surface measurement (input)
//! - `OffsetMode` / `OffsetParameter`: what drives the travel-time offset
//! - `BhpCalculationResult` / `BhpDiagnostics`: calculator output
//! - `EnhancedSample`: sample + result, emitted to subscribers

mod calculation;
mod sample;

pub use calculation::*;
pub use sample::*;
