//! BHP Engine: bottom-hole proppant concentration for live pumping data
//!
//! Surface samples (timestamp, pump rate, proppant concentration) stream in
//! one at a time. For each sample the engine works out how long the slurry
//! takes to travel down the wellbore and reports the surface concentration
//! that was pumped that long ago.
//!
//! ## Architecture
//!
//! - **Window**: bounded, time-ordered sample history with binary-search lookup
//! - **Calculator**: offset resolution (rate-derived or fixed) plus historical lookup
//! - **Pipeline**: per-stream state, result cache, and the replaying output stream
//! - **Config**: runtime-tunable tolerances loaded from TOML
//!
//! ## Example
//!
//! ```ignore
//! let mut coordinator = StreamCoordinator::rate_derived(BhpConfig::load())?;
//! coordinator.set_flush_volume(120.0)?;
//! let mut output = coordinator.subscribe();
//! coordinator.ingest(Sample::new(1_705_564_800_000, 15.0, 2.0))?;
//! ```

pub mod calculator;
pub mod config;
pub mod pipeline;
pub mod types;
pub mod window;

// Re-export configuration
pub use config::{BhpConfig, BhpConfigUpdate, ConfigError};

// Re-export commonly used types
pub use types::{
    BhpCalculationResult, BhpDiagnostics, BhpStatus, EnhancedSample, OffsetMode,
    OffsetParameter, Sample,
};

// Re-export engine components
pub use calculator::{BhpCalculator, FixedOffset, OffsetPolicy, RateDerivedOffset};
pub use pipeline::{
    ComputationState, CoordinatorError, CoordinatorStats, ProcessingLoop, ReplayChannel,
    StateError, StreamCoordinator, Subscription,
};
pub use window::{IngestError, TimeWindow};
