//! Stream Coordinator - incremental BHP pipeline
//!
//! One call to [`StreamCoordinator::ingest`] runs the whole sequence before
//! returning:
//!
//! ```text
//! STEP 1: Window insert (out-of-order samples rejected, nothing emitted)
//! STEP 2: Eviction + cache purge (same call, inside ComputationState)
//! STEP 3: Calculation for sample.timestamp
//! STEP 4: EnhancedSample emitted to every subscriber
//! STEP 5: Stats stream refreshed
//! ```
//!
//! Exactly one emission per accepted sample, in ingestion order. The
//! coordinator is single-writer: hosts that share it across tasks wrap it
//! in a mutex (see [`SharedCoordinator`]).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::channel::{ReplayChannel, Subscription};
use super::state::{ComputationState, StateError, StateStats};
use crate::calculator::{BhpCalculator, OffsetPolicy};
use crate::config::{BhpConfig, BhpConfigUpdate, ConfigError};
use crate::types::{
    BhpCalculationResult, BhpStatus, EnhancedSample, OffsetMode, OffsetParameter, Sample,
};
use crate::window::IngestError;

/// Coordinator shared between an ingestion task and control surfaces.
pub type SharedCoordinator = Arc<tokio::sync::Mutex<StreamCoordinator>>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregate statistics published on the stats stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub mode: OffsetMode,
    pub state: StateStats,
    pub samples_ingested: u64,
    pub samples_rejected: u64,
    /// Values looked up from history
    pub values_computed: u64,
    /// Values served from the cache
    pub cache_hits: u64,
    /// Stopped-pump or out-of-range zeros
    pub zero_results: u64,
    /// `None` results
    pub pending_results: u64,
}

impl CoordinatorStats {
    fn empty(mode: OffsetMode) -> Self {
        Self {
            mode,
            state: StateStats::default(),
            samples_ingested: 0,
            samples_rejected: 0,
            values_computed: 0,
            cache_hits: 0,
            zero_results: 0,
            pending_results: 0,
        }
    }
}

impl std::fmt::Display for CoordinatorStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BHP ({}): {} samples ({} rejected), {} computed, {} cached, {} zero, {} pending | {}",
            self.mode,
            self.samples_ingested,
            self.samples_rejected,
            self.values_computed,
            self.cache_hits,
            self.zero_results,
            self.pending_results,
            self.state
        )
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Owns the computation state and calculator for one sample stream.
pub struct StreamCoordinator {
    state: ComputationState,
    calculator: BhpCalculator,
    output: ReplayChannel<EnhancedSample>,
    stats_tx: watch::Sender<CoordinatorStats>,
    offset_tx: watch::Sender<Option<OffsetParameter>>,
    stats: CoordinatorStats,
}

impl StreamCoordinator {
    /// Create a coordinator with the built-in policy for `mode`.
    ///
    /// The offset parameter starts unset.
    pub fn new(mode: OffsetMode, config: BhpConfig) -> Result<Self, ConfigError> {
        Self::with_policy(crate::calculator::policy_for(mode), config)
    }

    /// Create a coordinator around a custom offset policy.
    pub fn with_policy(
        policy: Box<dyn OffsetPolicy>,
        config: BhpConfig,
    ) -> Result<Self, ConfigError> {
        let calculator = BhpCalculator::new(policy, config)?;
        let mode = calculator.mode();
        info!(%mode, window_s = config.window_size_seconds, "Initializing BHP stream coordinator");

        let stats = CoordinatorStats::empty(mode);
        let (stats_tx, _) = watch::channel(stats);
        let (offset_tx, _) = watch::channel(None);

        Ok(Self {
            state: ComputationState::new(mode, config.window_size_seconds),
            calculator,
            output: ReplayChannel::new(),
            stats_tx,
            offset_tx,
            stats,
        })
    }

    /// Rate-derived deployment; set the flush volume before values appear.
    pub fn rate_derived(config: BhpConfig) -> Result<Self, ConfigError> {
        Self::new(OffsetMode::RateDerived, config)
    }

    /// Fixed-offset deployment starting at `initial_offset_minutes`
    /// (`config::defaults::DEFAULT_OFFSET_MINUTES` is the usual choice).
    pub fn fixed_offset(
        config: BhpConfig,
        initial_offset_minutes: f64,
    ) -> Result<Self, CoordinatorError> {
        let mut coordinator = Self::new(OffsetMode::Fixed, config)?;
        coordinator.set_offset_minutes(initial_offset_minutes)?;
        Ok(coordinator)
    }

    /// Wrap for sharing between tasks.
    pub fn into_shared(self) -> SharedCoordinator {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    pub fn mode(&self) -> OffsetMode {
        self.state.mode()
    }

    // === Ingestion ===

    /// Ingest one sample: window update, calculation, emission.
    ///
    /// An out-of-order sample is rejected before anything changes and
    /// nothing is emitted.
    pub fn ingest(&mut self, sample: Sample) -> Result<EnhancedSample, IngestError> {
        if let Err(e) = self.state.add_sample(sample) {
            self.stats.samples_rejected += 1;
            warn!(timestamp = sample.timestamp, error = %e, "Sample rejected");
            self.publish_stats();
            return Err(e);
        }
        self.stats.samples_ingested += 1;

        let result = self.calculator.calculate(sample.timestamp, &mut self.state);
        self.record_outcome(&result);

        debug!(
            timestamp = sample.timestamp,
            rate = sample.rate,
            concentration = sample.concentration,
            bhp = ?result.value,
            status = %result.diagnostics.status,
            "Sample ingested"
        );

        let enhanced = EnhancedSample {
            sample,
            bhp: result.value,
            diagnostics: result.diagnostics,
        };
        self.output.publish(enhanced.clone());
        self.publish_stats();
        Ok(enhanced)
    }

    /// Ingest samples in order, one emission each.
    ///
    /// Stops at the first rejected sample; everything before it stays
    /// ingested and emitted.
    pub fn ingest_batch<I>(&mut self, samples: I) -> Result<Vec<EnhancedSample>, IngestError>
    where
        I: IntoIterator<Item = Sample>,
    {
        samples.into_iter().map(|s| self.ingest(s)).collect()
    }

    /// Point query for any timestamp; nothing is emitted.
    pub fn compute_synchronously(&mut self, timestamp: i64) -> BhpCalculationResult {
        self.calculator.calculate(timestamp, &mut self.state)
    }

    fn record_outcome(&mut self, result: &BhpCalculationResult) {
        match result.diagnostics.status {
            BhpStatus::Computed => self.stats.values_computed += 1,
            BhpStatus::Cached => self.stats.cache_hits += 1,
            BhpStatus::PumpStopped | BhpStatus::OffsetOutOfRange => self.stats.zero_results += 1,
            BhpStatus::Pending => self.stats.pending_results += 1,
        }
    }

    // === Offset parameter ===

    /// Set the flush volume (bbl). Must be finite and > 0.
    pub fn set_flush_volume(&mut self, barrels: f64) -> Result<(), CoordinatorError> {
        if !barrels.is_finite() || barrels <= 0.0 {
            warn!(barrels, "Rejected flush volume");
            return Err(StateError::InvalidOffsetParameter {
                name: "flush_volume",
                value: barrels,
            }
            .into());
        }
        self.state.set_flush_volume(barrels)?;
        info!(barrels, "Flush volume set");
        self.publish_offset();
        Ok(())
    }

    /// Set the travel time (minutes). Must be finite and >= 0.
    pub fn set_offset_minutes(&mut self, minutes: f64) -> Result<(), CoordinatorError> {
        if !minutes.is_finite() || minutes < 0.0 {
            warn!(minutes, "Rejected offset minutes");
            return Err(StateError::InvalidOffsetParameter {
                name: "offset_minutes",
                value: minutes,
            }
            .into());
        }
        self.state.set_offset_minutes(minutes)?;
        info!(minutes, "Offset minutes set");
        self.publish_offset();
        Ok(())
    }

    pub fn flush_volume(&self) -> Option<f64> {
        self.state.flush_volume()
    }

    pub fn offset_minutes(&self) -> Option<f64> {
        self.state.offset_minutes()
    }

    pub fn offset_parameter(&self) -> Option<OffsetParameter> {
        self.state.offset_parameter()
    }

    // === Configuration ===

    pub fn config(&self) -> BhpConfig {
        self.calculator.config()
    }

    /// Apply a partial config update.
    ///
    /// A new window span is applied to the live window at once. Cached
    /// values computed under the old tolerances are dropped; an empty update
    /// keeps them.
    pub fn update_config(&mut self, update: &BhpConfigUpdate) -> Result<BhpConfig, ConfigError> {
        let config = self.calculator.update_config(update)?;
        self.apply_config(&config);
        Ok(config)
    }

    /// Replace the whole config.
    pub fn set_config(&mut self, config: BhpConfig) -> Result<(), ConfigError> {
        self.calculator.set_config(config)?;
        self.apply_config(&config);
        Ok(())
    }

    /// Restore default tolerances.
    pub fn reset_config(&mut self) -> BhpConfig {
        let config = self.calculator.reset_config();
        self.apply_config(&config);
        config
    }

    fn apply_config(&mut self, config: &BhpConfig) {
        if config.window_size_ms() != self.state.window().window_size_ms() {
            let evicted = self.state.set_window_size_seconds(config.window_size_seconds);
            info!(window_s = config.window_size_seconds, evicted, "Window resized");
        }
        // Drop the stale cache now so the published stats reflect it
        self.state
            .sync_config_generation(self.calculator.config_generation());
        self.publish_stats();
    }

    // === Lifecycle ===

    /// Clear window, cache, offset parameter and counters. Config is kept.
    pub fn reset(&mut self) {
        self.state.clear();
        self.stats = CoordinatorStats::empty(self.mode());
        self.output.clear_latest();
        info!("BHP stream coordinator reset");
        self.publish_offset();
        self.publish_stats();
    }

    // === Streams ===

    /// Subscribe to enhanced samples. The latest emission (if any) arrives first.
    pub fn subscribe(&self) -> Subscription<EnhancedSample> {
        self.output.subscribe()
    }

    /// Handle to the output channel, for subscribing without the coordinator.
    pub fn output(&self) -> ReplayChannel<EnhancedSample> {
        self.output.clone()
    }

    /// Stats stream; the receiver always holds the latest snapshot.
    pub fn subscribe_stats(&self) -> watch::Receiver<CoordinatorStats> {
        self.stats_tx.subscribe()
    }

    /// Offset parameter stream (flush volume or offset minutes).
    pub fn subscribe_offset(&self) -> watch::Receiver<Option<OffsetParameter>> {
        self.offset_tx.subscribe()
    }

    fn publish_stats(&mut self) {
        self.stats.state = self.state.stats();
        self.stats_tx.send_replace(self.stats);
    }

    fn publish_offset(&mut self) {
        self.offset_tx.send_replace(self.state.offset_parameter());
        self.publish_stats();
    }

    // === Read accessors ===

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            state: self.state.stats(),
            ..self.stats
        }
    }

    /// Latest emission.
    pub fn latest(&self) -> Option<EnhancedSample> {
        self.output.latest()
    }

    /// Copy of the window contents, oldest first.
    pub fn window_samples(&self) -> Vec<Sample> {
        self.state.window_samples()
    }

    pub fn has_cached(&self, timestamp: i64) -> bool {
        self.state.has_cached(timestamp)
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("calculator", &self.calculator)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
