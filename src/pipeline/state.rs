//! Computation State
//!
//! Owns the sample window, the result cache, and the offset parameter for
//! one stream. The cache is kept coherent with the window: an eviction
//! purges every cache key older than the new oldest sample in the same call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::types::{OffsetMode, OffsetParameter, Sample};
use crate::window::{IngestError, TimeWindow};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateError {
    #[error("Invalid {name}: {value} (must be a finite, non-negative number)")]
    InvalidOffsetParameter { name: &'static str, value: f64 },

    #[error("Offset parameter mismatch: state is {expected}, got a {actual} parameter")]
    ModeMismatch {
        expected: OffsetMode,
        actual: OffsetMode,
    },
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of window and cache occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StateStats {
    pub window_size: usize,
    pub cache_size: usize,
    pub window_start: Option<i64>,
    pub window_end: Option<i64>,
    pub window_duration_minutes: f64,
}

impl std::fmt::Display for StateStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Window: {} samples over {:.1} min, {} cached results",
            self.window_size, self.window_duration_minutes, self.cache_size
        )
    }
}

// ============================================================================
// Computation State
// ============================================================================

/// Per-stream state mutated only by the ingestion path.
#[derive(Debug, Clone)]
pub struct ComputationState {
    mode: OffsetMode,
    window: TimeWindow,
    /// target timestamp -> computed value
    cache: BTreeMap<i64, f64>,
    /// Calculator config generation the cache was filled under
    config_generation: u64,
    offset: Option<OffsetParameter>,
}

impl ComputationState {
    pub fn new(mode: OffsetMode, window_size_seconds: f64) -> Self {
        Self {
            mode,
            window: TimeWindow::new(window_size_seconds),
            cache: BTreeMap::new(),
            config_generation: 0,
            offset: None,
        }
    }

    pub fn mode(&self) -> OffsetMode {
        self.mode
    }

    /// Insert a sample, evicting old history and the cache entries keyed by it.
    ///
    /// Returns the evicted samples. An out-of-order sample is rejected and
    /// nothing changes.
    pub fn add_sample(&mut self, sample: Sample) -> Result<Vec<Sample>, IngestError> {
        let evicted = self.window.add(sample)?;
        if !evicted.is_empty() {
            self.purge_cache_after_eviction(&evicted);
        }
        Ok(evicted)
    }

    /// Resize the window, evicting (and purging cache) as needed.
    pub fn set_window_size_seconds(&mut self, window_size_seconds: f64) -> usize {
        let evicted = self.window.set_window_size_seconds(window_size_seconds);
        if !evicted.is_empty() {
            self.purge_cache_after_eviction(&evicted);
        }
        evicted.len()
    }

    fn purge_cache_after_eviction(&mut self, evicted: &[Sample]) {
        let before = self.cache.len();
        for s in evicted {
            self.cache.remove(&s.timestamp);
        }
        // What-if queries may have cached keys that were never sample timestamps
        if let Some(oldest) = self.window.oldest().map(|s| s.timestamp) {
            self.cache = self.cache.split_off(&oldest);
        } else {
            self.cache.clear();
        }
        debug!(
            evicted = evicted.len(),
            purged = before - self.cache.len(),
            "Window eviction"
        );
    }

    // === Offset parameter ===

    fn set_parameter(&mut self, param: OffsetParameter) -> Result<(), StateError> {
        if param.mode() != self.mode {
            return Err(StateError::ModeMismatch {
                expected: self.mode,
                actual: param.mode(),
            });
        }
        let value = param.value();
        if !value.is_finite() || value < 0.0 {
            return Err(StateError::InvalidOffsetParameter {
                name: param.name(),
                value,
            });
        }
        if self.offset != Some(param) {
            // Cached values were derived from the previous parameter
            self.cache.clear();
            self.offset = Some(param);
        }
        Ok(())
    }

    pub fn set_flush_volume(&mut self, barrels: f64) -> Result<(), StateError> {
        self.set_parameter(OffsetParameter::FlushVolume(barrels))
    }

    pub fn flush_volume(&self) -> Option<f64> {
        match self.offset {
            Some(OffsetParameter::FlushVolume(v)) => Some(v),
            _ => None,
        }
    }

    pub fn set_offset_minutes(&mut self, minutes: f64) -> Result<(), StateError> {
        self.set_parameter(OffsetParameter::OffsetMinutes(minutes))
    }

    pub fn offset_minutes(&self) -> Option<f64> {
        match self.offset {
            Some(OffsetParameter::OffsetMinutes(m)) => Some(m),
            _ => None,
        }
    }

    pub fn offset_parameter(&self) -> Option<OffsetParameter> {
        self.offset
    }

    // === Cache ===

    pub fn cached_value(&self, timestamp: i64) -> Option<f64> {
        self.cache.get(&timestamp).copied()
    }

    pub fn cache_value(&mut self, timestamp: i64, value: f64) {
        self.cache.insert(timestamp, value);
    }

    pub fn has_cached(&self, timestamp: i64) -> bool {
        self.cache.contains_key(&timestamp)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop the cache if it was filled under a different config generation.
    pub fn sync_config_generation(&mut self, generation: u64) {
        if self.config_generation != generation {
            if !self.cache.is_empty() {
                debug!(
                    from = self.config_generation,
                    to = generation,
                    dropped = self.cache.len(),
                    "Config changed, cache invalidated"
                );
            }
            self.cache.clear();
            self.config_generation = generation;
        }
    }

    // === Window access ===

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Copy of the window contents, oldest first.
    pub fn window_samples(&self) -> Vec<Sample> {
        self.window.samples()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> StateStats {
        let w = self.window.stats();
        StateStats {
            window_size: w.size,
            cache_size: self.cache.len(),
            window_start: w.oldest_timestamp,
            window_end: w.newest_timestamp,
            window_duration_minutes: w.duration_ms as f64 / 60_000.0,
        }
    }

    /// Empty the window and cache and unset the offset parameter.
    pub fn clear(&mut self) {
        self.window.clear();
        self.cache.clear();
        self.offset = None;
    }
}
