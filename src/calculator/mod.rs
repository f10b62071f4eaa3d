//! BHP Calculator - backward-looking bottom-hole concentration lookup
//!
//! For a target timestamp the calculator resolves how long the fluid took
//! to reach the bottom of the well (via the injected [`OffsetPolicy`]),
//! steps back that far in the sample window, and reports the surface
//! concentration of the nearest historical sample.
//!
//! ```text
//! target ──(offset)──> historical timestamp ──(binary search)──> nearest sample
//!                                                                  │
//!                            |Δt| <= tolerance ? concentration : pending
//! ```
//!
//! Every call returns a [`BhpCalculationResult`]; "no value yet" and the
//! stopped-pump zero are ordinary results, never errors.

mod offset;

pub use offset::{policy_for, FixedOffset, OffsetPolicy, RateDerivedOffset, Resolution};

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{BhpConfig, BhpConfigUpdate, ConfigError};
use crate::pipeline::ComputationState;
use crate::types::{BhpCalculationResult, BhpDiagnostics, BhpStatus, OffsetMode};

/// Active config tagged with the write that installed it.
#[derive(Debug, Clone, Copy)]
struct ConfigSnapshot {
    config: BhpConfig,
    generation: u64,
}

/// Stateless lookup engine plus its runtime-tunable tolerances.
///
/// The config sits behind an `ArcSwap` so readers on other threads always
/// see a complete snapshot while it is being replaced. Every write bumps the
/// snapshot's generation, and `calculate` drops any cache filled under an
/// older one.
pub struct BhpCalculator {
    policy: Box<dyn OffsetPolicy>,
    config: ArcSwap<ConfigSnapshot>,
    generations: AtomicU64,
}

impl BhpCalculator {
    /// Create a calculator with an explicit policy. The config is validated.
    pub fn new(policy: Box<dyn OffsetPolicy>, config: BhpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy,
            config: ArcSwap::from_pointee(ConfigSnapshot {
                config,
                generation: 0,
            }),
            generations: AtomicU64::new(0),
        })
    }

    /// Create a calculator with the built-in policy for `mode`.
    pub fn for_mode(mode: OffsetMode, config: BhpConfig) -> Result<Self, ConfigError> {
        Self::new(policy_for(mode), config)
    }

    pub fn mode(&self) -> OffsetMode {
        self.policy.mode()
    }

    /// Compute the bottom-hole concentration for `target_timestamp`.
    ///
    /// Deterministic in `(target_timestamp, state)`; the only side effect is
    /// caching a successful lookup when the policy caches.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn calculate(
        &self,
        target_timestamp: i64,
        state: &mut ComputationState,
    ) -> BhpCalculationResult {
        let ConfigSnapshot { config, generation } = **self.config.load();
        let policy = self.policy.as_ref();
        state.sync_config_generation(generation);

        if policy.uses_cache() {
            if let Some(value) = state.cached_value(target_timestamp) {
                let mut diagnostics = BhpDiagnostics::empty(target_timestamp, BhpStatus::Cached);
                diagnostics.from_cache = true;
                return BhpCalculationResult {
                    value: Some(value),
                    diagnostics,
                };
            }
        }

        let mut diagnostics = BhpDiagnostics::empty(target_timestamp, BhpStatus::Computed);

        let parameter = match policy.parameter(state) {
            Ok(p) => p,
            Err(reason) => return BhpCalculationResult::pending(diagnostics, reason),
        };

        let (min_samples, reason) = policy.min_samples();
        if state.window().len() < min_samples {
            return BhpCalculationResult::pending(diagnostics, reason);
        }

        let (offset_minutes, reference_rate) =
            match policy.resolve(target_timestamp, parameter, state.window(), &config) {
                Resolution::Offset {
                    minutes,
                    reference_rate,
                } => (minutes, reference_rate),
                Resolution::Zero {
                    status,
                    reason,
                    minutes,
                    reference_rate,
                } => {
                    diagnostics.offset_minutes = minutes;
                    diagnostics.reference_rate = reference_rate;
                    debug!(target_timestamp, %status, %reason, "BHP forced to zero");
                    return BhpCalculationResult::zero(diagnostics, status, reason);
                }
                Resolution::Pending { reason } => {
                    return BhpCalculationResult::pending(diagnostics, reason);
                }
            };

        let offset_ms = (offset_minutes * 60_000.0).round() as i64;
        let historical_timestamp = target_timestamp.saturating_sub(offset_ms);
        diagnostics.offset_minutes = offset_minutes;
        diagnostics.offset_ms = offset_ms;
        diagnostics.historical_timestamp = historical_timestamp;
        diagnostics.reference_rate = reference_rate;

        let Some(nearest) = state.window().find_nearest(historical_timestamp) else {
            return BhpCalculationResult::pending(diagnostics, "no historical data point found");
        };

        let time_diff_seconds = nearest.time_diff_ms as f64 / 1000.0;
        diagnostics.historical_sample = Some(nearest.sample);
        diagnostics.time_difference_seconds = time_diff_seconds;

        let (tolerance_seconds, too_far) = policy.tolerance_seconds(&config);
        if time_diff_seconds > tolerance_seconds {
            return BhpCalculationResult::pending(
                diagnostics,
                format!("{too_far}: {time_diff_seconds:.1}s from ideal (max {tolerance_seconds:.1}s)"),
            );
        }

        let value = nearest.sample.concentration;

        // A target beyond the newest sample could resolve differently once more data arrives
        let settled = state
            .window()
            .newest()
            .is_some_and(|s| target_timestamp <= s.timestamp);
        if policy.uses_cache() && settled {
            state.cache_value(target_timestamp, value);
        }

        debug!(
            target_timestamp,
            historical_timestamp,
            offset_minutes,
            value,
            "BHP computed"
        );

        BhpCalculationResult {
            value: Some(value),
            diagnostics,
        }
    }

    // === Configuration ===

    /// Copy of the active config.
    pub fn config(&self) -> BhpConfig {
        self.config.load().config
    }

    /// Bumped by every config write; starts at 0.
    pub fn config_generation(&self) -> u64 {
        self.config.load().generation
    }

    fn install(&self, config: BhpConfig) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        self.config
            .store(Arc::new(ConfigSnapshot { config, generation }));
    }

    /// Apply a partial update. On validation failure the active config is unchanged.
    ///
    /// An empty update is a no-op and keeps cached results.
    pub fn update_config(&self, update: &BhpConfigUpdate) -> Result<BhpConfig, ConfigError> {
        if update.is_empty() {
            return Ok(self.config());
        }
        let next = self.config().with_update(update)?;
        self.install(next);
        info!(?update, "BHP config updated");
        Ok(next)
    }

    /// Replace the whole config. On validation failure the active config is unchanged.
    pub fn set_config(&self, config: BhpConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.install(config);
        info!(?config, "BHP config replaced");
        Ok(())
    }

    /// Restore built-in defaults.
    pub fn reset_config(&self) -> BhpConfig {
        let defaults = BhpConfig::default();
        self.install(defaults);
        info!("BHP config reset to defaults");
        defaults
    }
}

impl std::fmt::Debug for BhpCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BhpCalculator")
            .field("mode", &self.policy.mode())
            .field("config", &self.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;

    const T0: i64 = 1_705_564_800_000;

    /// 20 samples, 60 s apart, rate 15, concentration 2.0 + 0.1 i
    fn ramp_state(mode: OffsetMode) -> ComputationState {
        let mut state = ComputationState::new(mode, 7_200.0);
        for i in 0..20 {
            state
                .add_sample(Sample::new(T0 + i * 60_000, 15.0, 2.0 + 0.1 * i as f64))
                .unwrap();
        }
        state
    }

    fn rate_calculator() -> BhpCalculator {
        BhpCalculator::for_mode(OffsetMode::RateDerived, BhpConfig::default()).unwrap()
    }

    #[test]
    fn test_end_to_end_ramp_lookup() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        state.set_flush_volume(120.0).unwrap();

        let target = T0 + 15 * 60_000;
        let r = calc.calculate(target, &mut state);

        assert!((r.value.unwrap() - 2.7).abs() < 1e-9);
        let d = &r.diagnostics;
        assert_eq!(d.offset_minutes, 8.0);
        assert_eq!(d.offset_ms, 480_000);
        assert_eq!(d.historical_timestamp, target - 480_000);
        assert_eq!(d.historical_sample.unwrap().timestamp, T0 + 7 * 60_000);
        assert_eq!(d.time_difference_seconds, 0.0);
        assert_eq!(d.reference_rate, Some(15.0));
        assert_eq!(d.status, BhpStatus::Computed);
        assert!(!d.from_cache);
        assert!(d.error.is_none());
    }

    #[test]
    fn test_second_call_served_from_cache() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        state.set_flush_volume(120.0).unwrap();

        let target = T0 + 15 * 60_000;
        let first = calc.calculate(target, &mut state);
        let second = calc.calculate(target, &mut state);

        assert_eq!(first.value, second.value);
        assert!(!first.from_cache());
        assert!(second.from_cache());
        assert_eq!(second.diagnostics.status, BhpStatus::Cached);
        assert_eq!(second.diagnostics.target_timestamp, target);
        assert_eq!(second.diagnostics.offset_minutes, 0.0);
        assert!(second.diagnostics.historical_sample.is_none());
    }

    #[test]
    fn test_flush_volume_unset_is_pending() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        let r = calc.calculate(T0, &mut state);
        assert!(r.is_pending());
        assert!(r.error().unwrap().contains("flush volume not set or invalid"));
    }

    #[test]
    fn test_zero_flush_volume_is_pending() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        state.set_flush_volume(0.0).unwrap();
        let r = calc.calculate(T0, &mut state);
        assert!(r.is_pending());
        assert!(r.error().unwrap().contains("flush volume not set or invalid"));
    }

    #[test]
    fn test_single_sample_is_insufficient() {
        let calc = rate_calculator();
        let mut state = ComputationState::new(OffsetMode::RateDerived, 7_200.0);
        state.set_flush_volume(120.0).unwrap();
        state.add_sample(Sample::new(T0, 15.0, 2.0)).unwrap();
        let r = calc.calculate(T0, &mut state);
        assert!(r.is_pending());
        assert_eq!(r.error(), Some("insufficient data points"));
    }

    #[test]
    fn test_early_target_is_too_far() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        state.set_flush_volume(120.0).unwrap();

        // 8 minutes before the 3rd sample is 5 minutes before the first one
        let r = calc.calculate(T0 + 3 * 60_000, &mut state);
        assert!(r.is_pending());
        assert!(r.error().unwrap().contains("historical point too far"));
        assert_eq!(r.diagnostics.historical_sample.unwrap().timestamp, T0);
        assert_eq!(r.diagnostics.time_difference_seconds, 300.0);
        assert!(!state.has_cached(T0 + 3 * 60_000));
    }

    #[test]
    fn test_stopped_pump_returns_zero() {
        let calc = rate_calculator();
        let mut state = ComputationState::new(OffsetMode::RateDerived, 7_200.0);
        state.set_flush_volume(120.0).unwrap();
        state.add_sample(Sample::new(T0, 15.0, 2.0)).unwrap();
        state.add_sample(Sample::new(T0 + 60_000, 0.0, 2.0)).unwrap();

        let r = calc.calculate(T0 + 60_000, &mut state);
        assert_eq!(r.value, Some(0.0));
        assert_eq!(r.diagnostics.status, BhpStatus::PumpStopped);
        assert!(r.error().unwrap().contains("invalid reference rate"));
        assert_eq!(r.diagnostics.reference_rate, Some(0.0));
    }

    #[test]
    fn test_out_of_range_offset_returns_zero() {
        let calc = rate_calculator();
        let mut state = ComputationState::new(OffsetMode::RateDerived, 7_200.0);
        state.set_flush_volume(1_000.0).unwrap();
        state.add_sample(Sample::new(T0, 5.0, 2.0)).unwrap();
        state.add_sample(Sample::new(T0 + 60_000, 5.0, 2.0)).unwrap();

        let r = calc.calculate(T0 + 60_000, &mut state);
        assert_eq!(r.value, Some(0.0));
        assert_eq!(r.diagnostics.status, BhpStatus::OffsetOutOfRange);
        assert!(r.error().unwrap().contains("offset out of valid range"));
        assert!((r.diagnostics.offset_minutes - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_future_target_not_cached() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        state.set_flush_volume(120.0).unwrap();

        // One minute past the newest sample; 8 min back lands on sample 12
        let target = T0 + 20 * 60_000;
        let r = calc.calculate(target, &mut state);
        assert!((r.value.unwrap() - 3.2).abs() < 1e-9);
        assert!(!state.has_cached(target));
    }

    #[test]
    fn test_fixed_offset_lookup() {
        let calc = BhpCalculator::for_mode(OffsetMode::Fixed, BhpConfig::default()).unwrap();
        let mut state = ramp_state(OffsetMode::Fixed);
        state.set_offset_minutes(5.0).unwrap();

        let r = calc.calculate(T0 + 10 * 60_000, &mut state);
        assert!((r.value.unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(r.diagnostics.reference_rate, None);
        assert_eq!(r.diagnostics.offset_ms, 300_000);
        // never cached
        assert!(!state.has_cached(T0 + 10 * 60_000));
        assert!(!calc.calculate(T0 + 10 * 60_000, &mut state).from_cache());
    }

    #[test]
    fn test_duplicate_timestamps_resolve_to_first_arrival() {
        let calc = BhpCalculator::for_mode(OffsetMode::Fixed, BhpConfig::default()).unwrap();
        let mut state = ComputationState::new(OffsetMode::Fixed, 7_200.0);
        state.add_sample(Sample::new(T0, 15.0, 2.0)).unwrap();
        state.add_sample(Sample::new(T0, 15.0, 9.0)).unwrap();
        state.add_sample(Sample::new(T0 + 90_000, 15.0, 5.0)).unwrap();
        state.set_offset_minutes(1.0).unwrap();

        // One minute back from T0+90s is 30 s after the duplicated T0 pair
        let r = calc.calculate(T0 + 90_000, &mut state);
        assert_eq!(r.value, Some(2.0));
        assert_eq!(r.diagnostics.time_difference_seconds, 30.0);
        assert_eq!(r.diagnostics.historical_sample.unwrap().concentration, 2.0);
    }

    #[test]
    fn test_fixed_offset_waits_for_history() {
        let calc = BhpCalculator::for_mode(OffsetMode::Fixed, BhpConfig::default()).unwrap();
        let mut state = ramp_state(OffsetMode::Fixed);
        state.set_offset_minutes(30.0).unwrap();

        let r = calc.calculate(T0 + 10 * 60_000, &mut state);
        assert!(r.is_pending());
        assert!(r.error().unwrap().contains("waiting for data history"));
    }

    #[test]
    fn test_fixed_offset_empty_window() {
        let calc = BhpCalculator::for_mode(OffsetMode::Fixed, BhpConfig::default()).unwrap();
        let mut state = ComputationState::new(OffsetMode::Fixed, 7_200.0);
        state.set_offset_minutes(5.0).unwrap();
        let r = calc.calculate(T0, &mut state);
        assert!(r.is_pending());
        assert_eq!(r.error(), Some("no data points in window"));
    }

    #[test]
    fn test_fixed_offset_unset() {
        let calc = BhpCalculator::for_mode(OffsetMode::Fixed, BhpConfig::default()).unwrap();
        let mut state = ramp_state(OffsetMode::Fixed);
        let r = calc.calculate(T0, &mut state);
        assert!(r.is_pending());
        assert!(r.error().unwrap().contains("offset not set or invalid"));
    }

    #[test]
    fn test_zero_fixed_offset_reads_current_sample() {
        let calc = BhpCalculator::for_mode(OffsetMode::Fixed, BhpConfig::default()).unwrap();
        let mut state = ramp_state(OffsetMode::Fixed);
        state.set_offset_minutes(0.0).unwrap();
        let r = calc.calculate(T0 + 4 * 60_000, &mut state);
        assert!((r.value.unwrap() - 2.4).abs() < 1e-9);
    }

    #[test]
    fn test_tighter_tolerance_applies_immediately() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        // 127.5 bbl / 15 bpm = 8.5 min -> 30 s from the nearest sample
        state.set_flush_volume(127.5).unwrap();

        let target = T0 + 15 * 60_000;
        assert!(!calc.calculate(target, &mut state).is_pending());
        assert!(state.has_cached(target));

        calc.update_config(&BhpConfigUpdate {
            max_time_diff_seconds: Some(10.0),
            ..Default::default()
        })
        .unwrap();
        let r = calc.calculate(target, &mut state);
        assert!(r.is_pending());
        assert_eq!(r.diagnostics.time_difference_seconds, 30.0);
    }

    #[test]
    fn test_config_write_invalidates_cache() {
        let calc = rate_calculator();
        let mut state = ramp_state(OffsetMode::RateDerived);
        state.set_flush_volume(120.0).unwrap();
        let target = T0 + 15 * 60_000;
        calc.calculate(target, &mut state);

        // Empty update changes nothing
        calc.update_config(&BhpConfigUpdate::default()).unwrap();
        assert_eq!(calc.config_generation(), 0);
        assert!(calc.calculate(target, &mut state).from_cache());

        calc.set_config(BhpConfig::default()).unwrap();
        assert_eq!(calc.config_generation(), 1);
        let r = calc.calculate(target, &mut state);
        assert!(!r.from_cache());
        assert!((r.value.unwrap() - 2.7).abs() < 1e-9);
        assert!(calc.calculate(target, &mut state).from_cache());

        calc.reset_config();
        assert_eq!(calc.config_generation(), 2);
        assert!(!calc.calculate(target, &mut state).from_cache());
    }

    #[test]
    fn test_invalid_config_update_keeps_previous() {
        let calc = rate_calculator();
        let before = calc.config();
        let err = calc.update_config(&BhpConfigUpdate {
            min_offset_minutes: Some(500.0),
            ..Default::default()
        });
        assert!(err.is_err());
        assert_eq!(calc.config(), before);

        assert!(calc
            .set_config(BhpConfig {
                window_size_seconds: -1.0,
                ..BhpConfig::default()
            })
            .is_err());
        assert_eq!(calc.config(), before);
    }

    #[test]
    fn test_reset_config() {
        let calc = rate_calculator();
        calc.update_config(&BhpConfigUpdate {
            max_offset_minutes: Some(60.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(calc.config().max_offset_minutes, 60.0);
        assert_eq!(calc.reset_config(), BhpConfig::default());
        assert_eq!(calc.config(), BhpConfig::default());
    }

    #[test]
    fn test_invalid_initial_config_rejected() {
        let config = BhpConfig {
            max_offset_minutes: 0.0,
            ..BhpConfig::default()
        };
        assert!(BhpCalculator::for_mode(OffsetMode::RateDerived, config).is_err());
    }
}
