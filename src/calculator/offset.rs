//! Offset policies - how the surface-to-bottom travel time is resolved
//!
//! ## Policies
//!
//! 1. **RateDerived** - offset = flush volume / pump rate near the target.
//!    Results are cached. A stopped pump or an implausible offset yields 0.
//! 2. **Fixed** - offset is the operator-set minutes value. Never cached.

use crate::config::defaults::{MIN_SAMPLES_FOR_FIXED, MIN_SAMPLES_FOR_RATE_DERIVED};
use crate::config::BhpConfig;
use crate::pipeline::ComputationState;
use crate::types::{BhpStatus, OffsetMode};
use crate::window::TimeWindow;

/// Outcome of resolving the offset for one target timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Travel time resolved; continue to the historical lookup
    Offset {
        minutes: f64,
        reference_rate: Option<f64>,
    },
    /// Value is zero by definition (stopped pump, offset out of bounds)
    Zero {
        status: BhpStatus,
        reason: String,
        minutes: f64,
        reference_rate: Option<f64>,
    },
    /// Nothing can be said yet
    Pending { reason: String },
}

/// Strategy for turning the state's offset parameter into a travel time.
///
/// One policy is injected into a [`BhpCalculator`](super::BhpCalculator)
/// per deployment.
pub trait OffsetPolicy: Send + Sync {
    fn mode(&self) -> OffsetMode;

    /// Whether successful lookups are memoized in the state cache
    fn uses_cache(&self) -> bool;

    /// Extract the usable parameter from the state, or the reason it is unusable.
    fn parameter(&self, state: &ComputationState) -> Result<f64, String>;

    /// Samples required before a lookup is attempted, with the reason
    /// reported when the window holds fewer.
    fn min_samples(&self) -> (usize, &'static str);

    fn resolve(
        &self,
        target_timestamp: i64,
        parameter: f64,
        window: &TimeWindow,
        config: &BhpConfig,
    ) -> Resolution;

    /// Largest accepted gap between the ideal and the found historical
    /// sample (seconds), with the reason reported when it is exceeded.
    fn tolerance_seconds(&self, config: &BhpConfig) -> (f64, &'static str);
}

/// Build the policy for a mode.
pub fn policy_for(mode: OffsetMode) -> Box<dyn OffsetPolicy> {
    match mode {
        OffsetMode::RateDerived => Box::new(RateDerivedOffset),
        OffsetMode::Fixed => Box::new(FixedOffset),
    }
}

// ============================================================================
// Rate-derived
// ============================================================================

/// Offset = flush volume (bbl) / reference pump rate (bbl/min).
pub struct RateDerivedOffset;

impl RateDerivedOffset {
    /// Pump rate in effect at the target time.
    ///
    /// Exact timestamp match first, then the latest sample at or before the
    /// target, then (target precedes all data) the newest sample.
    fn reference_rate(target_timestamp: i64, window: &TimeWindow) -> Option<f64> {
        window
            .find_exact(target_timestamp)
            .or_else(|| window.latest_at_or_before(target_timestamp))
            .or_else(|| window.newest())
            .map(|s| s.rate)
    }
}

impl OffsetPolicy for RateDerivedOffset {
    fn mode(&self) -> OffsetMode {
        OffsetMode::RateDerived
    }

    fn uses_cache(&self) -> bool {
        true
    }

    fn parameter(&self, state: &ComputationState) -> Result<f64, String> {
        match state.flush_volume() {
            Some(v) if v.is_finite() && v > 0.0 => Ok(v),
            other => Err(format!("flush volume not set or invalid ({other:?})")),
        }
    }

    fn min_samples(&self) -> (usize, &'static str) {
        (MIN_SAMPLES_FOR_RATE_DERIVED, "insufficient data points")
    }

    fn resolve(
        &self,
        target_timestamp: i64,
        flush_volume: f64,
        window: &TimeWindow,
        config: &BhpConfig,
    ) -> Resolution {
        let Some(rate) = Self::reference_rate(target_timestamp, window) else {
            return Resolution::Pending {
                reason: "no data points in window".to_string(),
            };
        };

        if !rate.is_finite() || rate <= 0.0 {
            return Resolution::Zero {
                status: BhpStatus::PumpStopped,
                reason: format!("invalid reference rate: {rate}"),
                minutes: 0.0,
                reference_rate: Some(rate),
            };
        }

        let minutes = flush_volume / rate;
        if !minutes.is_finite()
            || minutes < config.min_offset_minutes
            || minutes > config.max_offset_minutes
        {
            return Resolution::Zero {
                status: BhpStatus::OffsetOutOfRange,
                reason: format!(
                    "offset out of valid range: {minutes:.2} min (allowed {:.2}-{:.2})",
                    config.min_offset_minutes, config.max_offset_minutes
                ),
                minutes,
                reference_rate: Some(rate),
            };
        }

        Resolution::Offset {
            minutes,
            reference_rate: Some(rate),
        }
    }

    fn tolerance_seconds(&self, config: &BhpConfig) -> (f64, &'static str) {
        (config.max_time_diff_seconds, "historical point too far")
    }
}

// ============================================================================
// Fixed
// ============================================================================

/// Offset is the operator-set minutes value, independent of pump rate.
pub struct FixedOffset;

impl OffsetPolicy for FixedOffset {
    fn mode(&self) -> OffsetMode {
        OffsetMode::Fixed
    }

    fn uses_cache(&self) -> bool {
        false
    }

    fn parameter(&self, state: &ComputationState) -> Result<f64, String> {
        match state.offset_minutes() {
            Some(m) if m.is_finite() && m >= 0.0 => Ok(m),
            other => Err(format!("offset not set or invalid ({other:?})")),
        }
    }

    fn min_samples(&self) -> (usize, &'static str) {
        (MIN_SAMPLES_FOR_FIXED, "no data points in window")
    }

    fn resolve(
        &self,
        _target_timestamp: i64,
        offset_minutes: f64,
        _window: &TimeWindow,
        _config: &BhpConfig,
    ) -> Resolution {
        Resolution::Offset {
            minutes: offset_minutes,
            reference_rate: None,
        }
    }

    fn tolerance_seconds(&self, config: &BhpConfig) -> (f64, &'static str) {
        (config.fixed_offset_tolerance_seconds, "waiting for data history")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sample;

    fn window(points: &[(i64, f64)]) -> TimeWindow {
        let mut w = TimeWindow::new(7_200.0);
        for &(ts, rate) in points {
            w.add(Sample::new(ts, rate, 1.0)).unwrap();
        }
        w
    }

    #[test]
    fn test_reference_rate_prefers_exact_match() {
        let w = window(&[(0, 10.0), (60_000, 20.0), (120_000, 30.0)]);
        assert_eq!(RateDerivedOffset::reference_rate(60_000, &w), Some(20.0));
    }

    #[test]
    fn test_reference_rate_latest_before_target() {
        let w = window(&[(0, 10.0), (60_000, 20.0), (120_000, 30.0)]);
        assert_eq!(RateDerivedOffset::reference_rate(119_999, &w), Some(20.0));
    }

    #[test]
    fn test_reference_rate_falls_back_to_newest() {
        let w = window(&[(60_000, 20.0), (120_000, 30.0)]);
        assert_eq!(RateDerivedOffset::reference_rate(0, &w), Some(30.0));
    }

    #[test]
    fn test_rate_derived_offset_math() {
        let w = window(&[(0, 15.0), (60_000, 15.0)]);
        let r = RateDerivedOffset.resolve(60_000, 120.0, &w, &BhpConfig::default());
        assert_eq!(
            r,
            Resolution::Offset {
                minutes: 8.0,
                reference_rate: Some(15.0)
            }
        );
    }

    #[test]
    fn test_zero_rate_is_pump_stopped() {
        let w = window(&[(0, 15.0), (60_000, 0.0)]);
        match RateDerivedOffset.resolve(60_000, 120.0, &w, &BhpConfig::default()) {
            Resolution::Zero { status, reason, .. } => {
                assert_eq!(status, BhpStatus::PumpStopped);
                assert!(reason.contains("invalid reference rate"));
            }
            other => panic!("expected zero, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_rate_is_pump_stopped() {
        let w = window(&[(0, 15.0), (60_000, f64::NAN)]);
        let r = RateDerivedOffset.resolve(60_000, 120.0, &w, &BhpConfig::default());
        assert!(matches!(
            r,
            Resolution::Zero {
                status: BhpStatus::PumpStopped,
                ..
            }
        ));
    }

    #[test]
    fn test_offset_above_max_is_out_of_range() {
        let w = window(&[(0, 5.0), (60_000, 5.0)]);
        match RateDerivedOffset.resolve(60_000, 1_000.0, &w, &BhpConfig::default()) {
            Resolution::Zero {
                status,
                reason,
                minutes,
                ..
            } => {
                assert_eq!(status, BhpStatus::OffsetOutOfRange);
                assert!(reason.contains("offset out of valid range"));
                assert!((minutes - 200.0).abs() < 1e-9);
            }
            other => panic!("expected zero, got {other:?}"),
        }
    }

    #[test]
    fn test_offset_below_min_is_out_of_range() {
        let w = window(&[(0, 100.0), (60_000, 100.0)]);
        // 1 bbl / 100 bpm = 0.01 min < default min 0.1
        let r = RateDerivedOffset.resolve(60_000, 1.0, &w, &BhpConfig::default());
        assert!(matches!(
            r,
            Resolution::Zero {
                status: BhpStatus::OffsetOutOfRange,
                ..
            }
        ));
    }

    #[test]
    fn test_fixed_offset_passes_parameter_through() {
        let w = window(&[(0, 0.0)]);
        let r = FixedOffset.resolve(0, 5.0, &w, &BhpConfig::default());
        assert_eq!(
            r,
            Resolution::Offset {
                minutes: 5.0,
                reference_rate: None
            }
        );
    }

    #[test]
    fn test_policy_for_mode() {
        assert_eq!(policy_for(OffsetMode::RateDerived).mode(), OffsetMode::RateDerived);
        assert_eq!(policy_for(OffsetMode::Fixed).mode(), OffsetMode::Fixed);
        assert!(policy_for(OffsetMode::RateDerived).uses_cache());
        assert!(!policy_for(OffsetMode::Fixed).uses_cache());
    }
}
