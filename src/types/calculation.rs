//! Calculation result and offset parameter types

use serde::{Deserialize, Serialize};

use super::Sample;

// ============================================================================
// Offset Mode / Parameter
// ============================================================================

/// How the surface-to-bottom travel time is determined.
///
/// Exactly one mode is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// Offset = flush volume / pump rate observed near the target time
    RateDerived,
    /// Offset is a user-set constant in minutes
    Fixed,
}

impl std::fmt::Display for OffsetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffsetMode::RateDerived => write!(f, "rate-derived"),
            OffsetMode::Fixed => write!(f, "fixed"),
        }
    }
}

/// The single scalar that drives offset resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OffsetParameter {
    /// Wellbore flush volume in barrels (rate-derived mode)
    FlushVolume(f64),
    /// Travel time in minutes (fixed mode)
    OffsetMinutes(f64),
}

impl OffsetParameter {
    /// The mode this parameter belongs to.
    pub fn mode(&self) -> OffsetMode {
        match self {
            OffsetParameter::FlushVolume(_) => OffsetMode::RateDerived,
            OffsetParameter::OffsetMinutes(_) => OffsetMode::Fixed,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            OffsetParameter::FlushVolume(v) | OffsetParameter::OffsetMinutes(v) => v,
        }
    }

    /// Field name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OffsetParameter::FlushVolume(_) => "flush_volume",
            OffsetParameter::OffsetMinutes(_) => "offset_minutes",
        }
    }
}

// ============================================================================
// Calculation Result
// ============================================================================

/// Coarse classification of a calculation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BhpStatus {
    /// Value looked up from history
    Computed,
    /// Value served from the result cache
    Cached,
    /// Reference rate was zero or non-finite; value is 0 by definition
    PumpStopped,
    /// Derived offset fell outside the configured bounds; value is 0
    OffsetOutOfRange,
    /// Not enough history yet; value is `None`
    Pending,
}

impl std::fmt::Display for BhpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BhpStatus::Computed => write!(f, "Computed"),
            BhpStatus::Cached => write!(f, "Cached"),
            BhpStatus::PumpStopped => write!(f, "PumpStopped"),
            BhpStatus::OffsetOutOfRange => write!(f, "OffsetOutOfRange"),
            BhpStatus::Pending => write!(f, "Pending"),
        }
    }
}

/// Structured detail attached to every calculation, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BhpDiagnostics {
    /// Timestamp the value was requested for (ms)
    pub target_timestamp: i64,
    /// Resolved travel time (minutes)
    pub offset_minutes: f64,
    /// Resolved travel time (ms, rounded)
    pub offset_ms: i64,
    /// `target_timestamp - offset_ms`
    pub historical_timestamp: i64,
    /// Sample nearest to the historical timestamp, if one was found
    pub historical_sample: Option<Sample>,
    /// |historical_sample.timestamp - historical_timestamp| in seconds
    pub time_difference_seconds: f64,
    /// Pump rate used to derive the offset (rate-derived mode only)
    pub reference_rate: Option<f64>,
    /// True when the value came from the cache
    pub from_cache: bool,
    pub status: BhpStatus,
    /// Why the value is `None` or zero
    pub error: Option<String>,
}

impl BhpDiagnostics {
    /// Diagnostics with nothing resolved beyond the target.
    pub fn empty(target_timestamp: i64, status: BhpStatus) -> Self {
        Self {
            target_timestamp,
            offset_minutes: 0.0,
            offset_ms: 0,
            historical_timestamp: 0,
            historical_sample: None,
            time_difference_seconds: 0.0,
            reference_rate: None,
            from_cache: false,
            status,
            error: None,
        }
    }
}

/// Outcome of one bottom-hole concentration calculation.
///
/// `value == None` is a valid "cannot determine yet" answer, not a fault.
/// `value == Some(0.0)` with [`BhpStatus::PumpStopped`] means the pump is
/// down and the bottom-hole concentration is zero by definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BhpCalculationResult {
    pub value: Option<f64>,
    pub diagnostics: BhpDiagnostics,
}

impl BhpCalculationResult {
    pub(crate) fn pending(mut diagnostics: BhpDiagnostics, reason: impl Into<String>) -> Self {
        diagnostics.status = BhpStatus::Pending;
        diagnostics.error = Some(reason.into());
        Self {
            value: None,
            diagnostics,
        }
    }

    pub(crate) fn zero(
        mut diagnostics: BhpDiagnostics,
        status: BhpStatus,
        reason: impl Into<String>,
    ) -> Self {
        diagnostics.status = status;
        diagnostics.error = Some(reason.into());
        Self {
            value: Some(0.0),
            diagnostics,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.value.is_none()
    }

    pub fn from_cache(&self) -> bool {
        self.diagnostics.from_cache
    }

    pub fn error(&self) -> Option<&str> {
        self.diagnostics.error.as_deref()
    }
}
