//! Surface measurement types

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::BhpDiagnostics;

/// One timestamped surface measurement from the pumping unit.
///
/// Values are carried as opaque numbers: range checking belongs to the
/// producer, so out-of-range readings flow through the engine untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Pump rate (bbl/min), nominally 0-100
    pub rate: f64,
    /// Surface proppant concentration (lb/gal), nominally 0-20
    pub concentration: f64,
    /// Treating pressure (psi), nominally 0-15000. `None` means not measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

impl Sample {
    pub fn new(timestamp: i64, rate: f64, concentration: f64) -> Self {
        Self {
            timestamp,
            rate,
            concentration,
            pressure: None,
        }
    }

    /// Attach a pressure reading.
    #[must_use]
    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    /// Wall-clock time of the sample, if the timestamp is representable.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// A sample enriched with the bottom-hole concentration computed for its
/// timestamp.
///
/// Built once per ingested sample and handed to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSample {
    /// The surface measurement exactly as ingested
    #[serde(flatten)]
    pub sample: Sample,
    /// Bottom-hole concentration (lb/gal). `None` means pending.
    pub bhp: Option<f64>,
    /// Full calculation detail for the value above
    pub diagnostics: BhpDiagnostics,
}

impl EnhancedSample {
    pub fn timestamp(&self) -> i64 {
        self.sample.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_absent_by_default() {
        let s = Sample::new(1_000, 15.0, 2.0);
        assert!(s.pressure.is_none());
        assert_eq!(s.with_pressure(4500.0).pressure, Some(4500.0));
    }

    #[test]
    fn test_absent_pressure_is_omitted_from_json() {
        let json = serde_json::to_string(&Sample::new(1_000, 15.0, 2.0)).unwrap();
        assert!(!json.contains("pressure"));

        let parsed: Sample =
            serde_json::from_str(r#"{"timestamp":5,"rate":1.0,"concentration":0.5}"#).unwrap();
        assert_eq!(parsed.pressure, None);
    }

    #[test]
    fn test_datetime_conversion() {
        let s = Sample::new(1_705_564_800_000, 10.0, 1.0);
        let dt = s.datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_705_564_800);
    }
}
