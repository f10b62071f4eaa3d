//! Time Window - bounded, time-ordered sample history
//!
//! Samples are kept in a ring buffer (`VecDeque`) ordered by timestamp.
//! Every insertion evicts from the front until
//! `newest.timestamp - oldest.timestamp <= window_size_ms` holds again, and
//! hands the evicted samples back so the owner can purge anything keyed by
//! their timestamps.
//!
//! Because eviction only ever pops the front, the buffer stays sorted and
//! nearest-timestamp lookups are a binary search (`partition_point`).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

use crate::config::defaults::DEFAULT_WINDOW_SIZE_SECS;
use crate::types::Sample;

/// Rejected insertion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("Out-of-order sample: timestamp {timestamp} is older than newest {newest}")]
    OutOfOrder { timestamp: i64, newest: i64 },
}

/// Result of a nearest-timestamp lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    pub sample: Sample,
    /// |sample.timestamp - target| in milliseconds
    pub time_diff_ms: i64,
}

/// Point-in-time summary of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    pub size: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
    /// newest - oldest (0 when fewer than two samples)
    pub duration_ms: i64,
}

/// Bounded sliding window of samples ordered by timestamp.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    samples: VecDeque<Sample>,
    window_size_ms: i64,
}

impl TimeWindow {
    /// Create an empty window spanning `window_size_seconds`.
    pub fn new(window_size_seconds: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_size_ms: seconds_to_ms(window_size_seconds),
        }
    }

    pub fn window_size_ms(&self) -> i64 {
        self.window_size_ms
    }

    /// Change the span and evict whatever no longer fits.
    ///
    /// Returns the evicted samples, oldest first.
    pub fn set_window_size_seconds(&mut self, window_size_seconds: f64) -> Vec<Sample> {
        self.window_size_ms = seconds_to_ms(window_size_seconds);
        self.evict()
    }

    /// Append a sample and evict from the front.
    ///
    /// Equal timestamps are accepted; a timestamp older than the newest
    /// retained sample is rejected and leaves the window untouched.
    /// Returns the evicted samples, oldest first.
    pub fn add(&mut self, sample: Sample) -> Result<Vec<Sample>, IngestError> {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp < newest.timestamp {
                return Err(IngestError::OutOfOrder {
                    timestamp: sample.timestamp,
                    newest: newest.timestamp,
                });
            }
        }
        self.samples.push_back(sample);
        Ok(self.evict())
    }

    fn evict(&mut self) -> Vec<Sample> {
        let Some(newest) = self.samples.back().map(|s| s.timestamp) else {
            return Vec::new();
        };
        let cutoff = newest.saturating_sub(self.window_size_ms);

        let mut evicted = Vec::new();
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                if let Some(s) = self.samples.pop_front() {
                    evicted.push(s);
                }
            } else {
                break;
            }
        }
        evicted
    }

    /// Sample whose timestamp is closest to `target`.
    ///
    /// Compares the two neighbours straddling the target; ties go to the
    /// earlier one. `None` only when the window is empty.
    pub fn find_nearest(&self, target: i64) -> Option<Nearest> {
        if self.samples.is_empty() {
            return None;
        }
        // First index with timestamp >= target
        let idx = self.samples.partition_point(|s| s.timestamp < target);

        let left = idx.checked_sub(1).and_then(|i| self.samples.get(i));
        let right = self.samples.get(idx);

        // `right` is already the first of its run of equal timestamps; `left` is the last
        let pick_idx = match (left, right) {
            (Some(l), Some(r)) if abs_diff(l.timestamp, target) > abs_diff(r.timestamp, target) => {
                idx
            }
            (Some(l), _) => self.samples.partition_point(|s| s.timestamp < l.timestamp),
            (None, Some(_)) => idx,
            (None, None) => return None,
        };
        let pick = self.samples.get(pick_idx)?;

        Some(Nearest {
            sample: *pick,
            time_diff_ms: abs_diff(pick.timestamp, target),
        })
    }

    /// First sample stamped exactly `target`.
    pub fn find_exact(&self, target: i64) -> Option<&Sample> {
        let idx = self.samples.partition_point(|s| s.timestamp < target);
        self.samples.get(idx).filter(|s| s.timestamp == target)
    }

    /// Latest sample with `timestamp <= target`.
    pub fn latest_at_or_before(&self, target: i64) -> Option<&Sample> {
        let idx = self.samples.partition_point(|s| s.timestamp <= target);
        idx.checked_sub(1).and_then(|i| self.samples.get(i))
    }

    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Copy of every retained sample, oldest first.
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// Copy of samples with `start <= timestamp <= end`.
    pub fn range(&self, start: i64, end: i64) -> Vec<Sample> {
        if start > end {
            return Vec::new();
        }
        let lo = self.samples.partition_point(|s| s.timestamp < start);
        let hi = self.samples.partition_point(|s| s.timestamp <= end);
        self.samples.range(lo..hi).copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn stats(&self) -> WindowStats {
        let oldest = self.oldest().map(|s| s.timestamp);
        let newest = self.newest().map(|s| s.timestamp);
        let duration_ms = match (oldest, newest) {
            (Some(o), Some(n)) => n.saturating_sub(o),
            _ => 0,
        };
        WindowStats {
            size: self.samples.len(),
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            duration_ms,
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE_SECS)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn seconds_to_ms(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

fn abs_diff(a: i64, b: i64) -> i64 {
    a.saturating_sub(b).saturating_abs()
}
