//! Sample processing loop shared by every input source.
//!
//! Pulls samples from a [`SampleSource`] and feeds them to a shared
//! [`StreamCoordinator`](super::StreamCoordinator) until the source ends, fails,
//! or the cancellation token fires.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::coordinator::SharedCoordinator;
use super::source::{SampleEvent, SampleSource};

/// Progress is logged every this many samples.
const PROGRESS_INTERVAL: u64 = 600;

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Eof,
    Cancelled,
    SourceError(String),
}

/// What one [`ProcessingLoop::run`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub samples_read: u64,
    pub ingested: u64,
    pub rejected: u64,
    pub stop: StopReason,
}

/// Drives a coordinator from a sample source.
pub struct ProcessingLoop {
    coordinator: SharedCoordinator,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(coordinator: SharedCoordinator, cancel_token: CancellationToken) -> Self {
        Self {
            coordinator,
            cancel_token,
        }
    }

    /// Run until the source is exhausted, errors, or cancellation.
    ///
    /// Out-of-order samples are logged and skipped; the loop keeps going.
    pub async fn run<S: SampleSource + ?Sized>(&self, source: &mut S) -> LoopSummary {
        let mut samples_read = 0u64;
        let mut ingested = 0u64;
        let mut rejected = 0u64;

        info!(source = source.source_name(), "Processing samples");

        let stop = loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Shutdown signal received");
                    break StopReason::Cancelled;
                }
                result = source.next_sample() => match result {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!(error = %e, "Source error");
                        break StopReason::SourceError(e.to_string());
                    }
                }
            };

            let sample = match event {
                SampleEvent::Sample(s) => s,
                SampleEvent::Eof => {
                    info!(samples_read, "Source reached end");
                    break StopReason::Eof;
                }
            };
            samples_read += 1;

            let mut coordinator = self.coordinator.lock().await;
            match coordinator.ingest(sample) {
                Ok(enhanced) => {
                    ingested += 1;
                    debug!(timestamp = enhanced.timestamp(), bhp = ?enhanced.bhp, "Emitted");
                }
                Err(e) => {
                    rejected += 1;
                    warn!(error = %e, "Skipping sample");
                }
            }

            if samples_read % PROGRESS_INTERVAL == 0 {
                info!("{}", coordinator.stats());
            }
        };

        let stats = self.coordinator.lock().await.stats();
        info!(samples_read, ingested, rejected, ?stop, "Processing finished");
        info!("{stats}");

        LoopSummary {
            samples_read,
            ingested,
            rejected,
            stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BhpConfig;
    use crate::pipeline::source::VecSource;
    use crate::pipeline::StreamCoordinator;
    use crate::types::Sample;

    #[tokio::test]
    async fn test_runs_to_eof_and_skips_out_of_order() {
        let coordinator = StreamCoordinator::rate_derived(BhpConfig::default())
            .unwrap()
            .into_shared();
        let mut sub = coordinator.lock().await.subscribe();

        let mut source = VecSource::new(
            vec![
                Sample::new(0, 15.0, 2.0),
                Sample::new(60_000, 15.0, 2.1),
                Sample::new(30_000, 15.0, 9.9),
                Sample::new(120_000, 15.0, 2.2),
            ],
            0,
        );
        let summary = ProcessingLoop::new(coordinator.clone(), CancellationToken::new())
            .run(&mut source)
            .await;

        assert_eq!(
            summary,
            LoopSummary {
                samples_read: 4,
                ingested: 3,
                rejected: 1,
                stop: StopReason::Eof,
            }
        );
        let stamps: Vec<i64> = sub.drain().iter().map(|e| e.timestamp()).collect();
        assert_eq!(stamps, vec![0, 60_000, 120_000]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let coordinator = StreamCoordinator::rate_derived(BhpConfig::default())
            .unwrap()
            .into_shared();
        let token = CancellationToken::new();
        token.cancel();

        // Long delay so the cancellation branch wins after the first sample
        let mut source = VecSource::new(vec![Sample::new(0, 15.0, 2.0); 3], 60_000);
        let summary = ProcessingLoop::new(coordinator, token).run(&mut source).await;
        assert_eq!(summary.stop, StopReason::Cancelled);
        assert!(summary.samples_read <= 1);
    }
}
