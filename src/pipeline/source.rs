//! Sample source abstraction for stream ingestion.
//!
//! Provides a unified trait for reading samples from different places:
//! pre-loaded vectors (replay, tests) and JSON lines (stdin, files).

use crate::types::Sample;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

/// Events produced by a sample source.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleEvent {
    /// A parsed sample.
    Sample(Sample),
    /// No more data.
    Eof,
}

/// Trait abstracting where samples come from.
///
/// Implementations handle format parsing and pacing internally.
/// The processing loop calls [`next_sample`](SampleSource::next_sample) in a
/// `select!` with cancellation.
#[async_trait]
pub trait SampleSource: Send {
    /// Read the next sample.
    ///
    /// Returns `SampleEvent::Eof` when no more data is available and `Err`
    /// on unrecoverable I/O failures.
    async fn next_sample(&mut self) -> Result<SampleEvent>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// Vec Source (replay)
// ============================================================================

/// Replays pre-loaded samples with an optional delay between them.
pub struct VecSource {
    samples: std::vec::IntoIter<Sample>,
    delay_ms: u64,
    yielded_first: bool,
}

impl VecSource {
    pub fn new(samples: Vec<Sample>, delay_ms: u64) -> Self {
        Self {
            samples: samples.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl SampleSource for VecSource {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        // No delay before the first sample
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.samples.next() {
            Some(s) => {
                self.yielded_first = true;
                Ok(SampleEvent::Sample(s))
            }
            None => Ok(SampleEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// JSON Lines Source
// ============================================================================

/// Reads one JSON sample per line from any buffered async reader.
///
/// Blank lines are ignored and malformed lines are logged and skipped:
///
/// ```text
/// {"timestamp":1705564800000,"rate":15.0,"concentration":2.0}
/// ```
pub struct JsonLinesSource<R> {
    reader: R,
    name: String,
    line_buffer: String,
    line_number: u64,
    skipped: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            name: name.into(),
            line_buffer: String::with_capacity(256),
            line_number: 0,
            skipped: 0,
        }
    }

    /// Malformed lines skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    /// Read from the process's standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> SampleSource for JsonLinesSource<R> {
    async fn next_sample(&mut self) -> Result<SampleEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SampleEvent::Eof);
            }
            self.line_number += 1;
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Sample>(line) {
                Ok(sample) => return Ok(SampleEvent::Sample(sample)),
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!(
                        source = %self.name,
                        line = self.line_number,
                        error = %e,
                        "Skipping malformed sample"
                    );
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_vec_source_yields_then_eof() {
        let mut source = VecSource::new(vec![Sample::new(1, 15.0, 2.0)], 0);
        assert_eq!(
            source.next_sample().await.unwrap(),
            SampleEvent::Sample(Sample::new(1, 15.0, 2.0))
        );
        assert_eq!(source.next_sample().await.unwrap(), SampleEvent::Eof);
        assert_eq!(source.next_sample().await.unwrap(), SampleEvent::Eof);
    }

    #[tokio::test]
    async fn test_json_lines_skips_blank_and_malformed() {
        let input = concat!(
            "{\"timestamp\":1000,\"rate\":15.0,\"concentration\":2.0}\n",
            "\n",
            "not json\n",
            "{\"timestamp\":2000,\"rate\":14.5,\"concentration\":2.1,\"pressure\":4200.0}\n",
        );
        let mut source = JsonLinesSource::new(input.as_bytes(), "test");

        let SampleEvent::Sample(first) = source.next_sample().await.unwrap() else {
            panic!("expected sample");
        };
        assert_eq!(first.timestamp, 1000);
        assert_eq!(first.pressure, None);

        let SampleEvent::Sample(second) = source.next_sample().await.unwrap() else {
            panic!("expected sample");
        };
        assert_eq!(second.timestamp, 2000);
        assert_eq!(second.pressure, Some(4200.0));

        assert_eq!(source.next_sample().await.unwrap(), SampleEvent::Eof);
        assert_eq!(source.skipped(), 1);
        assert_eq!(source.source_name(), "test");
    }
}
