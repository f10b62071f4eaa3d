//! Streaming Pipeline Module
//!
//! ## Per-Sample Flow
//!
//! ```text
//! SampleSource ──> ProcessingLoop ──> StreamCoordinator::ingest
//!                                        │
//!                                        ├─ ComputationState (window + cache)
//!                                        ├─ BhpCalculator (offset policy)
//!                                        └─ ReplayChannel<EnhancedSample> ──> subscribers
//! ```
//!
//! One emission per accepted sample, in ingestion order.

mod channel;
mod coordinator;
pub mod processing_loop;
pub mod source;
mod state;

pub use channel::{ReplayChannel, Subscription};
pub use coordinator::{CoordinatorError, CoordinatorStats, SharedCoordinator, StreamCoordinator};
pub use processing_loop::{LoopSummary, ProcessingLoop, StopReason};
pub use source::{JsonLinesSource, SampleEvent, SampleSource, VecSource};
pub use state::*;
