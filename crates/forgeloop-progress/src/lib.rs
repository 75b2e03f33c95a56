//! Forgeloop progress reporting
//!
//! This crate provides:
//! - `ProgressEvent` records describing one phase transition of a job
//! - `ProgressBus`, a non-blocking fan-out bus with drop-oldest lag handling
//! - `JobProgress`, a per-job handle keeping the progress bar monotonic
//! - `ProgressSink` consumers driven by a background task

mod bus;
mod event;
mod job;
mod sink;

pub use bus::{DEFAULT_BUFFER_CAPACITY, ProgressBus, ProgressSubscription};
pub use event::{ProgressEvent, ProgressStatus};
pub use job::JobProgress;
pub use sink::{ProgressSink, TracingSink, spawn_sink};
