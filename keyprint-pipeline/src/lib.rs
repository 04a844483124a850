//! Keyprint Pipeline Library
//!
//! Fingerprints every keyframe of a stream concurrently. A single producer
//! feeds decoded frames into a bounded [`queue`], a [`worker`] pool converts
//! and analyzes them in parallel, and the [`aggregate`] puts the results back
//! into frame order before the [`driver`] serializes them.

pub mod aggregate;
pub mod cancel;
pub mod driver;
pub mod queue;
pub mod source;
pub mod worker;

pub use aggregate::ResultAggregate;
pub use cancel::CancellationToken;
pub use driver::{Pipeline, PipelineState, RunOutput, RunSummary};
pub use queue::{frame_queue, FrameConsumer, FrameProducer, Pop};
pub use source::FrameSource;
pub use worker::{default_worker_count, WorkerContext, WorkerPool, WorkerSummary};

/// Result type for keyprint-pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for keyprint-pipeline operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Keyprint core error: {0}")]
    Core(#[from] keyprint_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Frame {0} was already fingerprinted")]
    DuplicateFrame(u64),

    #[error("Frame queue has no consumers left")]
    QueueDisconnected,

    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Pipeline is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: PipelineState,
        actual: PipelineState,
    },
}
