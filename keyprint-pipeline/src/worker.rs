//! Worker threads that turn queued frames into fingerprints

use crate::{CancellationToken, Error, FrameConsumer, Pop, ResultAggregate, Result};
use keyprint_core::output::save_debug_image;
use keyprint_core::{
    extract_fingerprint, DebugImageFormat, DecodedFrame, FrameFingerprint, GrayscaleConverter,
    GridShape,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pool size used when parallelism cannot be detected, and the lower bound otherwise
pub const MIN_WORKERS: usize = 4;

/// Detected hardware parallelism, but never fewer than [`MIN_WORKERS`]
pub fn default_worker_count() -> usize {
    num_cpus::get().max(MIN_WORKERS)
}

/// Everything a worker needs; cloned once per thread
#[derive(Clone)]
pub struct WorkerContext {
    pub consumer: FrameConsumer,
    pub converter: Arc<dyn GrayscaleConverter>,
    pub shape: GridShape,
    pub aggregate: Arc<ResultAggregate>,
    pub cancel: CancellationToken,
    /// How long an idle worker waits for a frame before re-checking `cancel`
    pub poll_interval: Duration,
    pub debug_images: Option<(PathBuf, DebugImageFormat)>,
}

/// Frame counts reported by a joined pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Frames whose fingerprint reached the aggregate
    pub fingerprinted: u64,
    /// Frames dropped because conversion or extraction failed
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    fingerprinted: AtomicU64,
    failed: AtomicU64,
}

/// Fixed set of symmetric worker threads
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Spawns `size` workers sharing `context`
    pub fn spawn(size: usize, context: WorkerContext) -> Result<Self> {
        let counters = Arc::new(Counters::default());
        let mut handles = Vec::with_capacity(size);

        for index in 0..size {
            let context = context.clone();
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("keyprint-worker-{index}"))
                .spawn(move || run_worker(&context, &counters))?;
            handles.push(handle);
        }

        tracing::debug!(workers = size, "Worker pool started");
        Ok(Self { handles, counters })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Waits for every worker to exit. Workers exit once the queue is closed
    /// and drained, or when the run is cancelled.
    pub fn join(self) -> Result<WorkerSummary> {
        let mut panicked = None;
        for handle in self.handles {
            if let Err(payload) = handle.join() {
                panicked = Some(panic_message(payload.as_ref()));
            }
        }

        if let Some(message) = panicked {
            return Err(Error::WorkerPanicked(message));
        }

        Ok(WorkerSummary {
            fingerprinted: self.counters.fingerprinted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        })
    }
}

fn run_worker(context: &WorkerContext, counters: &Counters) {
    loop {
        if context.cancel.is_cancelled() {
            return;
        }

        let frame = match context.consumer.pop_timeout(context.poll_interval) {
            Pop::Frame(frame) => frame,
            Pop::Empty => continue,
            Pop::Drained => return,
        };

        let frame_number = frame.frame_number();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| analyze_frame(context, frame)))
            .unwrap_or_else(|payload| Err(Error::WorkerPanicked(panic_message(payload.as_ref()))));

        match outcome.and_then(|fingerprint| context.aggregate.insert(fingerprint)) {
            Ok(()) => {
                counters.fingerprinted.fetch_add(1, Ordering::Relaxed);
            }
            Err(Error::DuplicateFrame(n)) => {
                tracing::error!(frame = n, "Dropping second fingerprint for an already analyzed frame");
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(frame = frame_number, error = %e, "Skipping keyframe");
                counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Converts one frame to grayscale and reduces it to a fingerprint. The
/// decoded frame and the grayscale buffer are both released on return.
pub fn analyze_frame(context: &WorkerContext, frame: DecodedFrame) -> Result<FrameFingerprint> {
    tracing::debug!(
        frame = frame.frame_number(),
        timestamp = frame.timestamp(),
        "Processing keyframe"
    );

    let gray = context.converter.to_grayscale(&frame)?;
    if gray.width() != frame.width() || gray.height() != frame.height() {
        return Err(keyprint_core::Error::Conversion(format!(
            "converter returned {}x{} for a {}x{} frame",
            gray.width(),
            gray.height(),
            frame.width(),
            frame.height()
        ))
        .into());
    }

    if let Some((dir, format)) = &context.debug_images {
        if let Err(e) = save_debug_image(dir, frame.frame_number(), &gray, *format) {
            tracing::warn!(frame = frame.frame_number(), error = %e, "Failed to write debug image");
        }
    }

    let values = extract_fingerprint(&gray, context.shape)?;
    Ok(FrameFingerprint::new(frame.frame_number(), frame.timestamp(), values))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
