//! Pipeline driver: producer loop, worker lifecycle and final serialization

use crate::worker::{WorkerContext, WorkerPool};
use crate::{
    default_worker_count, frame_queue, CancellationToken, Error, FrameProducer, FrameSource,
    ResultAggregate, Result,
};
use keyprint_core::output::{remove_stale_output, write_csv_file};
use keyprint_core::{FingerprintConfig, FrameFingerprint, GrayscaleConverter};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed, nothing started yet
    Idle,
    /// Workers are up and the producer is feeding the queue
    Running,
    /// End of stream reached, workers are draining the queue
    Draining,
    /// Every worker has been joined; results may be serialized
    Complete,
    /// A fatal error or cancellation ended the run; results were discarded
    Aborted,
}

/// Counts describing a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Keyframes handed to the worker pool
    pub queued: u64,
    /// Keyframes with a fingerprint in the output
    pub fingerprinted: u64,
    /// Keyframes skipped after a conversion or extraction failure
    pub failed: u64,
    pub workers: usize,
}

/// Fingerprints of a complete run, in ascending frame order
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub fingerprints: Vec<FrameFingerprint>,
    pub summary: RunSummary,
}

/// Drives one fingerprinting run from decoder to CSV
pub struct Pipeline {
    config: FingerprintConfig,
    converter: Arc<dyn GrayscaleConverter>,
    cancel: CancellationToken,
    state: PipelineState,
}

impl Pipeline {
    /// Creates an idle pipeline after validating `config`
    pub fn new(config: FingerprintConfig, converter: Arc<dyn GrayscaleConverter>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            converter,
            cancel: CancellationToken::new(),
            state: PipelineState::Idle,
        })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Token that stops the run from another thread. A cancelled run aborts
    /// and produces no output.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fingerprints every keyframe `source` yields.
    ///
    /// Output is all-or-nothing: if the source fails mid-stream or the run is
    /// cancelled, already computed fingerprints are dropped and an error is
    /// returned.
    pub fn run<S: FrameSource>(&mut self, source: &mut S) -> Result<RunOutput> {
        self.expect_state(PipelineState::Idle)?;

        let result = self.run_inner(source);
        self.state = match result {
            Ok(_) => PipelineState::Complete,
            Err(_) => PipelineState::Aborted,
        };
        result
    }

    /// Runs the pipeline and writes the CSV configured in `output`. Any CSV
    /// left over from a previous run is removed first.
    pub fn run_to_csv<S: FrameSource>(&mut self, source: &mut S) -> Result<RunSummary> {
        self.expect_state(PipelineState::Idle)?;
        remove_stale_output(&self.config.output)?;

        let output = self.run(source)?;
        self.write_csv(&output)?;
        Ok(output.summary)
    }

    /// Serializes a finished run. Refused unless the run completed.
    pub fn write_csv(&self, output: &RunOutput) -> Result<()> {
        self.expect_state(PipelineState::Complete)?;
        write_csv_file(&self.config.output, &output.fingerprints)?;
        Ok(())
    }

    fn run_inner<S: FrameSource>(&mut self, source: &mut S) -> Result<RunOutput> {
        let shape = self.config.grid_shape()?;
        let (width, height) = source.dimensions();
        shape.check_dimensions(width, height)?;

        if let Some(dir) = &self.config.debug_image_dir {
            fs::create_dir_all(dir)?;
        }

        let worker_count = self.config.workers.unwrap_or_else(default_worker_count);
        let backoff = Duration::from_millis(self.config.backoff_ms);
        let aggregate = Arc::new(ResultAggregate::new());
        let (producer, consumer) = frame_queue(self.config.queue_capacity);

        let context = WorkerContext {
            consumer,
            converter: Arc::clone(&self.converter),
            shape,
            aggregate: Arc::clone(&aggregate),
            cancel: self.cancel.clone(),
            poll_interval: backoff,
            debug_images: self
                .config
                .debug_image_dir
                .clone()
                .map(|dir| (dir, self.config.debug_image_format)),
        };
        // The pool holds the only consumers, so if every worker dies the
        // producer sees a disconnected queue instead of blocking forever.
        let pool = WorkerPool::spawn(worker_count, context)?;

        self.state = PipelineState::Running;
        tracing::info!(
            workers = worker_count,
            width,
            height,
            rows = shape.rows,
            cols = shape.cols,
            "Fingerprinting keyframes"
        );

        let produced = self.produce(source, &producer, backoff);
        producer.close();
        self.state = PipelineState::Draining;

        if produced.is_err() {
            // Nothing from this run will be written; let the workers stop now
            self.cancel.cancel();
        }

        let workers = pool.join()?;
        let queued = produced?;
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let fingerprints = aggregate.snapshot_in_order();
        let summary = RunSummary {
            queued,
            fingerprinted: workers.fingerprinted,
            failed: workers.failed,
            workers: worker_count,
        };
        tracing::info!(
            queued = summary.queued,
            fingerprinted = summary.fingerprinted,
            failed = summary.failed,
            "Processing complete"
        );

        Ok(RunOutput {
            fingerprints,
            summary,
        })
    }

    fn produce<S: FrameSource>(
        &self,
        source: &mut S,
        producer: &FrameProducer,
        backoff: Duration,
    ) -> Result<u64> {
        let mut queued = 0;
        let mut last_frame: Option<u64> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let frame = match source.next_keyframe() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read keyframe from stream");
                    return Err(Error::Source(Box::new(e)));
                }
            };

            if let Some(last) = last_frame {
                if frame.frame_number() <= last {
                    tracing::warn!(
                        frame = frame.frame_number(),
                        previous = last,
                        "Frame numbers are not strictly increasing"
                    );
                }
            }
            last_frame = Some(frame.frame_number());

            producer.push(frame, backoff, &self.cancel)?;
            queued += 1;
        }

        tracing::debug!(queued, "Reached end of stream");
        Ok(queued)
    }

    fn expect_state(&self, expected: PipelineState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}
