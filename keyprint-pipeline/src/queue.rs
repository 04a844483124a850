//! Bounded queue of decoded frames waiting for a worker
//!
//! The queue is a bounded MPMC channel. Each frame is received by exactly one
//! consumer. Closing the producer side does not discard buffered frames:
//! consumers keep receiving them and only see [`Pop::Drained`] once the queue
//! is both closed and empty, so end of stream and the final drain are decided
//! at a single synchronization point.

use crate::{CancellationToken, Error, Result};
use flume::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError, TrySendError};
use keyprint_core::DecodedFrame;
use std::time::Duration;

/// Creates a queue holding at most `capacity` frames
pub fn frame_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let capacity = capacity.max(1);
    let (tx, rx) = flume::bounded(capacity);
    (
        FrameProducer { tx, capacity },
        FrameConsumer { rx },
    )
}

/// Outcome of a consumer pop
#[derive(Debug)]
pub enum Pop {
    Frame(DecodedFrame),
    /// Nothing buffered right now, but the producer may still push
    Empty,
    /// The producer closed the queue and every buffered frame was taken
    Drained,
}

/// Producer half of the frame queue
pub struct FrameProducer {
    tx: Sender<DecodedFrame>,
    capacity: usize,
}

impl FrameProducer {
    /// Pushes `frame`, waiting while the queue is full.
    ///
    /// While full, the producer re-checks `cancel` every `backoff`, so a stop
    /// request is honored even if no worker frees a slot.
    pub fn push(&self, frame: DecodedFrame, backoff: Duration, cancel: &CancellationToken) -> Result<()> {
        let mut frame = frame;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.tx.send_timeout(frame, backoff) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => {
                    tracing::trace!(
                        frame = returned.frame_number(),
                        "Unprocessed frame queue is full, backing off"
                    );
                    frame = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(Error::QueueDisconnected),
            }
        }
    }

    /// Pushes without waiting. A full queue hands the frame back.
    pub fn try_push(&self, frame: DecodedFrame) -> std::result::Result<(), DecodedFrame> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(frame) | TrySendError::Disconnected(frame) => frame,
        })
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tx.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Marks end of stream. Frames already queued stay available to consumers.
    pub fn close(self) {
        drop(self);
    }
}

/// Consumer half of the frame queue; clone one per worker
#[derive(Clone)]
pub struct FrameConsumer {
    rx: Receiver<DecodedFrame>,
}

impl FrameConsumer {
    /// Takes the oldest frame without waiting
    pub fn pop(&self) -> Pop {
        match self.rx.try_recv() {
            Ok(frame) => Pop::Frame(frame),
            Err(TryRecvError::Empty) => Pop::Empty,
            Err(TryRecvError::Disconnected) => Pop::Drained,
        }
    }

    /// Takes the oldest frame, waiting up to `timeout` for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Pop::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Pop::Empty,
            Err(RecvTimeoutError::Disconnected) => Pop::Drained,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn frame(n: u64) -> DecodedFrame {
        DecodedFrame::gray(n, n as f64, 3, 3, vec![n as u8; 9]).unwrap()
    }

    fn popped_number(pop: Pop) -> Option<u64> {
        match pop {
            Pop::Frame(frame) => Some(frame.frame_number()),
            _ => None,
        }
    }

    #[test]
    fn test_fifo_order() {
        let (producer, consumer) = frame_queue(4);
        let cancel = CancellationToken::new();
        for n in 0..3 {
            producer.push(frame(n), Duration::from_millis(10), &cancel).unwrap();
        }

        assert_eq!(popped_number(consumer.pop()), Some(0));
        assert_eq!(popped_number(consumer.pop()), Some(1));
        assert_eq!(popped_number(consumer.pop()), Some(2));
        assert!(matches!(consumer.pop(), Pop::Empty));
    }

    #[test]
    fn test_try_push_full_returns_frame() {
        let (producer, _consumer) = frame_queue(2);
        producer.try_push(frame(0)).unwrap();
        producer.try_push(frame(1)).unwrap();
        assert!(producer.is_full());

        let rejected = producer.try_push(frame(2)).unwrap_err();
        assert_eq!(rejected.frame_number(), 2);
        assert_eq!(producer.len(), 2);
    }

    #[test]
    fn test_close_keeps_buffered_frames() {
        let (producer, consumer) = frame_queue(4);
        producer.try_push(frame(0)).unwrap();
        producer.try_push(frame(1)).unwrap();
        producer.close();

        assert_eq!(popped_number(consumer.pop()), Some(0));
        assert_eq!(popped_number(consumer.pop_timeout(Duration::from_millis(5))), Some(1));
        assert!(matches!(consumer.pop(), Pop::Drained));
        assert!(matches!(consumer.pop_timeout(Duration::from_millis(5)), Pop::Drained));
    }

    #[test]
    fn test_full_queue_stalls_producer_until_drained() {
        let (producer, consumer) = frame_queue(2);
        producer.try_push(frame(0)).unwrap();
        producer.try_push(frame(1)).unwrap();

        let pushed = Arc::new(AtomicBool::new(false));
        let pushed_flag = Arc::clone(&pushed);
        let handle = thread::spawn(move || {
            let cancel = CancellationToken::new();
            producer.push(frame(2), Duration::from_millis(5), &cancel).unwrap();
            pushed_flag.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(!pushed.load(Ordering::SeqCst));
        assert_eq!(consumer.len(), 2);

        assert_eq!(popped_number(consumer.pop()), Some(0));
        handle.join().unwrap();
        assert!(pushed.load(Ordering::SeqCst));

        assert_eq!(popped_number(consumer.pop()), Some(1));
        assert_eq!(popped_number(consumer.pop()), Some(2));
    }

    #[test]
    fn test_cancelled_push_gives_up() {
        let (producer, _consumer) = frame_queue(1);
        producer.try_push(frame(0)).unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        let handle = thread::spawn(move || producer.push(frame(1), Duration::from_millis(5), &canceller));

        thread::sleep(Duration::from_millis(20));
        cancel.cancel();
        assert!(matches!(handle.join().unwrap(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_push_without_consumers_fails() {
        let (producer, consumer) = frame_queue(1);
        drop(consumer);

        let cancel = CancellationToken::new();
        let result = producer.push(frame(0), Duration::from_millis(5), &cancel);
        assert!(matches!(result, Err(Error::QueueDisconnected)));
    }

    #[test]
    fn test_each_frame_delivered_once() {
        let (producer, consumer) = frame_queue(8);
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let consumer = consumer.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    loop {
                        match consumer.pop_timeout(Duration::from_millis(5)) {
                            Pop::Frame(frame) => seen.push(frame.frame_number()),
                            Pop::Empty => continue,
                            Pop::Drained => return seen,
                        }
                    }
                })
            })
            .collect();
        drop(consumer);

        let cancel = CancellationToken::new();
        for n in 0..200 {
            producer.push(frame(n), Duration::from_millis(5), &cancel).unwrap();
        }
        producer.close();

        let mut all: Vec<u64> = consumers
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..200).collect::<Vec<_>>());
    }
}
