//! Bounded hand-off between the serving path and the worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::collector::types::Observation;
use crate::observability::metrics;

/// Counters shared by the queue and the worker.
#[derive(Debug, Default)]
pub struct QueueStats {
    pub submitted: AtomicU64,
    pub dropped_full: AtomicU64,
    pub dropped_closed: AtomicU64,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub submitted: u64,
    pub dropped_full: u64,
    pub dropped_closed: u64,
    pub processed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl QueueSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_full + self.dropped_closed
    }
}

/// Why an observation was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    Full,
    Closed,
}

/// Producer side of the observation queue. Cheap to clone.
#[derive(Clone)]
pub struct ObservationQueue {
    tx: mpsc::Sender<Observation>,
    stats: Arc<QueueStats>,
}

impl ObservationQueue {
    /// Create a queue holding at most `capacity` pending observations.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Observation>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx,
            stats: Arc::new(QueueStats::default()),
        };
        (queue, rx)
    }

    /// Enqueue without waiting. Drops are counted, never retried.
    pub fn submit(&self, observation: Observation) -> Result<(), SubmitError> {
        match self.tx.try_send(observation) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped_full.fetch_add(1, Ordering::Relaxed);
                metrics::record_dropped("queue_full");
                Err(SubmitError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.dropped_closed.fetch_add(1, Ordering::Relaxed);
                metrics::record_dropped("queue_closed");
                Err(SubmitError::Closed)
            }
        }
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }

    /// Observations waiting for the worker.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
