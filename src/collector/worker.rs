//! Background task that feeds queued observations to the coordinator.
//!
//! # Responsibilities
//! - Pull observations off the queue one at a time
//! - Bound each `process` call with a timeout
//! - Log and count outcomes and failures
//! - Drain already-queued observations on shutdown

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::collector::coordinator::RetentionCoordinator;
use crate::collector::queue::QueueStats;
use crate::collector::types::{CollectorError, Observation, ProcessOutcome};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

pub struct ObservationWorker {
    coordinator: Arc<RetentionCoordinator>,
    stats: Arc<QueueStats>,
    process_timeout: Duration,
}

impl ObservationWorker {
    pub fn new(
        coordinator: Arc<RetentionCoordinator>,
        stats: Arc<QueueStats>,
        process_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            stats,
            process_timeout,
        }
    }

    /// Run until the queue closes or shutdown is signalled.
    pub async fn run(self, mut rx: mpsc::Receiver<Observation>, mut shutdown: ShutdownSignal) {
        tracing::debug!("Observation worker started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                next = rx.recv() => match next {
                    Some(observation) => {
                        self.handle(observation).await;
                    }
                    None => {
                        tracing::debug!("Observation queue closed");
                        return;
                    }
                },
            }
        }

        rx.close();
        let mut drained = 0usize;
        while let Some(observation) = rx.recv().await {
            self.handle(observation).await;
            drained += 1;
        }
        tracing::info!(drained, "Observation worker stopped");
    }

    /// Process one observation. Failures are logged and counted, never returned.
    pub async fn handle(&self, observation: Observation) -> Option<ProcessOutcome> {
        let result = match tokio::time::timeout(
            self.process_timeout,
            self.coordinator.process(&observation),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CollectorError::Timeout(self.process_timeout)),
        };

        let endpoint = &observation.endpoint;
        match result {
            Ok(outcome) => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                metrics::record_observation(outcome.label());

                if outcome.is_new_shape {
                    tracing::info!(
                        method = %endpoint.method,
                        path = %endpoint.normalized_path,
                        status = observation.response.status_code,
                        fingerprint_id = %outcome.fingerprint_id,
                        signature = %observation.fingerprint.signature,
                        "New response shape"
                    );
                } else {
                    tracing::debug!(
                        method = %endpoint.method,
                        path = %endpoint.normalized_path,
                        status = observation.response.status_code,
                        fingerprint_id = %outcome.fingerprint_id,
                        sample_retained = outcome.sample_retained,
                        "Known response shape"
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                match e {
                    CollectorError::Timeout(_) => {
                        self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                    }
                    CollectorError::Storage(_) => {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                metrics::record_failure(e.kind());
                tracing::error!(
                    method = %endpoint.method,
                    path = %endpoint.normalized_path,
                    error = %e,
                    "Observation abandoned"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::queue::ObservationQueue;
    use crate::collector::types::{EndpointDescriptor, RequestCapture, ResponseCapture, RetentionPolicy};
    use crate::fingerprint::fingerprint;
    use crate::lifecycle::Shutdown;
    use crate::storage::{MemoryRepository, Repository};
    use serde_json::json;

    fn observation(i: u64) -> Observation {
        let body = json!({"id": i});
        Observation {
            endpoint: EndpointDescriptor {
                method: "GET".into(),
                path: format!("/users/{i}"),
                normalized_path: "/users/:id".into(),
            },
            fingerprint: fingerprint(&body),
            request: RequestCapture::default(),
            response: ResponseCapture {
                status_code: 200,
                headers: Default::default(),
                body,
                response_time_ms: 1,
            },
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_worker_drains_on_shutdown() {
        let repo = Arc::new(MemoryRepository::new());
        let coordinator = Arc::new(RetentionCoordinator::new(repo.clone(), RetentionPolicy::default()));
        let (queue, rx) = ObservationQueue::new(16);
        for i in 0..5 {
            queue.submit(observation(i)).unwrap();
        }

        let shutdown = Shutdown::new();
        shutdown.trigger();
        let worker = ObservationWorker::new(coordinator, queue.stats(), Duration::from_secs(1));
        worker.run(rx, shutdown.subscribe()).await;

        assert_eq!(queue.stats().snapshot().processed, 5);
        assert_eq!(repo.stats().await.unwrap().total_requests, 5);
    }

    #[tokio::test]
    async fn test_worker_stops_when_queue_closes() {
        let repo = Arc::new(MemoryRepository::new());
        let coordinator = Arc::new(RetentionCoordinator::new(repo.clone(), RetentionPolicy::default()));
        let (queue, rx) = ObservationQueue::new(4);
        let stats = queue.stats();
        queue.submit(observation(1)).unwrap();
        drop(queue);

        let shutdown = Shutdown::new();
        let worker = ObservationWorker::new(coordinator, stats.clone(), Duration::from_secs(1));
        tokio::time::timeout(Duration::from_secs(2), worker.run(rx, shutdown.subscribe()))
            .await
            .unwrap();

        assert_eq!(stats.snapshot().processed, 1);
    }
}
