//! Retention coordinator.
//!
//! # Responsibilities
//! - Resolve the endpoint of each observation
//! - Decide new shape vs. known shape
//! - Count every occurrence and retain samples up to the cap
//!
//! # State Transitions (per fingerprint key)
//! ```text
//! UNSEEN         --observe--> SEEN(count=1)
//! SEEN(count<cap) --observe--> SEEN(count+1)
//! SEEN(count=cap) --observe--> SEEN(count=cap)   occurrence still increments
//! ```
//!
//! # Design Decisions
//! - Stateless apart from the injected repository
//! - The cap is enforced by the repository's atomic bounded insert; the
//!   coordinator never compares a previously read count
//! - Losing a concurrent creation race demotes the observation to the
//!   known-shape path
//! - Does not log; callers report outcomes
//! - No retries: sample insertion is not idempotent

use std::sync::Arc;

use crate::collector::types::{
    CollectorError, Observation, ProcessOutcome, ReplacementStrategy, RetentionPolicy,
};
use crate::storage::{FingerprintId, NewFingerprint, Repository};

/// Applies the deduplication and sample-cap policy against a repository.
pub struct RetentionCoordinator {
    repository: Arc<dyn Repository>,
    policy: RetentionPolicy,
}

impl RetentionCoordinator {
    /// Create a coordinator over an injected repository.
    pub fn new(repository: Arc<dyn Repository>, policy: RetentionPolicy) -> Self {
        Self { repository, policy }
    }

    /// Record one observation and decide whether its sample is retained.
    ///
    /// Any repository failure aborts the call; earlier steps are not undone.
    pub async fn process(&self, observation: &Observation) -> Result<ProcessOutcome, CollectorError> {
        let endpoint_id = self
            .repository
            .upsert_endpoint(&observation.endpoint_input())
            .await?;

        let hash = &observation.fingerprint.hash;
        let status_code = observation.response.status_code;

        if let Some(existing) = self
            .repository
            .find_fingerprint(endpoint_id, hash, status_code)
            .await?
        {
            return self.observe_known(existing.id, observation).await;
        }

        let creation = self
            .repository
            .create_fingerprint(&NewFingerprint {
                endpoint_id,
                hash: hash.clone(),
                status_code,
                signature: observation.fingerprint.signature.clone(),
            })
            .await?;

        if !creation.created {
            return self.observe_known(creation.id, observation).await;
        }

        let retained = self
            .repository
            .try_create_sample(
                creation.id,
                &observation.sample_payload(),
                self.policy.max_samples_per_fingerprint,
            )
            .await?
            .is_some();

        Ok(ProcessOutcome {
            fingerprint_id: creation.id,
            is_new_shape: true,
            sample_retained: retained,
        })
    }

    async fn observe_known(
        &self,
        fingerprint_id: FingerprintId,
        observation: &Observation,
    ) -> Result<ProcessOutcome, CollectorError> {
        self.repository
            .increment_fingerprint_occurrence(fingerprint_id)
            .await?;

        let payload = observation.sample_payload();
        let cap = self.policy.max_samples_per_fingerprint;

        let mut retained = self
            .repository
            .try_create_sample(fingerprint_id, &payload, cap)
            .await?
            .is_some();

        if !retained
            && self.policy.strategy == ReplacementStrategy::EvictOldest
            && self.repository.delete_oldest_sample(fingerprint_id).await?
        {
            retained = self
                .repository
                .try_create_sample(fingerprint_id, &payload, cap)
                .await?
                .is_some();
        }

        Ok(ProcessOutcome {
            fingerprint_id,
            is_new_shape: false,
            sample_retained: retained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{EndpointDescriptor, RequestCapture, ResponseCapture};
    use crate::fingerprint::fingerprint;
    use crate::routing::normalize_path;
    use crate::storage::{MemoryRepository, SqliteRepository};
    use chrono::Utc;
    use serde_json::{json, Value};

    fn observation(method: &str, path: &str, status_code: u16, body: Value) -> Observation {
        Observation {
            endpoint: EndpointDescriptor {
                method: method.to_string(),
                path: path.to_string(),
                normalized_path: normalize_path(path),
            },
            fingerprint: fingerprint(&body),
            request: RequestCapture::default(),
            response: ResponseCapture {
                status_code,
                headers: Default::default(),
                body,
                response_time_ms: 4,
            },
            timestamp: Utc::now(),
        }
    }

    fn coordinator(max: u32, strategy: ReplacementStrategy) -> (RetentionCoordinator, Arc<MemoryRepository>) {
        let repo = Arc::new(MemoryRepository::new());
        let coordinator = RetentionCoordinator::new(
            repo.clone(),
            RetentionPolicy {
                max_samples_per_fingerprint: max,
                strategy,
            },
        );
        (coordinator, repo)
    }

    #[tokio::test]
    async fn test_new_shape() {
        let (coordinator, repo) = coordinator(50, ReplacementStrategy::DropNew);
        let outcome = coordinator
            .process(&observation("GET", "/users/1", 200, json!({"id": 1, "name": "a"})))
            .await
            .unwrap();

        assert!(outcome.is_new_shape);
        assert!(outcome.sample_retained);

        let endpoints = repo.list_endpoints().await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].normalized_path, "/users/:id");

        let record = repo.get_fingerprint(outcome.fingerprint_id).await.unwrap().unwrap();
        assert_eq!(record.occurrence_count, 1);
        assert_eq!(record.sample_count, 1);
        assert_eq!(record.signature, "{id:number,name:string}");
        assert_eq!(repo.list_samples(outcome.fingerprint_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeat_shape() {
        let (coordinator, repo) = coordinator(50, ReplacementStrategy::DropNew);
        let first = coordinator
            .process(&observation("GET", "/users/1", 200, json!({"id": 1, "name": "a"})))
            .await
            .unwrap();
        let second = coordinator
            .process(&observation("GET", "/users/2", 200, json!({"id": 2, "name": "b"})))
            .await
            .unwrap();

        assert_eq!(first.fingerprint_id, second.fingerprint_id);
        assert!(!second.is_new_shape);
        assert!(second.sample_retained);

        let record = repo.get_fingerprint(second.fingerprint_id).await.unwrap().unwrap();
        assert_eq!(record.occurrence_count, 2);
        assert_eq!(record.sample_count, 2);
    }

    #[tokio::test]
    async fn test_status_code_and_endpoint_split_shapes() {
        let (coordinator, repo) = coordinator(50, ReplacementStrategy::DropNew);
        let body = json!({"error": "x"});
        let a = coordinator.process(&observation("GET", "/users/1", 404, body.clone())).await.unwrap();
        let b = coordinator.process(&observation("GET", "/users/1", 500, body.clone())).await.unwrap();
        let c = coordinator.process(&observation("POST", "/users", 404, body)).await.unwrap();

        assert!(a.is_new_shape && b.is_new_shape && c.is_new_shape);
        assert_ne!(a.fingerprint_id, b.fingerprint_id);
        assert_ne!(a.fingerprint_id, c.fingerprint_id);
        assert_eq!(repo.stats().await.unwrap().total_fingerprints, 3);
    }

    #[tokio::test]
    async fn test_cap_invariant() {
        let (coordinator, repo) = coordinator(3, ReplacementStrategy::DropNew);
        let mut retained = 0;
        let mut last = None;
        for i in 0..10 {
            let outcome = coordinator
                .process(&observation("GET", &format!("/users/{i}"), 200, json!({"id": i})))
                .await
                .unwrap();
            if outcome.sample_retained {
                retained += 1;
            }
            last = Some(outcome);
        }

        let id = last.unwrap().fingerprint_id;
        let record = repo.get_fingerprint(id).await.unwrap().unwrap();
        assert_eq!(retained, 3);
        assert_eq!(record.occurrence_count, 10);
        assert_eq!(record.sample_count, 3);
        assert_eq!(repo.list_samples(id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_evict_oldest_keeps_newest() {
        let (coordinator, repo) = coordinator(2, ReplacementStrategy::EvictOldest);
        let mut id = None;
        for i in 0..5 {
            let outcome = coordinator
                .process(&observation("GET", "/items", 200, json!({"n": i})))
                .await
                .unwrap();
            assert!(outcome.sample_retained);
            id = Some(outcome.fingerprint_id);
        }

        let samples = repo.list_samples(id.unwrap()).await.unwrap();
        let bodies: Vec<Value> = samples.into_iter().map(|s| s.payload.response_body).collect();
        assert_eq!(bodies, vec![json!({"n": 3}), json!({"n": 4})]);
    }

    #[tokio::test]
    async fn test_concurrent_observations_single_shape() {
        let (coordinator, repo) = coordinator(4, ReplacementStrategy::DropNew);
        let coordinator = Arc::new(coordinator);

        let mut handles = Vec::new();
        for i in 0..40 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .process(&observation("GET", "/users/1", 200, json!({"id": i})))
                    .await
                    .unwrap()
            }));
        }

        let mut new_shapes = 0;
        for handle in handles {
            if handle.await.unwrap().is_new_shape {
                new_shapes += 1;
            }
        }

        let stats = repo.stats().await.unwrap();
        assert_eq!(new_shapes, 1);
        assert_eq!(stats.total_fingerprints, 1);
        assert_eq!(stats.total_samples, 4);
        assert_eq!(stats.total_requests, 40);
    }

    #[tokio::test]
    async fn test_sqlite_backend_cap_invariant() {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let coordinator = RetentionCoordinator::new(
            repo.clone(),
            RetentionPolicy {
                max_samples_per_fingerprint: 2,
                strategy: ReplacementStrategy::DropNew,
            },
        );

        for i in 0..5 {
            coordinator
                .process(&observation("GET", "/users/1", 200, json!({"id": i, "name": "n"})))
                .await
                .unwrap();
        }

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total_fingerprints, 1);
        assert_eq!(stats.total_samples, 2);
        assert_eq!(stats.total_requests, 5);
    }
}
