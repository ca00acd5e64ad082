//! In-memory repository.
//!
//! # Responsibilities
//! - Hold endpoints, fingerprints and samples in concurrent maps
//! - Provide the same atomicity guarantees as the durable backend
//!
//! # Design Decisions
//! - Each fingerprint slot owns its samples, so the cap check and the insert
//!   run under the same shard lock
//! - The key index is written after the slot, so a reader that finds an id
//!   always finds its slot
//! - Lock order is always index → slots; no path holds a slot lock while
//!   touching the index

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::storage::types::*;
use crate::storage::Repository;

struct FingerprintSlot {
    record: FingerprintRecord,
    samples: VecDeque<Sample>,
}

/// Thread-safe, non-durable repository.
#[derive(Default)]
pub struct MemoryRepository {
    /// (method, normalized_path) → endpoint.
    endpoints: DashMap<(String, String), Endpoint>,
    fingerprint_index: DashMap<FingerprintKey, FingerprintId>,
    fingerprints: DashMap<FingerprintId, FingerprintSlot>,
    next_endpoint_id: AtomicI64,
    next_fingerprint_id: AtomicI64,
    next_sample_id: AtomicI64,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn not_found(id: FingerprintId) -> StorageError {
        StorageError::NotFound {
            entity: "fingerprint",
            id: id.0,
        }
    }

    fn push_sample(&self, slot: &mut FingerprintSlot, payload: &SamplePayload) -> SampleId {
        let id = SampleId(Self::allocate(&self.next_sample_id));
        slot.samples.push_back(Sample {
            id,
            fingerprint_id: slot.record.id,
            payload: payload.clone(),
        });
        slot.record.sample_count += 1;
        id
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn upsert_endpoint(&self, input: &EndpointInput) -> StorageResult<EndpointId> {
        let key = (input.method.clone(), input.normalized_path.clone());
        let now = Utc::now();

        match self.endpoints.entry(key) {
            Entry::Occupied(mut entry) => {
                let endpoint = entry.get_mut();
                endpoint.path = input.path.clone();
                endpoint.last_seen = now;
                endpoint.request_count += 1;
                if input.metadata.is_some() {
                    endpoint.metadata = input.metadata.clone();
                }
                Ok(endpoint.id)
            }
            Entry::Vacant(entry) => {
                let id = EndpointId(Self::allocate(&self.next_endpoint_id));
                entry.insert(Endpoint {
                    id,
                    method: input.method.clone(),
                    path: input.path.clone(),
                    normalized_path: input.normalized_path.clone(),
                    first_seen: now,
                    last_seen: now,
                    request_count: 1,
                    metadata: input.metadata.clone(),
                });
                Ok(id)
            }
        }
    }

    async fn find_fingerprint(
        &self,
        endpoint_id: EndpointId,
        hash: &str,
        status_code: u16,
    ) -> StorageResult<Option<FingerprintRecord>> {
        let key = FingerprintKey {
            endpoint_id,
            hash: hash.to_string(),
            status_code,
        };
        let id = match self.fingerprint_index.get(&key) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.fingerprints.get(&id).map(|slot| slot.record.clone()))
    }

    async fn create_fingerprint(&self, input: &NewFingerprint) -> StorageResult<FingerprintCreation> {
        match self.fingerprint_index.entry(input.key()) {
            Entry::Occupied(entry) => Ok(FingerprintCreation {
                id: *entry.get(),
                created: false,
            }),
            Entry::Vacant(entry) => {
                let id = FingerprintId(Self::allocate(&self.next_fingerprint_id));
                let now = Utc::now();
                self.fingerprints.insert(
                    id,
                    FingerprintSlot {
                        record: FingerprintRecord {
                            id,
                            endpoint_id: input.endpoint_id,
                            hash: input.hash.clone(),
                            status_code: input.status_code,
                            signature: input.signature.clone(),
                            first_seen: now,
                            last_seen: now,
                            occurrence_count: 1,
                            sample_count: 0,
                        },
                        samples: VecDeque::new(),
                    },
                );
                entry.insert(id);
                Ok(FingerprintCreation { id, created: true })
            }
        }
    }

    async fn increment_fingerprint_occurrence(&self, id: FingerprintId) -> StorageResult<()> {
        let mut slot = self.fingerprints.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        slot.record.occurrence_count += 1;
        slot.record.last_seen = Utc::now();
        Ok(())
    }

    async fn get_sample_count(&self, id: FingerprintId) -> StorageResult<u32> {
        self.fingerprints
            .get(&id)
            .map(|slot| slot.record.sample_count)
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create_sample(
        &self,
        fingerprint_id: FingerprintId,
        payload: &SamplePayload,
    ) -> StorageResult<SampleId> {
        let mut slot = self
            .fingerprints
            .get_mut(&fingerprint_id)
            .ok_or_else(|| Self::not_found(fingerprint_id))?;
        Ok(self.push_sample(&mut slot, payload))
    }

    async fn try_create_sample(
        &self,
        fingerprint_id: FingerprintId,
        payload: &SamplePayload,
        cap: u32,
    ) -> StorageResult<Option<SampleId>> {
        let mut slot = self
            .fingerprints
            .get_mut(&fingerprint_id)
            .ok_or_else(|| Self::not_found(fingerprint_id))?;
        if slot.record.sample_count >= cap {
            return Ok(None);
        }
        Ok(Some(self.push_sample(&mut slot, payload)))
    }

    async fn delete_oldest_sample(&self, fingerprint_id: FingerprintId) -> StorageResult<bool> {
        let mut slot = self
            .fingerprints
            .get_mut(&fingerprint_id)
            .ok_or_else(|| Self::not_found(fingerprint_id))?;
        match slot.samples.pop_front() {
            Some(_) => {
                slot.record.sample_count -= 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_fingerprint(&self, id: FingerprintId) -> StorageResult<Option<FingerprintRecord>> {
        Ok(self.fingerprints.get(&id).map(|slot| slot.record.clone()))
    }

    async fn list_endpoints(&self) -> StorageResult<Vec<Endpoint>> {
        let mut endpoints: Vec<Endpoint> = self.endpoints.iter().map(|e| e.value().clone()).collect();
        endpoints.sort_by_key(|e| e.id);
        Ok(endpoints)
    }

    async fn list_fingerprints(&self, endpoint_id: EndpointId) -> StorageResult<Vec<FingerprintRecord>> {
        let mut records: Vec<FingerprintRecord> = self
            .fingerprints
            .iter()
            .filter(|slot| slot.record.endpoint_id == endpoint_id)
            .map(|slot| slot.record.clone())
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn list_samples(&self, fingerprint_id: FingerprintId) -> StorageResult<Vec<Sample>> {
        let slot = self
            .fingerprints
            .get(&fingerprint_id)
            .ok_or_else(|| Self::not_found(fingerprint_id))?;
        Ok(slot.samples.iter().cloned().collect())
    }

    async fn stats(&self) -> StorageResult<RepositoryStats> {
        let mut stats = RepositoryStats {
            total_endpoints: self.endpoints.len() as u64,
            ..RepositoryStats::default()
        };
        for slot in self.fingerprints.iter() {
            stats.total_fingerprints += 1;
            stats.total_samples += slot.samples.len() as u64;
            stats.total_requests += slot.record.occurrence_count;
        }
        Ok(stats)
    }
}
