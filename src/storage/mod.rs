//! Storage subsystem.
//!
//! # Data Flow
//! ```text
//! RetentionCoordinator
//!     → Repository trait (this file)
//!         → memory.rs (DashMap, default, tests)
//!         → sqlite.rs (rusqlite, durable)
//! ```
//!
//! # Design Decisions
//! - The coordinator only sees the trait; backends are injected as `Arc<dyn Repository>`
//! - Fingerprint creation is first-writer-wins on the (endpoint, hash, status) key
//! - The sample cap is enforced inside the backend by `try_create_sample`,
//!   never by a separate count-then-insert in the caller
//! - No operation deletes endpoints or fingerprints

pub mod memory;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;

pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;
pub use types::*;

/// Persistence contract for endpoints, fingerprints and samples.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Create the endpoint or bump its counter, last-seen and raw path.
    async fn upsert_endpoint(&self, input: &EndpointInput) -> StorageResult<EndpointId>;

    /// Look up a fingerprint by its full key.
    async fn find_fingerprint(
        &self,
        endpoint_id: EndpointId,
        hash: &str,
        status_code: u16,
    ) -> StorageResult<Option<FingerprintRecord>>;

    /// Create a fingerprint with occurrence 1, or return the existing one.
    async fn create_fingerprint(&self, input: &NewFingerprint) -> StorageResult<FingerprintCreation>;

    /// Add one occurrence and refresh last-seen.
    async fn increment_fingerprint_occurrence(&self, id: FingerprintId) -> StorageResult<()>;

    async fn get_sample_count(&self, id: FingerprintId) -> StorageResult<u32>;

    /// Insert a sample and bump the parent's sample counter, without a cap.
    async fn create_sample(
        &self,
        fingerprint_id: FingerprintId,
        payload: &SamplePayload,
    ) -> StorageResult<SampleId>;

    /// Insert a sample only if the parent holds fewer than `cap` samples.
    ///
    /// The check and the insert are one atomic step. Returns `None` at the cap.
    async fn try_create_sample(
        &self,
        fingerprint_id: FingerprintId,
        payload: &SamplePayload,
        cap: u32,
    ) -> StorageResult<Option<SampleId>>;

    /// Remove the oldest retained sample and decrement the counter.
    ///
    /// Returns false when the fingerprint has no samples.
    async fn delete_oldest_sample(&self, fingerprint_id: FingerprintId) -> StorageResult<bool>;

    async fn get_fingerprint(&self, id: FingerprintId) -> StorageResult<Option<FingerprintRecord>>;

    async fn list_endpoints(&self) -> StorageResult<Vec<Endpoint>>;

    async fn list_fingerprints(&self, endpoint_id: EndpointId) -> StorageResult<Vec<FingerprintRecord>>;

    /// Samples of a fingerprint, oldest first.
    async fn list_samples(&self, fingerprint_id: FingerprintId) -> StorageResult<Vec<Sample>>;

    async fn stats(&self) -> StorageResult<RepositoryStats>;
}
