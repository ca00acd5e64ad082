//! Persisted record types and storage errors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Header snapshot keyed by header name. Repeated headers are comma-joined.
pub type Headers = BTreeMap<String, String>;

/// Parsed query string.
pub type QueryParams = BTreeMap<String, String>;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

record_id!(
    /// Identifier of an [`Endpoint`].
    EndpointId
);
record_id!(
    /// Identifier of a [`FingerprintRecord`].
    FingerprintId
);
record_id!(
    /// Identifier of a [`Sample`].
    SampleId
);

/// An observed (method, normalized path) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub method: String,
    /// Raw path of the most recent observation.
    pub path: String,
    pub normalized_path: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub request_count: u64,
    pub metadata: Option<String>,
}

/// Input for an endpoint upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInput {
    pub method: String,
    pub path: String,
    pub normalized_path: String,
    /// Replaces stored metadata when `Some`; keeps it when `None`.
    pub metadata: Option<String>,
}

/// Full identity of a shape bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FingerprintKey {
    pub endpoint_id: EndpointId,
    pub hash: String,
    pub status_code: u16,
}

/// One deduplicated response shape under an endpoint and status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub id: FingerprintId,
    pub endpoint_id: EndpointId,
    pub hash: String,
    pub status_code: u16,
    pub signature: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Every observation of this key, sampled or not.
    pub occurrence_count: u64,
    /// Samples currently retained. Never above the configured cap.
    pub sample_count: u32,
}

/// Input for fingerprint creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFingerprint {
    pub endpoint_id: EndpointId,
    pub hash: String,
    pub status_code: u16,
    pub signature: String,
}

impl NewFingerprint {
    pub fn key(&self) -> FingerprintKey {
        FingerprintKey {
            endpoint_id: self.endpoint_id,
            hash: self.hash.clone(),
            status_code: self.status_code,
        }
    }
}

/// Result of a first-writer-wins fingerprint creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintCreation {
    pub id: FingerprintId,
    /// False when the key already existed and `id` is the existing row.
    pub created: bool,
}

/// Redacted request/response pair as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePayload {
    pub captured_at: DateTime<Utc>,
    pub request_headers: Headers,
    pub request_body: Option<Value>,
    pub request_query: Option<QueryParams>,
    pub response_headers: Headers,
    pub response_body: Value,
    pub response_time_ms: u64,
}

/// A retained sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub fingerprint_id: FingerprintId,
    #[serde(flatten)]
    pub payload: SamplePayload,
}

/// Aggregate counters over the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub total_endpoints: u64,
    pub total_fingerprints: u64,
    pub total_samples: u64,
    /// Sum of every fingerprint's occurrence counter.
    pub total_requests: u64,
}

/// Errors that can occur in a repository.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite failure (connectivity, constraint violation, I/O).
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored JSON could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Task(String),

    /// A storage lock was poisoned by a panicking holder.
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for repository operations.
pub type StorageResult<T> = Result<T, StorageError>;
