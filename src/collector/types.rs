//! Observation, policy and outcome types for the collector.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::fingerprint::FingerprintResult;
use crate::storage::{EndpointInput, FingerprintId, Headers, QueryParams, SamplePayload, StorageError};

/// Default cap on retained samples per fingerprint.
pub const DEFAULT_MAX_SAMPLES_PER_FINGERPRINT: u32 = 50;

/// Endpoint identity of an observed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub method: String,
    pub path: String,
    pub normalized_path: String,
}

/// Redacted request side of an exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestCapture {
    pub headers: Headers,
    pub body: Option<Value>,
    pub query: Option<QueryParams>,
}

/// Redacted response side of an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCapture {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Value,
    pub response_time_ms: u64,
}

/// One fingerprinted, redacted exchange ready for the retention decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub endpoint: EndpointDescriptor,
    pub fingerprint: FingerprintResult,
    pub request: RequestCapture,
    pub response: ResponseCapture,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub(crate) fn endpoint_input(&self) -> EndpointInput {
        EndpointInput {
            method: self.endpoint.method.clone(),
            path: self.endpoint.path.clone(),
            normalized_path: self.endpoint.normalized_path.clone(),
            metadata: None,
        }
    }

    pub(crate) fn sample_payload(&self) -> SamplePayload {
        SamplePayload {
            captured_at: self.timestamp,
            request_headers: self.request.headers.clone(),
            request_body: self.request.body.clone(),
            request_query: self.request.query.clone(),
            response_headers: self.response.headers.clone(),
            response_body: self.response.body.clone(),
            response_time_ms: self.response.response_time_ms,
        }
    }
}

/// What happens to a new sample once its fingerprint is at the cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementStrategy {
    /// Keep the existing samples and discard the new one.
    #[default]
    DropNew,
    /// Evict the oldest sample, then store the new one.
    EvictOldest,
}

/// Retention settings fixed at coordinator construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_samples_per_fingerprint: u32,
    pub strategy: ReplacementStrategy,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_samples_per_fingerprint: DEFAULT_MAX_SAMPLES_PER_FINGERPRINT,
            strategy: ReplacementStrategy::DropNew,
        }
    }
}

/// Result of processing one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub fingerprint_id: FingerprintId,
    /// True only for the observation that created the fingerprint.
    pub is_new_shape: bool,
    pub sample_retained: bool,
}

impl ProcessOutcome {
    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match (self.is_new_shape, self.sample_retained) {
            (true, _) => "new_shape",
            (false, true) => "sampled",
            (false, false) => "counted",
        }
    }
}

/// Errors that abandon a single observation.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// A repository call failed.
    #[error("Repository error: {0}")]
    Storage(#[from] StorageError),

    /// Processing did not finish within the deadline.
    #[error("Observation processing timed out after {0:?}")]
    Timeout(Duration),
}

impl CollectorError {
    /// Metric label for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::Storage(_) => "storage",
            CollectorError::Timeout(_) => "timeout",
        }
    }
}
