//! Turns a proxied exchange into an observation.
//!
//! # Data Flow
//! ```text
//! CapturedExchange (raw bytes + headers)
//!     → undo Content-Encoding            (skip on failure)
//!     → parse response body as JSON      (skip on failure)
//!     → require object or array          (skip otherwise)
//!     → fingerprint                      (before redaction)
//!     → redact headers and bodies
//!     → normalize path, parse query
//!     → Observation
//! ```

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::collector::decode::{decode_content, parse_json};
use crate::collector::types::{EndpointDescriptor, Observation, RequestCapture, ResponseCapture};
use crate::config::SecurityConfig;
use crate::fingerprint::{self, DEFAULT_BUDGET};
use crate::http::request::header_snapshot;
use crate::observability::metrics;
use crate::routing::normalize_path;
use crate::security::Redactor;
use crate::storage::QueryParams;

/// Everything the proxy saw for one request/response pair.
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub request_headers: HeaderMap,
    pub request_body: Bytes,
    pub status: StatusCode,
    pub response_headers: HeaderMap,
    pub response_body: Bytes,
    pub response_time: Duration,
    pub timestamp: DateTime<Utc>,
}

pub struct Interceptor {
    redactor: Redactor,
    fingerprint_budget: Duration,
    /// Largest decoded body that is inspected.
    max_decoded_size: usize,
}

impl Interceptor {
    pub fn new(redactor: Redactor, fingerprint_budget: Duration, max_decoded_size: usize) -> Self {
        Self {
            redactor,
            fingerprint_budget,
            max_decoded_size,
        }
    }

    /// Build an observation, or `None` when the response is not a JSON
    /// object or array.
    pub fn inspect(&self, exchange: CapturedExchange) -> Option<Observation> {
        let decoded = match decode_content(
            &exchange.response_headers,
            &exchange.response_body,
            self.max_decoded_size,
        ) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(
                    request_id = %exchange.request_id,
                    path = %exchange.path,
                    error = %e,
                    "Response body could not be decoded, skipping"
                );
                return None;
            }
        };

        let body: Value = match parse_json(&decoded) {
            Some(value) => value,
            None => {
                tracing::debug!(
                    request_id = %exchange.request_id,
                    path = %exchange.path,
                    "Response body is not JSON, skipping"
                );
                return None;
            }
        };

        if !body.is_object() && !body.is_array() {
            tracing::debug!(
                request_id = %exchange.request_id,
                path = %exchange.path,
                "Response body is a JSON scalar, skipping"
            );
            return None;
        }

        let fingerprint = fingerprint::fingerprint(&body);
        let slow = fingerprint.exceeds(self.fingerprint_budget);
        metrics::record_fingerprint(fingerprint.elapsed, slow);
        if slow {
            tracing::warn!(
                request_id = %exchange.request_id,
                path = %exchange.path,
                elapsed_us = fingerprint.elapsed.as_micros() as u64,
                budget_us = self.fingerprint_budget.as_micros() as u64,
                "Fingerprinting exceeded budget"
            );
        }

        let mut response_body = body;
        self.redactor.redact_value(&mut response_body);

        let request_body = decode_content(
            &exchange.request_headers,
            &exchange.request_body,
            self.max_decoded_size,
        )
        .ok()
        .and_then(|decoded| parse_json(&decoded))
        .map(|mut value| {
            self.redactor.redact_value(&mut value);
            value
        });

        Some(Observation {
            endpoint: EndpointDescriptor {
                method: exchange.method.as_str().to_string(),
                normalized_path: normalize_path(&exchange.path),
                path: exchange.path,
            },
            fingerprint,
            request: RequestCapture {
                headers: self.redactor.redact_headers(&header_snapshot(&exchange.request_headers)),
                body: request_body,
                query: exchange.query.as_deref().and_then(parse_query),
            },
            response: ResponseCapture {
                status_code: exchange.status.as_u16(),
                headers: self.redactor.redact_headers(&header_snapshot(&exchange.response_headers)),
                body: response_body,
                response_time_ms: exchange.response_time.as_millis() as u64,
            },
            timestamp: exchange.timestamp,
        })
    }
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new(
            Redactor::default(),
            DEFAULT_BUDGET,
            SecurityConfig::default().max_body_size,
        )
    }
}

/// Parse a query string. Later duplicates win; empty input yields `None`.
pub fn parse_query(query: &str) -> Option<QueryParams> {
    let params: QueryParams = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    if params.is_empty() {
        None
    } else {
        Some(params)
    }
}
