//! Request-side helpers.
//!
//! # Responsibilities
//! - Read the request ID set by the request-id layer
//! - Snapshot header maps into plain string maps for capture
//! - Build the upstream URI from the configured base and the client path
//! - Limit `Accept-Encoding` to codings the interceptor can decode
//!
//! # Design Decisions
//! - Non-UTF-8 header values are captured lossily, never rejected
//! - Repeated headers are joined with ", "

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Uri};
use url::Url;

use crate::collector::decode::SUPPORTED_CODINGS;
use crate::storage::Headers;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header name constant for the request-id layers.
pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(X_REQUEST_ID)
}

/// Correlation ID of a request, or `"unknown"` when absent.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Snapshot a header map.
pub fn header_snapshot(headers: &HeaderMap) -> Headers {
    let mut snapshot = Headers::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        snapshot
            .entry(name.as_str().to_string())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    snapshot
}

/// Join the upstream base URL with the client's path and query.
///
/// The base path, if any, is kept as a prefix.
pub fn upstream_uri(base: &Url, uri: &Uri) -> Result<Uri, axum::http::Error> {
    let base_path = base.path().trim_end_matches('/');
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    let authority = match base.port() {
        Some(port) => format!("{}:{}", base.host_str().unwrap_or("localhost"), port),
        None => base.host_str().unwrap_or("localhost").to_string(),
    };

    Uri::builder()
        .scheme(base.scheme())
        .authority(authority.as_str())
        .path_and_query(format!("{base_path}{path_and_query}"))
        .build()
}

/// Drop codings from `Accept-Encoding` that cannot be decoded for
/// inspection, falling back to `identity` when none remain.
pub fn restrict_accept_encoding(headers: &mut HeaderMap) {
    let Some(value) = headers.get(header::ACCEPT_ENCODING) else {
        return;
    };

    let accepted: Vec<String> = value
        .to_str()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| {
            let coding = entry.split(';').next().unwrap_or_default().trim();
            coding.eq_ignore_ascii_case("identity")
                || SUPPORTED_CODINGS.iter().any(|c| c.eq_ignore_ascii_case(coding))
        })
        .map(str::to_string)
        .collect();

    let restricted = if accepted.is_empty() {
        HeaderValue::from_static("identity")
    } else {
        HeaderValue::from_str(&accepted.join(", "))
            .unwrap_or_else(|_| HeaderValue::from_static("identity"))
    };
    headers.insert(header::ACCEPT_ENCODING, restricted);
}
