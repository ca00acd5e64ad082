//! Response handling.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Map forwarding failures to client-facing status codes
//! - Resume a partly buffered upstream body as a stream
//!
//! # Design Decisions
//! - Bodies are buffered up to the configured limit so they can be inspected;
//!   larger bodies are streamed to the client and never inspected
//! - Upstream timeouts result in 504 Gateway Timeout, other failures in 502

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use hyper::body::{Frame, Incoming, SizeHint};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in HOP_BY_HOP.iter().copied().map(str::to_string).chain(listed) {
        headers.remove(name.as_str());
    }
}

/// Why a request could not be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Request body exceeds {0} bytes")]
    RequestTooLarge(usize),

    #[error("Invalid upstream URI: {0}")]
    InvalidUri(#[from] axum::http::Error),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream timed out")]
    Timeout,
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::RequestTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::InvalidUri(_) | ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut response = Response::new(Body::from(self.to_string()));
        *response.status_mut() = status;
        response
    }
}

/// Upstream body whose first bytes were already read off the wire.
pub struct ResumedBody {
    prefix: Option<Bytes>,
    rest: Incoming,
}

impl ResumedBody {
    pub fn new(prefix: Bytes, rest: Incoming) -> Self {
        Self {
            prefix: Some(prefix).filter(|p| !p.is_empty()),
            rest,
        }
    }
}

impl hyper::body::Body for ResumedBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if let Some(prefix) = self.prefix.take() {
            return Poll::Ready(Some(Ok(Frame::data(prefix))));
        }
        Pin::new(&mut self.rest).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.prefix.is_none() && self.rest.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let rest = self.rest.size_hint();
        let len = self.prefix.as_ref().map_or(0, |p| p.len() as u64);

        let mut hint = SizeHint::new();
        if let Some(upper) = rest.upper() {
            hint.set_upper(upper + len);
        }
        hint.set_lower(rest.lower() + len);
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close, x-private"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("connection").is_none());
        assert!(headers.get("x-private").is_none());
        assert!(headers.get("transfer-encoding").is_none());
        assert_eq!(headers["content-type"], "application/json");
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ForwardError::RequestTooLarge(1).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ForwardError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ForwardError::Upstream("refused".into()).status(), StatusCode::BAD_GATEWAY);
    }
}
