//! Body decoding ahead of inspection.
//!
//! # Responsibilities
//! - Undo `Content-Encoding` (gzip, deflate) so compressed JSON can be parsed
//! - Parse JSON of any nesting depth without recursing past a fixed level
//!
//! # Design Decisions
//! - Only the copy handed to the interceptor is decoded; clients get the
//!   upstream bytes unchanged
//! - Decoded output is capped so a small compressed body cannot expand
//!   without bound
//! - Bodies nested deeper than serde_json accepts are truncated at
//!   [`PARSE_DEPTH`] before parsing. The signature is unaffected because it
//!   stops at `MAX_DEPTH`; the stored sample carries `null` below the cut

use std::borrow::Cow;
use std::io::Read;

use axum::http::{header, HeaderMap};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde_json::Value;
use thiserror::Error;

/// Content codings that can be undone for inspection.
pub const SUPPORTED_CODINGS: &[&str] = &["gzip", "x-gzip", "deflate"];

/// Container nesting kept when a body is too deep to parse directly.
pub const PARSE_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported content encoding: {0}")]
    Unsupported(String),

    #[error("Failed to decode {coding} body: {source}")]
    Io {
        coding: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decoded body exceeds {0} bytes")]
    TooLarge(usize),
}

/// Undo every coding listed in `Content-Encoding`, last applied first.
pub fn decode_content<'a>(
    headers: &HeaderMap,
    body: &'a [u8],
    limit: usize,
) -> Result<Cow<'a, [u8]>, DecodeError> {
    let codings: Vec<String> = headers
        .get_all(header::CONTENT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty() && c != "identity")
        .collect();

    let mut decoded = Cow::Borrowed(body);
    for coding in codings.iter().rev() {
        decoded = Cow::Owned(decode_one(coding, &decoded, limit)?);
    }
    Ok(decoded)
}

fn decode_one(coding: &str, body: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let result = match coding {
        "gzip" | "x-gzip" => read_capped(GzDecoder::new(body), limit),
        // "deflate" is zlib-wrapped per RFC 9110, but raw streams are common.
        "deflate" => read_capped(ZlibDecoder::new(body), limit)
            .or_else(|_| read_capped(DeflateDecoder::new(body), limit)),
        other => return Err(DecodeError::Unsupported(other.to_string())),
    };

    let out = result.map_err(|source| DecodeError::Io {
        coding: coding.to_string(),
        source,
    })?;
    if out.len() > limit {
        return Err(DecodeError::TooLarge(limit));
    }
    Ok(out)
}

fn read_capped(reader: impl Read, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut out)?;
    Ok(out)
}

/// Parse a JSON document, truncating nesting past [`PARSE_DEPTH`] when the
/// document is too deep for the default parser. `None` when it is not JSON.
pub fn parse_json(body: &[u8]) -> Option<Value> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(_) => {
            let truncated = truncate_depth(body, PARSE_DEPTH)?;
            serde_json::from_slice(&truncated).ok()
        }
    }
}

/// Replace every container nested deeper than `limit` with `null`.
///
/// A single forward scan that tracks string state, so brackets inside string
/// literals are ignored. Returns `None` when nothing was deeper than `limit`.
pub fn truncate_depth(body: &[u8], limit: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut depth = 0usize;
    let mut skipping_at: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;
    let mut truncated = false;

    for &byte in body {
        let keep = skipping_at.is_none();

        if in_string {
            if keep {
                out.push(byte);
            }
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => {
                in_string = true;
                if keep {
                    out.push(byte);
                }
            }
            b'[' | b'{' => {
                depth += 1;
                if keep {
                    if depth > limit {
                        skipping_at = Some(depth);
                        truncated = true;
                        out.extend_from_slice(b"null");
                    } else {
                        out.push(byte);
                    }
                }
            }
            b']' | b'}' => {
                match skipping_at {
                    Some(level) if level == depth => skipping_at = None,
                    Some(_) => {}
                    None => out.push(byte),
                }
                depth = depth.saturating_sub(1);
            }
            _ => {
                if keep {
                    out.push(byte);
                }
            }
        }
    }

    truncated.then_some(out)
}
