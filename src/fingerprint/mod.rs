//! Structural fingerprinting subsystem.
//!
//! # Data Flow
//! ```text
//! decoded JSON response body
//!     → structure.rs (type-and-key signature, values erased)
//!     → SHA-256 over the signature, hex encoded
//!     → FingerprintResult { hash, signature, elapsed }
//! ```
//!
//! # Design Decisions
//! - Pure and synchronous: no I/O, no shared state, safe to call from any task
//! - Object keys are sorted so key order never changes the shape
//! - Arrays are assumed homogeneous; only the first element is inspected
//! - Recursion is capped and replaced by a sentinel past the cap
//! - Elapsed time is measured and returned; the caller decides what is slow

pub mod structure;

use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};

pub use structure::{structure_signature, MAX_DEPTH, MAX_DEPTH_SENTINEL};

/// Expected upper bound for fingerprinting a typical API payload.
pub const DEFAULT_BUDGET: Duration = Duration::from_millis(2);

/// Output of fingerprinting one JSON value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintResult {
    /// Lowercase hex SHA-256 of `signature`.
    pub hash: String,
    /// Canonical structural signature, e.g. `{id:number,tags:[string]}`.
    pub signature: String,
    /// Wall time spent computing the signature and hash.
    pub elapsed: Duration,
}

impl FingerprintResult {
    /// True when computing this fingerprint took longer than `budget`.
    pub fn exceeds(&self, budget: Duration) -> bool {
        self.elapsed > budget
    }
}

/// Fingerprint a decoded JSON value.
pub fn fingerprint(value: &Value) -> FingerprintResult {
    let start = Instant::now();
    let signature = structure_signature(value);
    let hash = hash_signature(&signature);

    FingerprintResult {
        hash,
        signature,
        elapsed: start.elapsed(),
    }
}

/// Hash a structural signature. Stable across processes and machines.
pub fn hash_signature(signature: &str) -> String {
    hex::encode(Sha256::digest(signature.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deterministic_hash() {
        let value = json!({"id": 1, "name": "x", "tags": ["a"]});
        let a = fingerprint(&value);
        let b = fingerprint(&value);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.hash.len(), 64);
        assert!(a.hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hash_matches_signature_digest() {
        let result = fingerprint(&json!({"a": 1}));
        assert_eq!(result.signature, "{a:number}");
        assert_eq!(result.hash, hash_signature("{a:number}"));
    }

    #[test]
    fn test_order_independence() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(fingerprint(&a).signature, fingerprint(&b).signature);
        assert_eq!(fingerprint(&a).hash, fingerprint(&b).hash);
    }

    #[test]
    fn test_value_independence_and_type_sensitivity() {
        let a = fingerprint(&json!({"id": 1, "name": "x"}));
        let b = fingerprint(&json!({"id": 2, "name": "y"}));
        let c = fingerprint(&json!({"id": "1", "name": "x"}));

        assert_eq!(a.hash, b.hash);
        assert_eq!(a.signature, b.signature);
        assert_ne!(a.hash, c.hash);
        assert_ne!(a.signature, c.signature);
    }

    #[test]
    fn test_budget_check() {
        let mut result = fingerprint(&json!([]));
        result.elapsed = Duration::from_millis(5);
        assert!(result.exceeds(DEFAULT_BUDGET));
        result.elapsed = Duration::from_micros(10);
        assert!(!result.exceeds(DEFAULT_BUDGET));
    }
}
