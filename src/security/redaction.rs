//! Sensitive data redaction.
//!
//! # Responsibilities
//! - Replace denylisted header values before anything is persisted
//! - Replace denylisted body fields at any depth, inside objects and arrays
//!
//! # Design Decisions
//! - Keys are compared case-insensitively; the original key spelling is kept
//! - The whole value is replaced, whatever its type
//! - Structure is otherwise untouched, so redacted samples keep their shape

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

/// Marker stored in place of every redacted value.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// Header names whose values are never stored.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "api-key",
    "access-token",
];

/// Body field names whose values are never stored.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "ssn",
    "credit_card",
    "api_key",
    "private_key",
];

/// Applies the header and field denylists.
#[derive(Debug, Clone)]
pub struct Redactor {
    headers: HashSet<String>,
    fields: HashSet<String>,
}

impl Redactor {
    /// Build a redactor from the built-in denylists plus extra entries.
    pub fn new<H, F>(extra_headers: H, extra_fields: F) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        let headers = SENSITIVE_HEADERS
            .iter()
            .map(|h| h.to_string())
            .chain(extra_headers.into_iter().map(|h| h.as_ref().to_ascii_lowercase()))
            .collect();
        let fields = SENSITIVE_FIELDS
            .iter()
            .map(|f| f.to_string())
            .chain(extra_fields.into_iter().map(|f| f.as_ref().to_lowercase()))
            .collect();

        Self { headers, fields }
    }

    /// Copy of `headers` with sensitive values replaced.
    pub fn redact_headers(&self, headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                if self.is_sensitive_header(name) {
                    (name.clone(), REDACTED_MARKER.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect()
    }

    /// Redact sensitive fields of `value` in place, recursively.
    pub fn redact_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if self.is_sensitive_field(key) {
                        *child = Value::String(REDACTED_MARKER.to_string());
                    } else {
                        self.redact_value(child);
                    }
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact_value(item);
                }
            }
            _ => {}
        }
    }

    pub fn is_sensitive_header(&self, name: &str) -> bool {
        self.headers.contains(&name.to_ascii_lowercase())
    }

    pub fn is_sensitive_field(&self, key: &str) -> bool {
        self.fields.contains(&key.to_lowercase())
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>(), std::iter::empty::<&str>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_redaction() {
        let redactor = Redactor::default();
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer xyz".to_string());
        headers.insert("X-API-Key".to_string(), "k".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());

        let redacted = redactor.redact_headers(&headers);
        assert_eq!(redacted["Authorization"], REDACTED_MARKER);
        assert_eq!(redacted["X-API-Key"], REDACTED_MARKER);
        assert_eq!(redacted["content-type"], "application/json");
    }

    #[test]
    fn test_body_redaction_is_recursive() {
        let redactor = Redactor::default();
        let mut body = json!({
            "user": "alice",
            "Password": "secret",
            "profile": {"ssn": "123-45-6789", "age": 30},
            "keys": [{"api_key": "abc", "label": "main"}],
            "token": {"nested": "object replaced wholesale"}
        });

        redactor.redact_value(&mut body);

        assert_eq!(
            body,
            json!({
                "user": "alice",
                "Password": REDACTED_MARKER,
                "profile": {"ssn": REDACTED_MARKER, "age": 30},
                "keys": [{"api_key": REDACTED_MARKER, "label": "main"}],
                "token": REDACTED_MARKER
            })
        );
    }

    #[test]
    fn test_extra_denylist_entries() {
        let redactor = Redactor::new(["X-Session"], ["PIN"]);
        assert!(redactor.is_sensitive_header("x-session"));
        assert!(redactor.is_sensitive_header("cookie"));
        assert!(redactor.is_sensitive_field("pin"));
        assert!(!redactor.is_sensitive_field("name"));
    }

    #[test]
    fn test_primitives_untouched() {
        let redactor = Redactor::default();
        let mut value = json!("password");
        redactor.redact_value(&mut value);
        assert_eq!(value, json!("password"));
    }
}
