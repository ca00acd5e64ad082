//! Path normalization for endpoint identity.
//!
//! # Responsibilities
//! - Collapse concrete identifiers in a request path into placeholders
//! - Produce the `normalized_path` half of an endpoint's identity
//!
//! # Design Decisions
//! - Matching is per whole segment, so `/v2` or `/abc123` stay intact
//! - No regex: each segment is classified by a single linear scan
//! - Query strings never reach this function; callers pass `uri.path()`

/// Placeholder for an all-digit segment.
pub const ID_PLACEHOLDER: &str = ":id";
/// Placeholder for a canonical 8-4-4-4-12 UUID segment.
pub const UUID_PLACEHOLDER: &str = ":uuid";
/// Placeholder for a 24 hex digit (Mongo ObjectId) segment.
pub const OBJECT_ID_PLACEHOLDER: &str = ":objectId";

/// Replace identifier-like path segments with placeholders.
///
/// `/api/users/123` becomes `/api/users/:id`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_segment(segment: &str) -> &str {
    if segment.is_empty() {
        segment
    } else if segment.bytes().all(|b| b.is_ascii_digit()) {
        ID_PLACEHOLDER
    } else if is_uuid(segment) {
        UUID_PLACEHOLDER
    } else if segment.len() == 24 && segment.bytes().all(|b| b.is_ascii_hexdigit()) {
        OBJECT_ID_PLACEHOLDER
    } else {
        segment
    }
}

fn is_uuid(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => *b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids() {
        assert_eq!(normalize_path("/users/1"), "/users/:id");
        assert_eq!(normalize_path("/api/users/123/orders/456"), "/api/users/:id/orders/:id");
    }

    #[test]
    fn test_uuid_segments() {
        assert_eq!(
            normalize_path("/orders/550e8400-e29b-41d4-a716-446655440000"),
            "/orders/:uuid"
        );
        assert_eq!(
            normalize_path("/orders/550E8400-E29B-41D4-A716-446655440000/items"),
            "/orders/:uuid/items"
        );
    }

    #[test]
    fn test_object_id_segments() {
        assert_eq!(normalize_path("/posts/507f1f77bcf86cd799439011"), "/posts/:objectId");
    }

    #[test]
    fn test_untouched_segments() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/api/v2/users"), "/api/v2/users");
        assert_eq!(normalize_path("/files/abc123"), "/files/abc123");
        assert_eq!(normalize_path("/users/1/"), "/users/:id/");
    }
}
