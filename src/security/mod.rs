//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! captured request/response
//!     → redaction.rs (header denylist, recursive body field denylist)
//!     → observation queue (nothing unredacted crosses this line)
//! ```
//!
//! # Design Decisions
//! - Redaction is irreversible and happens before persistence, never after
//! - Body size limits are enforced by the proxy handler while buffering

pub mod redaction;

pub use redaction::{Redactor, REDACTED_MARKER};
