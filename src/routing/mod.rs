//! Endpoint identity subsystem.
//!
//! # Data Flow
//! ```text
//! request URI path
//!     → normalize.rs (identifier segments → placeholders)
//!     → (method, normalized_path) endpoint key
//! ```

pub mod normalize;

pub use normalize::normalize_path;
