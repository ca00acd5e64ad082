//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, limits)
//!     → request.rs (header snapshot, upstream URI)
//!     → forward to upstream, buffer response
//!     → response.rs (strip hop-by-hop, map failures)
//!     → Send to client, then hand exchange to the collector
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use response::ForwardError;
pub use server::HttpServer;
