//! Shape sampler library: a transparent HTTP proxy that records one
//! deduplicated, redacted sample set per response shape.

pub mod admin;
pub mod collector;
pub mod config;
pub mod fingerprint;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;
pub mod storage;

pub use collector::{Observation, ProcessOutcome, RetentionCoordinator};
pub use config::SamplerConfig;
pub use fingerprint::{fingerprint, FingerprintResult};
pub use http::HttpServer;
pub use lifecycle::{Sampler, Shutdown};
pub use storage::Repository;
