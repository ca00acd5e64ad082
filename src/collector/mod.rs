//! Observation collection subsystem.
//!
//! # Data Flow
//! ```text
//! proxy handler (after the client response is built)
//!     → interceptor.rs (decode.rs, JSON filter, fingerprint, redaction, path normalization)
//!     → queue.rs (bounded mpsc, try_send, drops counted)
//!     → worker.rs (timeout per observation, logging, metrics)
//!     → coordinator.rs (dedup + sample cap against the Repository)
//! ```
//!
//! # Design Decisions
//! - Nothing in this pipeline can delay or fail a client response
//! - The coordinator is the only component that mutates storage
//! - Failures are isolated per observation and never retried

pub mod coordinator;
pub mod decode;
pub mod interceptor;
pub mod queue;
pub mod types;
pub mod worker;

pub use coordinator::RetentionCoordinator;
pub use interceptor::{CapturedExchange, Interceptor};
pub use queue::{ObservationQueue, QueueSnapshot, QueueStats, SubmitError};
pub use types::*;
pub use worker::ObservationWorker;
