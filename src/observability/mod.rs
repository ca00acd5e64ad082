//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! proxy handler, interceptor, queue, worker
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters and histograms via the metrics facade)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through logs as a structured field
//! - Metric calls are no-ops until an exporter is installed
//! - The retention core itself emits nothing; its callers report outcomes

pub mod logging;
pub mod metrics;
