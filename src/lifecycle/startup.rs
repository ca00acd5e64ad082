//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configured repository
//! - Build the queue, worker, proxy and optional admin server
//! - Run them until shutdown and wait for the worker to drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The repository can be injected, which is how tests observe storage

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::task::TaskTracker;

use crate::admin::{setup_admin_router, AdminState};
use crate::collector::{ObservationQueue, ObservationWorker, RetentionCoordinator};
use crate::config::{SamplerConfig, StorageBackend};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::storage::{MemoryRepository, Repository, SqliteRepository, StorageError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid upstream URL: {0}")]
    Upstream(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully wired sampler, ready to serve.
pub struct Sampler {
    config: SamplerConfig,
    repository: Arc<dyn Repository>,
}

impl Sampler {
    /// Open the repository named by `config.storage`.
    pub fn from_config(config: SamplerConfig) -> Result<Self, StartupError> {
        let repository: Arc<dyn Repository> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryRepository::new()),
            StorageBackend::Sqlite => Arc::new(SqliteRepository::open(&config.storage.path)?),
        };
        tracing::info!(backend = ?config.storage.backend, "Storage ready");
        Ok(Self::with_repository(config, repository))
    }

    pub fn with_repository(config: SamplerConfig, repository: Arc<dyn Repository>) -> Self {
        Self { config, repository }
    }

    /// Serve on `listener` until `shutdown` fires, then drain the queue.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), StartupError> {
        let (queue, rx) = ObservationQueue::new(self.config.collector.queue_capacity);

        let coordinator = Arc::new(RetentionCoordinator::new(
            self.repository.clone(),
            self.config.collector.retention_policy(),
        ));
        let worker = ObservationWorker::new(
            coordinator,
            queue.stats(),
            self.config.collector.process_timeout(),
        );

        // Stopped only after the proxy and every inspection task have finished,
        // so late captures still reach the queue.
        let worker_shutdown = Shutdown::new();
        let worker_handle = tokio::spawn(worker.run(rx, worker_shutdown.subscribe()));

        let admin_handle = if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let state = AdminState {
                repository: self.repository.clone(),
                queue_stats: queue.stats(),
                api_key: Arc::from(self.config.admin.api_key.as_str()),
            };
            let app = setup_admin_router(state);
            let mut signal = shutdown.subscribe();
            tracing::info!(address = %admin_listener.local_addr()?, "Admin API starting");
            Some(tokio::spawn(async move {
                axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move { signal.recv().await })
                    .await
            }))
        } else {
            None
        };

        tracing::info!(
            upstream = %self.config.upstream.url,
            max_samples_per_fingerprint = self.config.collector.max_samples_per_fingerprint,
            replacement = ?self.config.collector.replacement,
            "Sampler starting"
        );

        let inspections = TaskTracker::new();
        let server = HttpServer::new(&self.config, queue, inspections.clone())?;
        let served = server.run(listener, shutdown.subscribe()).await;

        inspections.close();
        inspections.wait().await;
        worker_shutdown.trigger();
        if let Err(e) = worker_handle.await {
            tracing::error!(error = %e, "Observation worker panicked");
        }

        if let Some(handle) = admin_handle {
            match handle.await {
                Ok(Err(e)) => tracing::error!(error = %e, "Admin API failed"),
                Err(e) => tracing::error!(error = %e, "Admin API task panicked"),
                Ok(Ok(())) => {}
            }
        }

        served?;
        Ok(())
    }
}
