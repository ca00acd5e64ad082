//! Read-only admin API over the repository.
//!
//! Served on its own listener and guarded by a Bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::collector::QueueStats;
use crate::storage::Repository;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub repository: Arc<dyn Repository>,
    pub queue_stats: Arc<QueueStats>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/stats", get(get_stats))
        .route("/admin/endpoints", get(get_endpoints))
        .route("/admin/endpoints/{id}/fingerprints", get(get_fingerprints))
        .route("/admin/fingerprints/{id}/samples", get(get_samples))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
