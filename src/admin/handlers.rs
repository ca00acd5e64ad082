use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::admin::AdminState;
use crate::collector::QueueSnapshot;
use crate::storage::{
    Endpoint, EndpointId, FingerprintId, FingerprintRecord, RepositoryStats, Sample, StorageError,
};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub queue: QueueSnapshot,
}

#[derive(Serialize)]
pub struct FingerprintSamples {
    pub fingerprint: FingerprintRecord,
    pub samples: Vec<Sample>,
}

/// Admin handler failure.
#[derive(Debug)]
pub enum AdminError {
    NotFound(String),
    Storage(StorageError),
}

impl From<StorageError> for AdminError {
    fn from(e: StorageError) -> Self {
        AdminError::Storage(e)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AdminError::Storage(e) => {
                tracing::error!(error = %e, "Admin query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        queue: state.queue_stats.snapshot(),
    })
}

pub async fn get_stats(State(state): State<AdminState>) -> Result<Json<RepositoryStats>, AdminError> {
    Ok(Json(state.repository.stats().await?))
}

pub async fn get_endpoints(State(state): State<AdminState>) -> Result<Json<Vec<Endpoint>>, AdminError> {
    Ok(Json(state.repository.list_endpoints().await?))
}

pub async fn get_fingerprints(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<FingerprintRecord>>, AdminError> {
    Ok(Json(state.repository.list_fingerprints(EndpointId(id)).await?))
}

pub async fn get_samples(
    State(state): State<AdminState>,
    Path(id): Path<i64>,
) -> Result<Json<FingerprintSamples>, AdminError> {
    let id = FingerprintId(id);
    let fingerprint = state
        .repository
        .get_fingerprint(id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("fingerprint {id} not found")))?;
    let samples = state.repository.list_samples(id).await?;

    Ok(Json(FingerprintSamples { fingerprint, samples }))
}
