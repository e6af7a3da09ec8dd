//! Management HTTP API.
//!
//! All routes live under `/api/manage` except `/health`:
//! - `GET /admin/connector/indexing-status`: every connector with its last run
//! - `GET /credential`, `GET /admin/credential`: public / all credentials
//! - `POST /credential`, `DELETE /credential/:id`
//! - `POST /admin/connector`, `PATCH|DELETE /admin/connector/:id`
//! - `PUT /connector/:connector_id/credential/:credential_id`: link
//! - `POST /admin/connector/run-once`
//!
//! Errors are returned as `{"detail": "..."}`.

use crate::scheduler::IndexingScheduler;
use crate::store::{CatalogStore, StoreError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
    Router,
};
use connector_console::connectors::{
    Connector, ConnectorId, ConnectorPatch, IndexingStatus, NewConnector,
};
use connector_console::credentials::{Credential, CredentialId, NewCredential};
use connector_console::error::ValidationError;
use connector_console::source::{
    validate_connector_config, validate_credential_payload, validate_refresh_interval,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<CatalogStore>,
    pub scheduler: Arc<IndexingScheduler>,
}

#[derive(Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Deserialize)]
pub struct RunOnceRequest {
    pub connector_id: ConnectorId,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

fn ok() -> Json<SuccessResponse> {
    Json(SuccessResponse { success: true })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_indexing_statuses(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<IndexingStatus>>, AppError> {
    Ok(Json(state.scheduler.statuses()?))
}

async fn list_public_credentials(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Credential>>, AppError> {
    Ok(Json(state.store.list_credentials(true)?))
}

async fn list_all_credentials(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<Credential>>, AppError> {
    Ok(Json(state.store.list_credentials(false)?))
}

async fn create_credential(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<NewCredential>,
) -> Result<Json<Credential>, AppError> {
    validate_credential_payload(req.source, &req.payload)?;
    let credential = state.store.insert_credential(&req)?;
    info!(credential_id = credential.id, source = %credential.source, "Credential stored");
    Ok(Json(credential))
}

async fn delete_credential(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<CredentialId>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.store.delete_credential(id).map_err(|e| {
        warn!(credential_id = id, error = %e, "Credential delete refused");
        e
    })?;
    info!(credential_id = id, "Credential deleted");
    Ok(ok())
}

async fn create_connector(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<NewConnector>,
) -> Result<Json<Connector>, AppError> {
    validate_connector_config(req.source, &req.connector_specific_config)?;
    validate_refresh_interval(req.refresh_freq)?;
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("Connector name is required".to_string()));
    }
    let connector = state.store.insert_connector(&req)?;
    info!(connector_id = connector.id, name = %connector.name, "Connector created");
    Ok(Json(connector))
}

async fn delete_connector(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ConnectorId>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.store.delete_connector(id)?;
    state.scheduler.forget(id);
    info!(connector_id = id, "Connector deleted");
    Ok(ok())
}

async fn update_connector(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<ConnectorId>,
    Json(patch): Json<ConnectorPatch>,
) -> Result<Json<Connector>, AppError> {
    let connector = match patch.disabled {
        Some(disabled) => state.store.set_disabled(id, disabled)?,
        None => state
            .store
            .get_connector(id)?
            .ok_or_else(|| AppError::NotFound(format!("Connector {} not found", id)))?,
    };
    info!(connector_id = id, disabled = connector.disabled, "Connector updated");
    Ok(Json(connector))
}

async fn link_credential(
    State(state): State<Arc<ApiState>>,
    Path((connector_id, credential_id)): Path<(ConnectorId, CredentialId)>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.store.link(connector_id, credential_id).map_err(|e| {
        warn!(connector_id, credential_id, error = %e, "Link refused");
        e
    })?;
    info!(connector_id, credential_id, "Credential linked");
    Ok(ok())
}

async fn run_once(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RunOnceRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let connector = state
        .store
        .get_connector(req.connector_id)?
        .ok_or_else(|| AppError::NotFound(format!("Connector {} not found", req.connector_id)))?;

    if connector.source.requires_credential() && !connector.is_linked() {
        return Err(AppError::Conflict(
            "Connector has no linked credential".to_string(),
        ));
    }

    state.scheduler.request_run(&connector);
    Ok(ok())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Application error types
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => AppError::NotFound(e.to_string()),
            StoreError::CredentialInUse { .. } | StoreError::LinkConflict(_) => {
                AppError::Conflict(e.to_string())
            }
            StoreError::Database(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let manage = Router::new()
        .route(
            "/admin/connector/indexing-status",
            get(list_indexing_statuses),
        )
        .route(
            "/credential",
            get(list_public_credentials).post(create_credential),
        )
        .route("/admin/credential", get(list_all_credentials))
        .route("/credential/:id", delete(delete_credential))
        .route("/admin/connector", post(create_connector))
        .route("/admin/connector/run-once", post(run_once))
        .route(
            "/admin/connector/:id",
            delete(delete_connector).patch(update_connector),
        )
        .route(
            "/connector/:connector_id/credential/:credential_id",
            put(link_credential),
        );

    Router::new()
        .nest("/api/manage", manage)
        .route("/health", get(health))
        .layer(cors)
        .with_state(Arc::new(state))
}
