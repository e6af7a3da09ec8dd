//! Backend REST surface consumed by the console.
//!
//! [`BackendApi`] is the seam between the lifecycle managers and the
//! network. [`HttpBackend`] talks to a real backend over reqwest; tests plug
//! in an in-process double that records every call, which is how "no
//! request was issued" is asserted.

mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::{CredentialScope, HttpBackend};

use crate::connectors::{Connector, ConnectorId, ConnectorPatch, IndexingStatus, NewConnector};
use crate::credentials::{Credential, CredentialId, NewCredential};
use async_trait::async_trait;
use std::fmt;

/// Failure talking to the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Request never produced a response (connection refused, DNS, ...).
    Transport(String),
    /// Backend answered with a non-2xx status.
    Status { status: u16, detail: String },
    /// Response body did not match the expected shape.
    Decode(String),
}

impl ApiError {
    /// Backend refused the mutation because of a referential conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Status { status: 409, .. })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(msg) => write!(f, "request failed: {}", msg),
            ApiError::Status { status, detail } => {
                write!(f, "backend returned {}: {}", status, detail)
            }
            ApiError::Decode(msg) => write!(f, "unexpected response: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// Operations the backend exposes to the admin console.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `GET /credential` (or the admin variant).
    async fn list_credentials(&self) -> Result<Vec<Credential>, ApiError>;

    /// `POST /credential`.
    async fn create_credential(&self, request: &NewCredential) -> Result<Credential, ApiError>;

    /// `DELETE /credential/{id}`. Rejected with 409 while connectors reference it.
    async fn delete_credential(&self, id: CredentialId) -> Result<(), ApiError>;

    /// `GET /admin/connector/indexing-status`.
    async fn list_indexing_statuses(&self) -> Result<Vec<IndexingStatus>, ApiError>;

    /// `POST /admin/connector`.
    async fn create_connector(&self, request: &NewConnector) -> Result<Connector, ApiError>;

    /// `DELETE /admin/connector/{id}`.
    async fn delete_connector(&self, id: ConnectorId) -> Result<(), ApiError>;

    /// `PATCH /admin/connector/{id}`.
    async fn update_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
    ) -> Result<Connector, ApiError>;

    /// `PUT /connector/{connector_id}/credential/{credential_id}`.
    async fn link_credential(
        &self,
        connector_id: ConnectorId,
        credential_id: CredentialId,
    ) -> Result<(), ApiError>;

    /// `POST /admin/connector/run-once`.
    async fn run_once(&self, connector_id: ConnectorId) -> Result<(), ApiError>;

    /// `GET /health`.
    async fn health(&self) -> Result<(), ApiError>;
}
