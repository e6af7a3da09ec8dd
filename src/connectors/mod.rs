//! Configured connectors and their indexing status.
//!
//! A connector is a data-ingestion job for one source. It is created
//! unlinked and becomes indexable once bound to a credential of the same
//! source. The backend's scheduler runs it on its refresh interval and
//! reports the outcome as an [`IndexingStatus`].

use crate::credentials::CredentialId;
use crate::source::{InputType, SourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod manager;

pub use manager::ConnectorManager;

/// Backend-assigned connector identifier.
pub type ConnectorId = i64;

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// A configured connector as reported by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub name: String,
    pub source: SourceType,
    pub input_type: InputType,

    /// Source-specific config object.
    #[serde(rename = "connector_specific_config", default = "empty_config")]
    pub specific_config: serde_json::Value,

    /// Re-indexing cadence in seconds. `None` for fixed-input sources.
    #[serde(rename = "refresh_freq", default)]
    pub refresh_interval: Option<u64>,

    /// Linked credentials. Holds at most one entry.
    #[serde(default)]
    pub credential_ids: Vec<CredentialId>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(rename = "time_created")]
    pub created_at: DateTime<Utc>,
}

impl Connector {
    /// The credential this connector authenticates with, if linked.
    pub fn linked_credential(&self) -> Option<CredentialId> {
        self.credential_ids.first().copied()
    }

    pub fn is_linked(&self) -> bool {
        !self.credential_ids.is_empty()
    }

    pub fn references(&self, credential_id: CredentialId) -> bool {
        self.credential_ids.contains(&credential_id)
    }
}

/// Outcome of the most recent indexing run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingState {
    #[default]
    NotStarted,
    InProgress,
    Success,
    Failed,
}

impl IndexingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexingState::NotStarted => "not_started",
            IndexingState::InProgress => "in_progress",
            IndexingState::Success => "success",
            IndexingState::Failed => "failed",
        }
    }
}

/// Indexing status of one connector. Read-only, produced by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexingStatus {
    pub connector: Connector,
    #[serde(default)]
    pub last_status: IndexingState,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub docs_indexed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl IndexingStatus {
    /// Status of a connector that has never run.
    pub fn not_started(connector: Connector) -> Self {
        Self {
            connector,
            last_status: IndexingState::NotStarted,
            last_run_at: None,
            docs_indexed: 0,
            error_msg: None,
        }
    }
}

/// Request body for `POST /admin/connector`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewConnector {
    pub name: String,
    pub source: SourceType,
    pub input_type: InputType,
    pub connector_specific_config: serde_json::Value,
    pub refresh_freq: Option<u64>,
    pub disabled: bool,
}

/// Request body for `PATCH /admin/connector/{id}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConnectorPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}
