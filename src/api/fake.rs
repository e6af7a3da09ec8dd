//! In-process backend double for unit tests.
//!
//! Mirrors the reference backend's rules (delete guard, link conflicts) and
//! records every call so tests can assert that no request was issued.

use super::{ApiError, BackendApi};
use crate::connectors::{
    Connector, ConnectorId, ConnectorPatch, IndexingState, IndexingStatus, NewConnector,
};
use crate::credentials::{Credential, CredentialId, NewCredential};
use crate::source::SourceType;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    next_id: i64,
    credentials: Vec<Credential>,
    statuses: Vec<IndexingStatus>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, ApiError>,
    list_delay: Option<Duration>,
}

impl FakeState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

fn status(code: u16, detail: &str) -> ApiError {
    ApiError::Status {
        status: code,
        detail: detail.to_string(),
    }
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Number of calls made to `op` (e.g. `"delete_credential"`).
    pub(crate) fn calls(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    /// Makes the next call to `op` fail with `error`.
    pub(crate) fn fail_next(&self, op: &'static str, error: ApiError) {
        self.state.lock().unwrap().failures.insert(op, error);
    }

    /// Slows down both list endpoints. The list is read when the request
    /// arrives, before the delay, so a slow response can be stale.
    pub(crate) fn set_list_delay(&self, delay: Duration) {
        self.state.lock().unwrap().list_delay = Some(delay);
    }

    pub(crate) fn seed_credential(&self, source: SourceType, pairs: &[(&str, &str)]) -> CredentialId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.credentials.push(Credential {
            id,
            source,
            payload: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            admin_public: true,
            created_at: Utc::now(),
        });
        id
    }

    pub(crate) fn seed_connector(
        &self,
        source: SourceType,
        credential: Option<CredentialId>,
    ) -> ConnectorId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let schema = source.schema();
        state.statuses.push(IndexingStatus::not_started(Connector {
            id,
            name: schema.connector_name.to_string(),
            source,
            input_type: schema.input_type,
            specific_config: serde_json::json!({}),
            refresh_interval: schema.default_refresh_secs,
            credential_ids: credential.into_iter().collect(),
            disabled: false,
            created_at: Utc::now(),
        }));
        id
    }

    pub(crate) fn set_indexing_state(&self, connector_id: ConnectorId, last_status: IndexingState) {
        let mut state = self.state.lock().unwrap();
        if let Some(s) = state
            .statuses
            .iter_mut()
            .find(|s| s.connector.id == connector_id)
        {
            s.last_status = last_status;
            s.last_run_at = Some(Utc::now());
        }
    }

    /// Records the call and returns the injected failure, if any.
    fn enter(&self, op: &'static str) -> Result<Option<Duration>, ApiError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.remove(op) {
            Some(error) => Err(error),
            None => Ok(state.list_delay),
        }
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn list_credentials(&self) -> Result<Vec<Credential>, ApiError> {
        let delay = self.enter("list_credentials")?;
        let credentials = self.state.lock().unwrap().credentials.clone();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(credentials)
    }

    async fn create_credential(&self, request: &NewCredential) -> Result<Credential, ApiError> {
        self.enter("create_credential")?;
        let mut state = self.state.lock().unwrap();
        let credential = Credential {
            id: state.next_id(),
            source: request.source,
            payload: request.payload.clone(),
            admin_public: request.admin_public,
            created_at: Utc::now(),
        };
        state.credentials.push(credential.clone());
        Ok(credential)
    }

    async fn delete_credential(&self, id: CredentialId) -> Result<(), ApiError> {
        self.enter("delete_credential")?;
        let mut state = self.state.lock().unwrap();
        if state.statuses.iter().any(|s| s.connector.references(id)) {
            return Err(status(409, "Credential is still linked to a connector"));
        }
        let before = state.credentials.len();
        state.credentials.retain(|c| c.id != id);
        if state.credentials.len() == before {
            return Err(status(404, "Credential not found"));
        }
        Ok(())
    }

    async fn list_indexing_statuses(&self) -> Result<Vec<IndexingStatus>, ApiError> {
        let delay = self.enter("list_indexing_statuses")?;
        let statuses = self.state.lock().unwrap().statuses.clone();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(statuses)
    }

    async fn create_connector(&self, request: &NewConnector) -> Result<Connector, ApiError> {
        self.enter("create_connector")?;
        let mut state = self.state.lock().unwrap();
        let connector = Connector {
            id: state.next_id(),
            name: request.name.clone(),
            source: request.source,
            input_type: request.input_type,
            specific_config: request.connector_specific_config.clone(),
            refresh_interval: request.refresh_freq,
            credential_ids: Vec::new(),
            disabled: request.disabled,
            created_at: Utc::now(),
        };
        state
            .statuses
            .push(IndexingStatus::not_started(connector.clone()));
        Ok(connector)
    }

    async fn delete_connector(&self, id: ConnectorId) -> Result<(), ApiError> {
        self.enter("delete_connector")?;
        let mut state = self.state.lock().unwrap();
        let before = state.statuses.len();
        state.statuses.retain(|s| s.connector.id != id);
        if state.statuses.len() == before {
            return Err(status(404, "Connector not found"));
        }
        Ok(())
    }

    async fn update_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
    ) -> Result<Connector, ApiError> {
        self.enter("update_connector")?;
        let mut state = self.state.lock().unwrap();
        let entry = state
            .statuses
            .iter_mut()
            .find(|s| s.connector.id == id)
            .ok_or_else(|| status(404, "Connector not found"))?;
        if let Some(disabled) = patch.disabled {
            entry.connector.disabled = disabled;
        }
        Ok(entry.connector.clone())
    }

    async fn link_credential(
        &self,
        connector_id: ConnectorId,
        credential_id: CredentialId,
    ) -> Result<(), ApiError> {
        self.enter("link_credential")?;
        let mut state = self.state.lock().unwrap();
        let credential_source = state
            .credentials
            .iter()
            .find(|c| c.id == credential_id)
            .map(|c| c.source)
            .ok_or_else(|| status(404, "Credential not found"))?;
        let entry = state
            .statuses
            .iter_mut()
            .find(|s| s.connector.id == connector_id)
            .ok_or_else(|| status(404, "Connector not found"))?;

        if entry.connector.source != credential_source {
            return Err(status(409, "Credential source does not match connector"));
        }
        match entry.connector.linked_credential() {
            Some(existing) if existing == credential_id => Ok(()),
            Some(_) => Err(status(409, "Connector is linked to another credential")),
            None => {
                entry.connector.credential_ids.push(credential_id);
                Ok(())
            }
        }
    }

    async fn run_once(&self, connector_id: ConnectorId) -> Result<(), ApiError> {
        self.enter("run_once")?;
        let mut state = self.state.lock().unwrap();
        let entry = state
            .statuses
            .iter_mut()
            .find(|s| s.connector.id == connector_id)
            .ok_or_else(|| status(404, "Connector not found"))?;
        if entry.connector.source.requires_credential() && !entry.connector.is_linked() {
            return Err(status(409, "Connector has no linked credential"));
        }
        entry.last_status = IndexingState::InProgress;
        Ok(())
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.enter("health")?;
        Ok(())
    }
}
