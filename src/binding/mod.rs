//! Binding coordinator: links connectors to credentials and derives the
//! per-source view from the two cached collections.
//!
//! # View derivation
//!
//! ```text
//!  credentials snapshot ──┐
//!                         ├─> derive_view(source) ─> ViewState
//!  statuses snapshot ─────┘
//!
//!  no live credential                     -> Unconfigured
//!  live credential, 0 connectors          -> CredentialOnly
//!  live credential, >=1 connectors        -> Bound (one row per connector)
//! ```
//!
//! The view is a pure function of the snapshots and is recomputed on every
//! swap; the coordinator never synchronizes the two caches. A connector that
//! was created but never linked still shows up as a row, flagged unlinked.
//!
//! # Connector lifecycle
//!
//! `Created (unlinked) -> Linked -> [indexing runs] -> Deleted`. There is no
//! unlink; only deletion removes a connector from a credential's
//! reverse-reference set.

use crate::api::{ApiError, BackendApi};
use crate::cache::{CacheKey, ResourceCache, Snapshot};
use crate::connectors::{Connector, ConnectorId, ConnectorManager, IndexingStatus};
use crate::credentials::{Credential, CredentialId, CredentialManager};
use crate::error::{ConsoleError, ValidationError};
use crate::source::SourceType;
use futures::stream::Stream;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// How a connector row relates to the source's live credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// Created but never linked, or linking failed.
    Unlinked,
    /// Linked to the live credential shown in the view.
    Live,
    /// Linked to another credential of the same source.
    Other(CredentialId),
}

/// One connector as rendered in the view.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectorRow {
    pub status: IndexingStatus,
    pub link: LinkState,
}

/// What the admin page renders for one source.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewState {
    /// At least one collection has not been fetched yet.
    Loading,
    LoadFailed { resource: CacheKey, message: String },
    /// No live credential for the source.
    Unconfigured,
    /// Credential present, no connector yet.
    ///
    /// `credential` is `None` only for sources that need no credential.
    CredentialOnly { credential: Option<Credential> },
    /// Credential present and at least one connector exists.
    Bound {
        credential: Option<Credential>,
        connectors: Vec<ConnectorRow>,
    },
}

impl ViewState {
    pub fn connectors(&self) -> &[ConnectorRow] {
        match self {
            ViewState::Bound { connectors, .. } => connectors,
            _ => &[],
        }
    }
}

/// First credential usable as the live credential for `source`.
pub fn live_credential(source: SourceType, credentials: &[Credential]) -> Option<&Credential> {
    credentials.iter().find(|c| c.is_live_for(source))
}

/// Classifies fully-loaded collections for `source`.
pub fn classify(
    source: SourceType,
    credentials: &[Credential],
    statuses: &[IndexingStatus],
) -> ViewState {
    let credential = if source.requires_credential() {
        match live_credential(source, credentials) {
            Some(c) => Some(c.clone()),
            None => return ViewState::Unconfigured,
        }
    } else {
        None
    };

    let live_id = credential.as_ref().map(|c| c.id);
    let connectors: Vec<ConnectorRow> = statuses
        .iter()
        .filter(|s| s.connector.source == source)
        .map(|s| {
            let link = match s.connector.linked_credential() {
                None => LinkState::Unlinked,
                Some(id) if Some(id) == live_id => LinkState::Live,
                Some(id) => LinkState::Other(id),
            };
            ConnectorRow {
                status: s.clone(),
                link,
            }
        })
        .collect();

    if connectors.is_empty() {
        ViewState::CredentialOnly { credential }
    } else {
        ViewState::Bound {
            credential,
            connectors,
        }
    }
}

/// Derives the view from both snapshots.
///
/// Loading wins over failure; a connector failure is reported before a
/// credential failure.
pub fn derive_view(
    source: SourceType,
    credentials: &Snapshot<Credential>,
    statuses: &Snapshot<IndexingStatus>,
) -> ViewState {
    match (credentials, statuses) {
        (Snapshot::Loading, _) | (_, Snapshot::Loading) => ViewState::Loading,
        (_, Snapshot::Failed(message)) => ViewState::LoadFailed {
            resource: CacheKey::IndexingStatuses,
            message: message.clone(),
        },
        (Snapshot::Failed(message), _) => ViewState::LoadFailed {
            resource: CacheKey::Credentials,
            message: message.clone(),
        },
        (Snapshot::Ready(credentials), Snapshot::Ready(statuses)) => {
            classify(source, credentials, statuses)
        }
    }
}

/// Coordinates credential and connector mutations against the shared cache.
#[derive(Clone)]
pub struct BindingCoordinator {
    backend: Arc<dyn BackendApi>,
    cache: Arc<ResourceCache>,
    credentials: CredentialManager,
    connectors: ConnectorManager,
}

impl BindingCoordinator {
    pub fn new(backend: Arc<dyn BackendApi>, cache: Arc<ResourceCache>) -> Self {
        Self {
            credentials: CredentialManager::new(Arc::clone(&backend), Arc::clone(&cache)),
            connectors: ConnectorManager::new(Arc::clone(&backend), Arc::clone(&cache)),
            backend,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn connectors(&self) -> &ConnectorManager {
        &self.connectors
    }

    /// View from the current snapshots, without fetching.
    pub fn current_view(&self, source: SourceType) -> ViewState {
        derive_view(
            source,
            &self.cache.credentials().snapshot(),
            &self.cache.indexing_statuses().snapshot(),
        )
    }

    /// View after a read-through fetch of both collections.
    pub async fn view(&self, source: SourceType) -> ViewState {
        let (credentials, statuses) = self.cache.fetch_all().await;
        derive_view(source, &credentials, &statuses)
    }

    /// Signals every snapshot swap; re-derive the view on each item.
    pub fn changes(&self) -> impl Stream<Item = CacheKey> + Send + Unpin + 'static {
        self.cache.changes()
    }

    /// Links a connector to a credential.
    ///
    /// Idempotent: if the cached statuses already show the pair linked, no
    /// request is issued. Linking a connector that is bound to a different
    /// credential is rejected locally; a connector has at most one link and
    /// there is no unlink.
    pub async fn link_credential(
        &self,
        connector_id: ConnectorId,
        credential_id: CredentialId,
    ) -> Result<(), ConsoleError> {
        let statuses = self.cache.indexing_statuses().fetch().await;
        let cached_connector = statuses
            .data()
            .and_then(|all| all.iter().find(|s| s.connector.id == connector_id))
            .map(|s| &s.connector);

        if let Some(connector) = cached_connector {
            match connector.linked_credential() {
                Some(existing) if existing == credential_id => {
                    debug!(connector_id, credential_id, "Already linked, nothing to do");
                    return Ok(());
                }
                Some(existing) => {
                    return Err(ValidationError::AlreadyLinked {
                        connector_id,
                        linked_to: existing,
                    }
                    .into());
                }
                None => {}
            }

            let credentials = self.cache.credentials().fetch().await;
            if let Some(credential) = credentials
                .data()
                .and_then(|all| all.iter().find(|c| c.id == credential_id))
            {
                if credential.source != connector.source {
                    return Err(ValidationError::SourceMismatch {
                        connector: connector.source,
                        credential: credential.source,
                    }
                    .into());
                }
            }
        }

        self.link_unchecked(connector_id, credential_id)
            .await
            .map_err(ConsoleError::Mutation)
    }

    async fn link_unchecked(
        &self,
        connector_id: ConnectorId,
        credential_id: CredentialId,
    ) -> Result<(), ApiError> {
        self.backend
            .link_credential(connector_id, credential_id)
            .await
            .map_err(|e| {
                warn!(connector_id, credential_id, error = %e, "Failed to link credential");
                e
            })?;

        info!(connector_id, credential_id, "Credential linked");
        self.cache.invalidate(CacheKey::IndexingStatuses).await;
        Ok(())
    }

    /// Deletes a credential only if no connector depends on it.
    ///
    /// The decision uses the most recently fetched status collection. A
    /// connector of the credential's source, or any connector referencing
    /// the id, blocks the delete with no request issued. A stale read can
    /// still let a delete through that the backend then rejects; that comes
    /// back as an ordinary [`ConsoleError::Mutation`].
    pub async fn guarded_delete_credential(
        &self,
        credential_id: CredentialId,
    ) -> Result<(), ConsoleError> {
        let (credentials, statuses) = self.cache.fetch_all().await;
        let statuses = statuses.into_result(CacheKey::IndexingStatuses)?;
        let credentials = credentials.into_result(CacheKey::Credentials)?;

        let credential = credentials
            .iter()
            .find(|c| c.id == credential_id)
            .ok_or(ValidationError::UnknownCredential(credential_id))?;

        let dependents = statuses
            .iter()
            .filter(|s| {
                s.connector.source == credential.source || s.connector.references(credential_id)
            })
            .count();

        if dependents > 0 {
            warn!(
                credential_id,
                source = %credential.source,
                dependents,
                "Refusing to delete credential with dependent connectors"
            );
            return Err(ValidationError::CredentialInUse {
                credential_id,
                connectors: dependents,
            }
            .into());
        }

        self.credentials.delete_credential(credential_id).await.map_err(|e| {
            if let ConsoleError::Mutation(api) = &e {
                if api.is_conflict() {
                    info!(credential_id, "Backend reported dependents the cache had not seen yet");
                }
            }
            e
        })
    }

    /// Creates a connector and links it to `credential_id`.
    ///
    /// Two sequential steps, not a transaction. If linking fails after the
    /// connector was created, the connector stays in place unlinked and the
    /// error is [`ConsoleError::PartialSequence`]; retry with
    /// [`BindingCoordinator::link_credential`].
    pub async fn create_and_link_connector(
        &self,
        source: SourceType,
        specific_config: serde_json::Value,
        refresh_interval: Option<u64>,
        credential_id: CredentialId,
    ) -> Result<Connector, ConsoleError> {
        if !source.requires_credential() {
            return Err(ValidationError::NoCredentialRequired(source).into());
        }

        let credentials = self
            .cache
            .credentials()
            .fetch()
            .await
            .into_result(CacheKey::Credentials)?;
        let credential = credentials
            .iter()
            .find(|c| c.id == credential_id)
            .ok_or(ValidationError::UnknownCredential(credential_id))?;
        if credential.source != source {
            return Err(ValidationError::SourceMismatch {
                connector: source,
                credential: credential.source,
            }
            .into());
        }

        let (mut connector, _) = self
            .connectors
            .create_connector(source, specific_config, refresh_interval)
            .await?;

        if let Err(e) = self.link_unchecked(connector.id, credential_id).await {
            warn!(
                connector_id = connector.id,
                credential_id,
                "Connector left unlinked after failed link"
            );
            return Err(ConsoleError::PartialSequence {
                connector: Box::new(connector),
                source: e,
            });
        }

        connector.credential_ids = vec![credential_id];
        Ok(connector)
    }
}
