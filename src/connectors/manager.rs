//! Connector lifecycle: create, pause/resume, run once, delete.
//!
//! Every successful mutation refetches the indexing-status collection so
//! the derived view reflects it. Linking a connector to a credential is not
//! done here; see [`crate::binding::BindingCoordinator`].

use super::{Connector, ConnectorId, ConnectorPatch, IndexingStatus, NewConnector};
use crate::api::BackendApi;
use crate::cache::{CacheKey, ResourceCache};
use crate::error::ConsoleError;
use crate::source::{validate_connector_config, validate_refresh_interval, SourceType};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct ConnectorManager {
    backend: Arc<dyn BackendApi>,
    cache: Arc<ResourceCache>,
}

impl ConnectorManager {
    pub fn new(backend: Arc<dyn BackendApi>, cache: Arc<ResourceCache>) -> Self {
        Self { backend, cache }
    }

    /// Creates an unlinked connector for `source`.
    ///
    /// The connector name is derived from the source. `refresh_interval`
    /// overrides the source's default cadence; it is ignored for sources
    /// without a default cadence (file uploads), which never get a schedule.
    /// Web crawls load a fixed input set but are re-crawled daily.
    ///
    /// # Returns
    /// The created connector and its initial `not_started` status.
    pub async fn create_connector(
        &self,
        source: SourceType,
        specific_config: serde_json::Value,
        refresh_interval: Option<u64>,
    ) -> Result<(Connector, IndexingStatus), ConsoleError> {
        validate_connector_config(source, &specific_config)?;
        validate_refresh_interval(refresh_interval)?;

        let schema = source.schema();
        let refresh_freq = schema
            .default_refresh_secs
            .map(|default| refresh_interval.unwrap_or(default));

        let name = match specific_config.as_object() {
            Some(config) => source.connector_name(config),
            None => schema.connector_name.to_string(),
        };

        let request = NewConnector {
            name,
            source,
            input_type: schema.input_type,
            connector_specific_config: specific_config,
            refresh_freq,
            disabled: false,
        };

        let connector = self.backend.create_connector(&request).await.map_err(|e| {
            warn!(source = %source, error = %e, "Failed to create connector");
            ConsoleError::Mutation(e)
        })?;

        info!(
            connector_id = connector.id,
            name = %connector.name,
            source = %source,
            refresh_freq = ?connector.refresh_interval,
            "Connector created"
        );

        self.cache.invalidate(CacheKey::IndexingStatuses).await;
        Ok((connector.clone(), IndexingStatus::not_started(connector)))
    }

    /// Indexing statuses of `source` (all sources when `None`) from the cache.
    pub async fn indexing_statuses(
        &self,
        source: Option<SourceType>,
    ) -> Result<Vec<IndexingStatus>, ConsoleError> {
        let all = self
            .cache
            .indexing_statuses()
            .fetch()
            .await
            .into_result(CacheKey::IndexingStatuses)?;

        Ok(all
            .iter()
            .filter(|s| source.map_or(true, |src| s.connector.source == src))
            .cloned()
            .collect())
    }

    /// Deletes a connector. Terminal: the connector leaves every
    /// credential's reverse-reference set.
    pub async fn delete_connector(&self, id: ConnectorId) -> Result<(), ConsoleError> {
        self.backend.delete_connector(id).await.map_err(|e| {
            warn!(connector_id = id, error = %e, "Failed to delete connector");
            ConsoleError::Mutation(e)
        })?;

        info!(connector_id = id, "Connector deleted");
        self.cache.invalidate(CacheKey::IndexingStatuses).await;
        Ok(())
    }

    /// Pauses (`true`) or resumes (`false`) scheduled indexing.
    pub async fn set_disabled(
        &self,
        id: ConnectorId,
        disabled: bool,
    ) -> Result<Connector, ConsoleError> {
        let patch = ConnectorPatch {
            disabled: Some(disabled),
        };
        let connector = self.backend.update_connector(id, &patch).await.map_err(|e| {
            warn!(connector_id = id, error = %e, "Failed to update connector");
            ConsoleError::Mutation(e)
        })?;

        info!(connector_id = id, disabled, "Connector updated");
        self.cache.invalidate(CacheKey::IndexingStatuses).await;
        Ok(connector)
    }

    /// Requests an immediate indexing run.
    pub async fn run_once(&self, id: ConnectorId) -> Result<(), ConsoleError> {
        self.backend.run_once(id).await.map_err(|e| {
            warn!(connector_id = id, error = %e, "Failed to trigger indexing run");
            ConsoleError::Mutation(e)
        })?;

        info!(connector_id = id, "Indexing run requested");
        self.cache.invalidate(CacheKey::IndexingStatuses).await;
        Ok(())
    }
}
