//! Credential lifecycle: create, list, delete.
//!
//! This manager knows nothing about connectors. Deleting a credential that
//! connectors still depend on is prevented one level up, by the binding
//! coordinator, which is why [`CredentialManager::delete_credential`] is
//! crate-private.

use super::{Credential, CredentialId, NewCredential};
use crate::api::BackendApi;
use crate::cache::{CacheKey, ResourceCache};
use crate::error::ConsoleError;
use crate::source::{validate_credential_payload, SourceType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates and deletes credentials, invalidating the cached collection on
/// every successful mutation.
#[derive(Clone)]
pub struct CredentialManager {
    backend: Arc<dyn BackendApi>,
    cache: Arc<ResourceCache>,
}

impl CredentialManager {
    pub fn new(backend: Arc<dyn BackendApi>, cache: Arc<ResourceCache>) -> Self {
        Self { backend, cache }
    }

    /// Validates `payload` against the source schema and creates the credential.
    ///
    /// # Returns
    /// * `Ok(Credential)` - Created; the credential collection has been refetched
    /// * `Err(ConsoleError::Validation)` - Payload rejected, no request issued
    /// * `Err(ConsoleError::Mutation)` - Backend rejected the create
    pub async fn create_credential(
        &self,
        source: SourceType,
        payload: BTreeMap<String, String>,
        admin_public: bool,
    ) -> Result<Credential, ConsoleError> {
        validate_credential_payload(source, &payload)?;

        let request = NewCredential {
            source,
            payload,
            admin_public,
        };
        let credential = self.backend.create_credential(&request).await.map_err(|e| {
            warn!(source = %source, error = %e, "Failed to create credential");
            ConsoleError::Mutation(e)
        })?;

        info!(
            credential_id = credential.id,
            source = %source,
            "Credential created"
        );

        self.cache.invalidate(CacheKey::Credentials).await;
        Ok(credential)
    }

    /// Credentials of `source` (all sources when `None`) from the cache.
    pub async fn list_credentials(
        &self,
        source: Option<SourceType>,
    ) -> Result<Vec<Credential>, ConsoleError> {
        let all = self
            .cache
            .credentials()
            .fetch()
            .await
            .into_result(CacheKey::Credentials)?;

        debug!(total = all.len(), source = ?source, "Listing credentials");

        Ok(all
            .iter()
            .filter(|c| source.map_or(true, |s| c.source == s))
            .cloned()
            .collect())
    }

    /// Deletes a credential unconditionally.
    ///
    /// Callers must check the dependent-connector guard first.
    pub(crate) async fn delete_credential(&self, id: CredentialId) -> Result<(), ConsoleError> {
        self.backend.delete_credential(id).await.map_err(|e| {
            warn!(credential_id = id, error = %e, "Failed to delete credential");
            ConsoleError::Mutation(e)
        })?;

        info!(credential_id = id, "Credential deleted");

        self.cache.invalidate(CacheKey::Credentials).await;
        Ok(())
    }
}
