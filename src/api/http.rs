use super::{ApiError, BackendApi};
use crate::connectors::{Connector, ConnectorId, ConnectorPatch, IndexingStatus, NewConnector};
use crate::credentials::{Credential, CredentialId, NewCredential};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MANAGE_PREFIX: &str = "/api/manage";

/// Which credential listing the console reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    /// Credentials visible to every admin (`/credential`).
    #[default]
    Public,
    /// All credentials (`/admin/credential`).
    Admin,
}

/// Error body returned by the backend.
#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Serialize)]
struct RunOnceRequest {
    connector_id: ConnectorId,
}

/// HTTP client for the indexing backend REST API.
pub struct HttpBackend {
    http_client: Client,
    base_url: String,
    scope: CredentialScope,
}

impl HttpBackend {
    /// Create a client for `base_url` (e.g. "http://localhost:8080").
    pub fn new(base_url: impl Into<String>, scope: CredentialScope) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .user_agent("connector-console/0.1")
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            scope,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, MANAGE_PREFIX, path)
    }

    fn credential_list_path(&self) -> &'static str {
        match self.scope {
            CredentialScope::Public => "/credential",
            CredentialScope::Admin => "/admin/credential",
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        check_response_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Maps non-2xx responses to [`ApiError::Status`], reading `{"detail": ...}`
/// from the body when present.
async fn check_response_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.detail)
        .unwrap_or_else(|_| {
            if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body
            }
        });

    Err(ApiError::Status {
        status: status.as_u16(),
        detail,
    })
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_credentials(&self) -> Result<Vec<Credential>, ApiError> {
        let url = self.url(self.credential_list_path());
        debug!(url = %url, "Fetching credentials");
        self.send_json(self.http_client.get(&url)).await
    }

    async fn create_credential(&self, request: &NewCredential) -> Result<Credential, ApiError> {
        let url = self.url("/credential");
        self.send_json(self.http_client.post(&url).json(request)).await
    }

    async fn delete_credential(&self, id: CredentialId) -> Result<(), ApiError> {
        let url = self.url(&format!("/credential/{}", id));
        self.send(self.http_client.delete(&url)).await?;
        Ok(())
    }

    async fn list_indexing_statuses(&self) -> Result<Vec<IndexingStatus>, ApiError> {
        let url = self.url("/admin/connector/indexing-status");
        debug!(url = %url, "Fetching indexing statuses");
        self.send_json(self.http_client.get(&url)).await
    }

    async fn create_connector(&self, request: &NewConnector) -> Result<Connector, ApiError> {
        let url = self.url("/admin/connector");
        self.send_json(self.http_client.post(&url).json(request)).await
    }

    async fn delete_connector(&self, id: ConnectorId) -> Result<(), ApiError> {
        let url = self.url(&format!("/admin/connector/{}", id));
        self.send(self.http_client.delete(&url)).await?;
        Ok(())
    }

    async fn update_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
    ) -> Result<Connector, ApiError> {
        let url = self.url(&format!("/admin/connector/{}", id));
        self.send_json(self.http_client.patch(&url).json(patch)).await
    }

    async fn link_credential(
        &self,
        connector_id: ConnectorId,
        credential_id: CredentialId,
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/connector/{}/credential/{}",
            connector_id, credential_id
        ));
        self.send(self.http_client.put(&url).json(&serde_json::json!({})))
            .await?;
        Ok(())
    }

    async fn run_once(&self, connector_id: ConnectorId) -> Result<(), ApiError> {
        let url = self.url("/admin/connector/run-once");
        self.send(
            self.http_client
                .post(&url)
                .json(&RunOnceRequest { connector_id }),
        )
        .await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), ApiError> {
        let url = format!("{}/health", self.base_url);
        self.send(self.http_client.get(&url)).await?;
        Ok(())
    }
}
