//! Reusable credentials for data sources.
//!
//! A credential is an authentication payload for exactly one
//! [`SourceType`]. It is created once and may back any number of
//! connectors of the same source.
//!
//! # Usage
//!
//! ```no_run
//! use connector_console::api::{BackendApi, CredentialScope, HttpBackend};
//! use connector_console::cache::ResourceCache;
//! use connector_console::credentials::CredentialManager;
//! use connector_console::source::SourceType;
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let backend: Arc<dyn BackendApi> =
//!     Arc::new(HttpBackend::new("http://localhost:8080", CredentialScope::Public)?);
//! let cache = Arc::new(ResourceCache::new(Arc::clone(&backend)));
//! let manager = CredentialManager::new(backend, cache);
//!
//! let mut payload = BTreeMap::new();
//! payload.insert("hubspot_access_token".to_string(), "pat-123".to_string());
//! let credential = manager.create_credential(SourceType::Hubspot, payload, true).await?;
//! println!("created credential {}", credential.id);
//! # Ok(())
//! # }
//! ```

use crate::source::SourceType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod manager;

pub use manager::CredentialManager;

/// Backend-assigned credential identifier.
pub type CredentialId = i64;

/// Number of leading characters left visible by [`mask_secret`].
const VISIBLE_PREFIX: usize = 4;

/// A stored credential.
///
/// # Security
/// - `payload` holds secrets; never log it
/// - Render secret fields through [`Credential::display_fields`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,

    /// Explicit source tag. Decides the payload schema.
    pub source: SourceType,

    /// Source-specific key-value payload (e.g. `hubspot_access_token`).
    #[serde(rename = "credential_json")]
    pub payload: BTreeMap<String, String>,

    /// Visible to every admin, not only its creator.
    #[serde(default)]
    pub admin_public: bool,

    #[serde(rename = "time_created")]
    pub created_at: DateTime<Utc>,
}

impl Credential {
    /// Value of the source's key field, if set and non-blank.
    pub fn key_value(&self) -> Option<&str> {
        let field = self.source.key_field()?;
        self.payload
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Whether this credential can serve as the live credential for `source`.
    pub fn is_live_for(&self, source: SourceType) -> bool {
        self.source == source && self.key_value().is_some()
    }

    /// `(label, value)` pairs in schema order with secrets masked.
    pub fn display_fields(&self) -> Vec<(&'static str, String)> {
        self.source
            .schema()
            .credential_fields
            .iter()
            .filter_map(|field| {
                let value = self.payload.get(field.name)?;
                let shown = if field.secret {
                    mask_secret(value)
                } else {
                    value.clone()
                };
                Some((field.label, shown))
            })
            .collect()
    }
}

/// Request body for `POST /credential`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewCredential {
    pub source: SourceType,
    #[serde(rename = "credential_json")]
    pub payload: BTreeMap<String, String>,
    pub admin_public: bool,
}

/// Masks a secret for display, keeping a short prefix.
///
/// `"pat-na1-1234abcd"` becomes `"pat-************"`. Values no longer than
/// the prefix are fully masked.
pub fn mask_secret(value: &str) -> String {
    let len = value.chars().count();
    if len <= VISIBLE_PREFIX {
        return "*".repeat(len.max(1));
    }
    let prefix: String = value.chars().take(VISIBLE_PREFIX).collect();
    format!("{}{}", prefix, "*".repeat(len - VISIBLE_PREFIX))
}
