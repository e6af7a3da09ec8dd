//! Error taxonomy for console operations.
//!
//! Every failure ends at the operator: nothing here is retried
//! transparently. [`ValidationError`] never reaches the network;
//! [`ConsoleError::Mutation`] wraps a backend rejection and leaves local
//! state exactly as it was before the attempt.

use crate::api::ApiError;
use crate::cache::CacheKey;
use crate::connectors::{Connector, ConnectorId};
use crate::credentials::CredentialId;
use crate::source::SourceType;
use std::fmt;

/// Client-side checks that fail before any request is issued.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    UnknownSource(String),
    /// Required credential or config field missing or blank.
    MissingField {
        source: SourceType,
        label: &'static str,
    },
    UnknownField {
        source: SourceType,
        field: String,
    },
    /// Source ingests without a credential (web, file).
    NoCredentialRequired(SourceType),
    ConfigNotObject,
    InvalidRefreshInterval,
    /// Delete guard: connectors still depend on the credential.
    CredentialInUse {
        credential_id: CredentialId,
        connectors: usize,
    },
    /// Connector already bound to a different credential.
    AlreadyLinked {
        connector_id: ConnectorId,
        linked_to: CredentialId,
    },
    SourceMismatch {
        connector: SourceType,
        credential: SourceType,
    },
    UnknownCredential(CredentialId),
    /// A guard needs a collection that has not been fetched successfully.
    NotLoaded(CacheKey),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownSource(s) => write!(f, "unknown source type '{}'", s),
            ValidationError::MissingField { label, .. } => {
                write!(f, "Please enter your {}", label)
            }
            ValidationError::UnknownField { source, field } => {
                write!(f, "field '{}' is not valid for {} sources", field, source)
            }
            ValidationError::NoCredentialRequired(source) => {
                write!(f, "{} connectors do not use credentials", source)
            }
            ValidationError::ConfigNotObject => {
                write!(f, "connector config must be a JSON object")
            }
            ValidationError::InvalidRefreshInterval => {
                write!(f, "refresh interval must be between 1 second and 365 days")
            }
            ValidationError::CredentialInUse { .. } => {
                write!(f, "Must delete all connectors before deleting credentials")
            }
            ValidationError::AlreadyLinked {
                connector_id,
                linked_to,
            } => write!(
                f,
                "connector {} is already linked to credential {}",
                connector_id, linked_to
            ),
            ValidationError::SourceMismatch {
                connector,
                credential,
            } => write!(
                f,
                "cannot link a {} credential to a {} connector",
                credential, connector
            ),
            ValidationError::UnknownCredential(id) => write!(f, "credential {} not found", id),
            ValidationError::NotLoaded(key) => {
                write!(f, "{} are not loaded yet, try again", key.label())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Any failure surfaced by the console.
#[derive(Debug)]
pub enum ConsoleError {
    /// A cached collection failed to fetch.
    Load { resource: CacheKey, message: String },
    Validation(ValidationError),
    /// The backend rejected a create, delete or link.
    Mutation(ApiError),
    /// Connector created but linking it failed. The connector exists unlinked.
    PartialSequence {
        connector: Box<Connector>,
        source: ApiError,
    },
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Load { resource, message } => {
                write!(f, "Failed to load {}: {}", resource.label(), message)
            }
            ConsoleError::Validation(e) => write!(f, "{}", e),
            ConsoleError::Mutation(e) => write!(f, "{}", e),
            ConsoleError::PartialSequence { connector, source } => write!(
                f,
                "connector '{}' (id {}) was created but linking its credential failed: {}",
                connector.name, connector.id, source
            ),
        }
    }
}

impl std::error::Error for ConsoleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsoleError::Validation(e) => Some(e),
            ConsoleError::Mutation(e) => Some(e),
            ConsoleError::PartialSequence { source, .. } => Some(source),
            ConsoleError::Load { .. } => None,
        }
    }
}

impl From<ValidationError> for ConsoleError {
    fn from(e: ValidationError) -> Self {
        ConsoleError::Validation(e)
    }
}

impl From<ApiError> for ConsoleError {
    fn from(e: ApiError) -> Self {
        ConsoleError::Mutation(e)
    }
}
