// Backend REST surface and HTTP transport
pub mod api;

// Per-source view derivation and linking
pub mod binding;

// Revalidating cache of credentials and indexing statuses
pub mod cache;

// Console configuration
pub mod config;

// Connector lifecycle
pub mod connectors;

// Credential lifecycle
pub mod credentials;

pub mod error;

// Text rendering for the CLI
pub mod render;

// Source registry and payload schemas
pub mod source;

pub use api::{ApiError, BackendApi, CredentialScope, HttpBackend};
pub use binding::{BindingCoordinator, ConnectorRow, LinkState, ViewState};
pub use cache::{CacheKey, ResourceCache, Snapshot};
pub use config::ConsoleConfig;
pub use connectors::{Connector, ConnectorId, ConnectorManager, IndexingState, IndexingStatus};
pub use credentials::{Credential, CredentialId, CredentialManager};
pub use error::{ConsoleError, ValidationError};
pub use source::{InputType, SourceType};
