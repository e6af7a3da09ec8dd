// Management HTTP API
pub mod api;

// Indexing run scheduling
pub mod scheduler;

// SQLite catalog of credentials and connectors
pub mod store;
