//! Catalog of credentials, connectors and their links.
//!
//! Stored in SQLite. A connector has at most one link (the
//! `connector_credentials` primary key is the connector id). A credential
//! cannot be deleted while any connector links to it.
//!
//! Operations that check before they write hold the connection lock and run
//! in one immediate transaction, so a link and a credential delete cannot
//! interleave between check and write.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use connector_console::connectors::{Connector, ConnectorId, NewConnector};
use connector_console::credentials::{Credential, CredentialId, NewCredential};
use connector_console::source::{InputType, SourceType};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Catalog operation failures.
#[derive(Debug)]
pub enum StoreError {
    NotFound { kind: &'static str, id: i64 },
    /// Credential still linked to connectors.
    CredentialInUse { credential_id: CredentialId, connectors: usize },
    /// Connector linked elsewhere, or sources differ.
    LinkConflict(String),
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { kind, id } => write!(f, "{} {} not found", kind, id),
            StoreError::CredentialInUse {
                credential_id,
                connectors,
            } => write!(
                f,
                "Credential {} is still linked to {} connector(s)",
                credential_id, connectors
            ),
            StoreError::LinkConflict(msg) => write!(f, "{}", msg),
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// SQLite-backed catalog.
pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    /// Opens (or creates) the database and ensures the tables exist.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open catalog DB at {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS credentials (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                source          TEXT NOT NULL,
                credential_json TEXT NOT NULL,
                admin_public    INTEGER NOT NULL,
                time_created    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS connectors (
                id                        INTEGER PRIMARY KEY AUTOINCREMENT,
                name                      TEXT NOT NULL,
                source                    TEXT NOT NULL,
                input_type                TEXT NOT NULL,
                connector_specific_config TEXT NOT NULL,
                refresh_freq              INTEGER,
                disabled                  INTEGER NOT NULL,
                time_created              TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS connector_credentials (
                connector_id  INTEGER PRIMARY KEY,
                credential_id INTEGER NOT NULL
            );",
        )
        .context("Failed to create catalog tables")?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_credential(&self, request: &NewCredential) -> Result<Credential, StoreError> {
        let created_at = Utc::now();
        let payload = serde_json::to_string(&request.payload)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO credentials (source, credential_json, admin_public, time_created)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                request.source.as_str(),
                payload,
                request.admin_public,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(Credential {
            id: conn.last_insert_rowid(),
            source: request.source,
            payload: request.payload.clone(),
            admin_public: request.admin_public,
            created_at,
        })
    }

    /// All credentials, or only admin-public ones.
    pub fn list_credentials(&self, public_only: bool) -> Result<Vec<Credential>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, source, credential_json, admin_public, time_created
             FROM credentials ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_credential)?;
        let all = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(all
            .into_iter()
            .filter(|c| !public_only || c.admin_public)
            .collect())
    }

    pub fn get_credential(&self, id: CredentialId) -> Result<Option<Credential>, StoreError> {
        Ok(query_credential(&self.conn(), id)?)
    }

    /// Deletes a credential. Refused while any connector links to it.
    pub fn delete_credential(&self, id: CredentialId) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let linked: i64 = tx.query_row(
            "SELECT COUNT(*) FROM connector_credentials WHERE credential_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if linked > 0 {
            return Err(StoreError::CredentialInUse {
                credential_id: id,
                connectors: linked as usize,
            });
        }

        let deleted = tx.execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                kind: "Credential",
                id,
            });
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_connector(&self, request: &NewConnector) -> Result<Connector, StoreError> {
        let created_at = Utc::now();
        let config = serde_json::to_string(&request.connector_specific_config)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO connectors
                (name, source, input_type, connector_specific_config, refresh_freq, disabled, time_created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request.name,
                request.source.as_str(),
                input_type_str(request.input_type),
                config,
                request.refresh_freq.map(|f| f as i64),
                request.disabled,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(Connector {
            id: conn.last_insert_rowid(),
            name: request.name.clone(),
            source: request.source,
            input_type: request.input_type,
            specific_config: request.connector_specific_config.clone(),
            refresh_interval: request.refresh_freq,
            credential_ids: Vec::new(),
            disabled: request.disabled,
            created_at,
        })
    }

    /// All connectors with their linked credential, oldest first.
    pub fn list_connectors(&self) -> Result<Vec<Connector>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} ORDER BY c.id ASC", CONNECTOR_SELECT))?;
        let rows = stmt.query_map([], row_to_connector)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_connector(&self, id: ConnectorId) -> Result<Option<Connector>, StoreError> {
        Ok(query_connector(&self.conn(), id)?)
    }

    /// Deletes a connector and its link.
    pub fn delete_connector(&self, id: ConnectorId) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM connector_credentials WHERE connector_id = ?1",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM connectors WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                kind: "Connector",
                id,
            });
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_disabled(&self, id: ConnectorId, disabled: bool) -> Result<Connector, StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE connectors SET disabled = ?1 WHERE id = ?2",
            params![disabled, id],
        )?;
        query_connector(&conn, id)?.ok_or(StoreError::NotFound {
            kind: "Connector",
            id,
        })
    }

    /// Links a connector to a credential of the same source.
    ///
    /// Linking the same pair again is a no-op.
    pub fn link(&self, connector_id: ConnectorId, credential_id: CredentialId) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let connector = query_connector(&tx, connector_id)?.ok_or(StoreError::NotFound {
            kind: "Connector",
            id: connector_id,
        })?;
        let credential = query_credential(&tx, credential_id)?.ok_or(StoreError::NotFound {
            kind: "Credential",
            id: credential_id,
        })?;
        if connector.source != credential.source {
            return Err(StoreError::LinkConflict(format!(
                "Cannot link a {} credential to a {} connector",
                credential.source, connector.source
            )));
        }

        tx.execute(
            "INSERT INTO connector_credentials (connector_id, credential_id) VALUES (?1, ?2)
             ON CONFLICT(connector_id) DO NOTHING",
            params![connector_id, credential_id],
        )?;
        let linked: CredentialId = tx.query_row(
            "SELECT credential_id FROM connector_credentials WHERE connector_id = ?1",
            params![connector_id],
            |row| row.get(0),
        )?;
        if linked != credential_id {
            return Err(StoreError::LinkConflict(format!(
                "Connector {} is already linked to credential {}",
                connector_id, linked
            )));
        }

        tx.commit()?;
        Ok(())
    }
}

fn query_credential(conn: &Connection, id: CredentialId) -> rusqlite::Result<Option<Credential>> {
    conn.query_row(
        "SELECT id, source, credential_json, admin_public, time_created
         FROM credentials WHERE id = ?1",
        params![id],
        row_to_credential,
    )
    .optional()
}

fn query_connector(conn: &Connection, id: ConnectorId) -> rusqlite::Result<Option<Connector>> {
    conn.query_row(
        &format!("{} WHERE c.id = ?1", CONNECTOR_SELECT),
        params![id],
        row_to_connector,
    )
    .optional()
}

const CONNECTOR_SELECT: &str = "SELECT c.id, c.name, c.source, c.input_type, \
     c.connector_specific_config, c.refresh_freq, c.disabled, c.time_created, cc.credential_id \
     FROM connectors c LEFT JOIN connector_credentials cc ON cc.connector_id = c.id";

fn input_type_str(input_type: InputType) -> &'static str {
    match input_type {
        InputType::Poll => "poll",
        InputType::LoadState => "load_state",
    }
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_source(idx: usize, value: String) -> rusqlite::Result<SourceType> {
    value.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    let payload_json: String = row.get(2)?;
    let payload: BTreeMap<String, String> =
        serde_json::from_str(&payload_json).map_err(|e| conversion_error(2, e))?;

    Ok(Credential {
        id: row.get(0)?,
        source: parse_source(1, row.get(1)?)?,
        payload,
        admin_public: row.get(3)?,
        created_at: parse_time(4, row.get(4)?)?,
    })
}

fn row_to_connector(row: &rusqlite::Row<'_>) -> rusqlite::Result<Connector> {
    let input_type = match row.get::<_, String>(3)?.as_str() {
        "load_state" => InputType::LoadState,
        _ => InputType::Poll,
    };
    let config_json: String = row.get(4)?;
    let specific_config = serde_json::from_str(&config_json).map_err(|e| conversion_error(4, e))?;
    let refresh_freq: Option<i64> = row.get(5)?;
    let credential_id: Option<CredentialId> = row.get(8)?;

    Ok(Connector {
        id: row.get(0)?,
        name: row.get(1)?,
        source: parse_source(2, row.get(2)?)?,
        input_type,
        specific_config,
        refresh_interval: refresh_freq.map(|f| f as u64),
        credential_ids: credential_id.into_iter().collect(),
        disabled: row.get(6)?,
        created_at: parse_time(7, row.get(7)?)?,
    })
}
