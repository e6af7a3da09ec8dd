//! Plain-text rendering of source views and operator-facing errors.
//!
//! Every function returns a `String` so the binary decides where it goes.

use crate::api::ApiError;
use crate::binding::{ConnectorRow, LinkState, ViewState};
use crate::connectors::IndexingState;
use crate::credentials::Credential;
use crate::error::{ConsoleError, ValidationError};
use crate::source::{SourceSchema, SourceType};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Renders the two-step page for one source.
pub fn render_view(source: SourceType, view: &ViewState) -> String {
    let schema = source.schema();
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", schema.display_name);

    match view {
        ViewState::Loading => {
            let _ = writeln!(out, "Loading...");
        }
        ViewState::LoadFailed { resource, message } => {
            out.push_str(&banner(&format!(
                "Failed to load {}: {}",
                resource.label(),
                message
            )));
        }
        ViewState::Unconfigured => {
            step_one(&mut out, schema, None);
            let _ = writeln!(out);
            let _ = writeln!(out, "Step 2: Start indexing");
            let _ = writeln!(
                out,
                "  Provide a {} credential first.",
                schema.display_name
            );
        }
        ViewState::CredentialOnly { credential } => {
            step_one(&mut out, schema, credential.as_ref());
            let _ = writeln!(out);
            let _ = writeln!(out, "Step 2: Start indexing");
            let _ = writeln!(
                out,
                "  No connectors yet. Run `connector-console connector create {}`.",
                source
            );
        }
        ViewState::Bound {
            credential,
            connectors,
        } => {
            step_one(&mut out, schema, credential.as_ref());
            let _ = writeln!(out);
            let _ = writeln!(out, "Step 2: Start indexing");
            out.push_str(&connector_table(connectors));
        }
    }
    out
}

fn step_one(out: &mut String, schema: &SourceSchema, credential: Option<&Credential>) {
    if schema.credential_fields.is_empty() {
        let _ = writeln!(out, "Step 1: No credential needed");
        return;
    }

    let _ = writeln!(out, "Step 1: Provide your credentials");
    match credential {
        Some(credential) => {
            for (label, value) in credential.display_fields() {
                let _ = writeln!(out, "  {}: {}", label, value);
            }
            let _ = writeln!(out, "  (credential {})", credential.id);
        }
        None => {
            let fields: Vec<String> = schema
                .credential_fields
                .iter()
                .map(|f| format!("--field {}=...", f.name))
                .collect();
            let _ = writeln!(
                out,
                "  Not configured. Run `connector-console credential create {} {}`.",
                schema.source,
                fields.join(" ")
            );
        }
    }
}

fn connector_table(rows: &[ConnectorRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<6} {:<36} {:<12} {:<20} {:<8} CREDENTIAL",
        "ID", "NAME", "STATUS", "LAST RUN", "DOCS"
    );
    for row in rows {
        let connector = &row.status.connector;
        let status = if connector.disabled {
            "paused".to_string()
        } else {
            row.status.last_status.as_str().to_string()
        };
        let credential = match row.link {
            LinkState::Live => connector
                .linked_credential()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            LinkState::Other(id) => format!("{} (not live)", id),
            LinkState::Unlinked => "no credential attached".to_string(),
        };
        let _ = writeln!(
            out,
            "  {:<6} {:<36} {:<12} {:<20} {:<8} {}",
            connector.id,
            truncate(&connector.name, 36),
            status,
            last_run(row.status.last_run_at),
            row.status.docs_indexed,
            credential
        );
        if row.status.last_status == IndexingState::Failed {
            if let Some(msg) = &row.status.error_msg {
                let _ = writeln!(out, "         error: {}", msg);
            }
        }
    }
    out
}

fn last_run(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Boxed banner around a one-line message.
pub fn banner(message: &str) -> String {
    let width = message.chars().count() + 4;
    let rule = "!".repeat(width);
    format!("{}\n! {} !\n{}\n", rule, message, rule)
}

/// Banner shown above every page while the backend health check fails.
/// Empty when the backend is healthy.
pub fn render_health(health: &Result<(), ApiError>) -> String {
    match health {
        Ok(()) => String::new(),
        Err(e) => banner(&format!("The backend is currently unavailable: {}", e)),
    }
}

/// Operator-facing rendering of any console failure.
///
/// The delete guard gets a banner since it blocks the action outright.
pub fn render_error(err: &ConsoleError) -> String {
    match err {
        ConsoleError::Validation(ValidationError::CredentialInUse { .. })
        | ConsoleError::Load { .. } => banner(&err.to_string()),
        ConsoleError::PartialSequence { connector, .. } => format!(
            "{}\nRetry with `connector-console connector link {} <credential-id>`.\n",
            err, connector.id
        ),
        _ => format!("Error: {}\n", err),
    }
}

/// Table of supported sources and what each needs.
pub fn render_sources() -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:<14} {:<10} {:<10} FIELDS",
        "SOURCE", "NAME", "INPUT", "REFRESH"
    );
    for source in SourceType::ALL {
        let schema = source.schema();
        let refresh = match schema.default_refresh_secs {
            Some(secs) => format!("{}s", secs),
            None => "-".to_string(),
        };
        let fields: Vec<&str> = schema
            .credential_fields
            .iter()
            .chain(schema.config_fields.iter())
            .map(|f| f.name)
            .collect();
        let _ = writeln!(
            out,
            "{:<14} {:<14} {:<10} {:<10} {}",
            source.as_str(),
            schema.display_name,
            format!("{:?}", schema.input_type).to_lowercase(),
            refresh,
            fields.join(", ")
        );
    }
    out
}
