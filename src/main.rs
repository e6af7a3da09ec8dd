//! # Connector console (`connector-console`)
//!
//! Operator CLI for binding data-source connectors to credentials and
//! watching their indexing status.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `status [source]` | Render the two-step page for one source, or all |
//! | `watch <source>` | Re-render on every cache refresh |
//! | `sources` | List supported sources and their fields |
//! | `credential create/list/delete` | Manage credentials |
//! | `connector create/link/delete/pause/resume/run` | Manage connectors |
//!
//! ```bash
//! connector-console credential create hubspot --field hubspot_access_token=pat-na1-...
//! connector-console connector create hubspot --credential 1
//! connector-console watch hubspot
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use connector_console::render::{render_error, render_health, render_sources, render_view};
use connector_console::{
    ApiError, BackendApi, BindingCoordinator, ConnectorId, ConsoleConfig, ConsoleError, CredentialId,
    HttpBackend, ResourceCache, SourceType,
};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "connector-console",
    about = "Bind connectors to credentials and watch indexing status",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the credential and connectors of one source, or of every source.
    Status {
        source: Option<SourceType>,
    },

    /// Keep re-rendering a source as the cache refreshes. Ctrl-C to stop.
    Watch { source: SourceType },

    /// List supported sources.
    Sources,

    Credential {
        #[command(subcommand)]
        action: CredentialAction,
    },

    Connector {
        #[command(subcommand)]
        action: ConnectorAction,
    },
}

#[derive(Subcommand)]
enum CredentialAction {
    /// Create a credential from `--field key=value` pairs.
    Create {
        source: SourceType,
        #[arg(long = "field", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,
        /// Only visible to its creator.
        #[arg(long)]
        private: bool,
    },
    List {
        #[arg(long)]
        source: Option<SourceType>,
    },
    /// Delete a credential. Refused while connectors of its source exist.
    Delete { id: CredentialId },
}

#[derive(Subcommand)]
enum ConnectorAction {
    /// Create a connector, linking it when `--credential` is given.
    Create {
        source: SourceType,
        /// Config entries; values are parsed as JSON when possible.
        #[arg(long = "set", value_parser = parse_key_val)]
        settings: Vec<(String, String)>,
        /// Refresh interval in seconds.
        #[arg(long)]
        refresh: Option<u64>,
        #[arg(long)]
        credential: Option<CredentialId>,
    },
    /// Link a connector to a credential.
    Link {
        connector_id: ConnectorId,
        credential_id: CredentialId,
    },
    Delete { id: ConnectorId },
    /// Stop scheduled indexing.
    Pause { id: ConnectorId },
    Resume { id: ConnectorId },
    /// Index now.
    Run { id: ConnectorId },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn config_object(settings: Vec<(String, String)>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = settings
        .into_iter()
        .map(|(k, v)| {
            let value = serde_json::from_str(&v).unwrap_or(serde_json::Value::String(v));
            (k, value)
        })
        .collect();
    serde_json::Value::Object(map)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connector_console=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Sources = cli.command {
        print!("{}", render_sources());
        return Ok(());
    }

    let cfg = ConsoleConfig::load(cli.config.as_deref())?;
    let backend = HttpBackend::new(cfg.api.base_url.clone(), cfg.api.credential_scope)
        .context("Failed to build HTTP client")?;
    let backend: Arc<dyn BackendApi> = Arc::new(backend);
    let cache = Arc::new(ResourceCache::new(Arc::clone(&backend)));
    let coordinator = BindingCoordinator::new(Arc::clone(&backend), cache);

    if let Err(e) = execute(cli.command, backend.as_ref(), &coordinator, &cfg).await {
        eprint!("{}", render_error(&e));
        std::process::exit(1);
    }
    Ok(())
}

async fn execute(
    command: Commands,
    backend: &dyn BackendApi,
    coordinator: &BindingCoordinator,
    cfg: &ConsoleConfig,
) -> Result<(), ConsoleError> {
    match command {
        Commands::Sources => print!("{}", render_sources()),

        Commands::Status { source } => {
            let sources: Vec<SourceType> = match source {
                Some(source) => vec![source],
                None => SourceType::ALL.to_vec(),
            };
            print!("{}", render_health(&backend.health().await));
            for source in sources {
                println!("{}", render_view(source, &coordinator.view(source).await));
            }
        }

        Commands::Watch { source } => watch(backend, coordinator, cfg, source).await,

        Commands::Credential { action } => match action {
            CredentialAction::Create {
                source,
                fields,
                private,
            } => {
                let payload: BTreeMap<String, String> = fields.into_iter().collect();
                let credential = coordinator
                    .credentials()
                    .create_credential(source, payload, !private)
                    .await?;
                println!("Created {} credential {}", source, credential.id);
            }
            CredentialAction::List { source } => {
                let credentials = coordinator.credentials().list_credentials(source).await?;
                println!("{:<6} {:<14} {:<20} FIELDS", "ID", "SOURCE", "CREATED");
                for credential in credentials {
                    let fields: Vec<String> = credential
                        .display_fields()
                        .into_iter()
                        .map(|(label, value)| format!("{}={}", label, value))
                        .collect();
                    println!(
                        "{:<6} {:<14} {:<20} {}",
                        credential.id,
                        credential.source.as_str(),
                        credential.created_at.format("%Y-%m-%d %H:%M:%S"),
                        fields.join(", ")
                    );
                }
            }
            CredentialAction::Delete { id } => {
                coordinator.guarded_delete_credential(id).await?;
                println!("Deleted credential {}", id);
            }
        },

        Commands::Connector { action } => match action {
            ConnectorAction::Create {
                source,
                settings,
                refresh,
                credential,
            } => {
                let config = config_object(settings);
                let connector = match credential {
                    Some(credential_id) => {
                        coordinator
                            .create_and_link_connector(source, config, refresh, credential_id)
                            .await?
                    }
                    None => {
                        coordinator
                            .connectors()
                            .create_connector(source, config, refresh)
                            .await?
                            .0
                    }
                };
                println!("Created connector {} ({})", connector.id, connector.name);
                if !connector.is_linked() && source.requires_credential() {
                    println!(
                        "Not linked yet. Run `connector-console connector link {} <credential-id>`.",
                        connector.id
                    );
                }
            }
            ConnectorAction::Link {
                connector_id,
                credential_id,
            } => {
                coordinator
                    .link_credential(connector_id, credential_id)
                    .await?;
                println!("Linked connector {} to credential {}", connector_id, credential_id);
            }
            ConnectorAction::Delete { id } => {
                coordinator.connectors().delete_connector(id).await?;
                println!("Deleted connector {}", id);
            }
            ConnectorAction::Pause { id } => {
                coordinator.connectors().set_disabled(id, true).await?;
                println!("Paused connector {}", id);
            }
            ConnectorAction::Resume { id } => {
                coordinator.connectors().set_disabled(id, false).await?;
                println!("Resumed connector {}", id);
            }
            ConnectorAction::Run { id } => {
                coordinator.connectors().run_once(id).await?;
                println!("Indexing requested for connector {}", id);
            }
        },
    }
    Ok(())
}

async fn watch(
    backend: &dyn BackendApi,
    coordinator: &BindingCoordinator,
    cfg: &ConsoleConfig,
    source: SourceType,
) {
    let cache = coordinator.cache();
    cache.start_revalidation(cfg.cache.credentials_every(), cfg.cache.statuses_every());
    info!(
        source = %source,
        statuses_every = ?cfg.cache.statuses_every(),
        "Watching"
    );

    let mut changes = coordinator.changes();
    let view = coordinator.view(source).await;
    redraw(source, &backend.health().await, &view);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = changes.next() => {
                if changed.is_none() {
                    break;
                }
                let health = backend.health().await;
                redraw(source, &health, &coordinator.current_view(source));
            }
            _ = &mut ctrl_c => break,
        }
    }

    cache.stop_revalidation();
}

fn redraw(source: SourceType, health: &Result<(), ApiError>, view: &connector_console::ViewState) {
    print!(
        "\x1B[2J\x1B[H{}{}",
        render_health(health),
        render_view(source, view)
    );
}
