//! Source type registry.
//!
//! Every connector and credential is tagged with an explicit [`SourceType`].
//! The tag selects a static [`SourceSchema`] describing which credential
//! fields and connector config fields the source accepts, how its connector
//! ingests (polling on a schedule or loading a fixed input set), and the
//! default refresh interval.
//!
//! Credentials are never typed by which payload field happens to be set.
//! Two sources sharing a field name cannot collide because lookups always go
//! through the tag first.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Refresh interval used by polling sources unless overridden (10 minutes).
pub const DEFAULT_POLL_REFRESH_SECS: u64 = 10 * 60;

/// Longest accepted refresh interval (one year).
pub const MAX_REFRESH_SECS: u64 = 365 * 24 * 60 * 60;

/// Data source a connector ingests from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Hubspot,
    Github,
    Slack,
    Confluence,
    Jira,
    Notion,
    GoogleDrive,
    Web,
    File,
}

/// How a connector pulls documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// Re-indexes on a schedule.
    Poll,
    /// Ingests a fixed input set.
    LoadState,
}

/// One field of a credential payload or connector config.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Human-readable label, used in validation messages.
    pub label: &'static str,
    pub required: bool,
    /// Secret values are masked when rendered.
    pub secret: bool,
}

/// Static description of a source.
#[derive(Debug)]
pub struct SourceSchema {
    pub source: SourceType,
    pub display_name: &'static str,
    /// Base of the auto-derived connector name.
    pub connector_name: &'static str,
    /// Config fields appended to the connector name (`GitHubConnector-owner/repo`).
    pub name_fields: &'static [&'static str],
    pub credential_fields: &'static [FieldSpec],
    pub config_fields: &'static [FieldSpec],
    pub input_type: InputType,
    pub default_refresh_secs: Option<u64>,
}

const fn required(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: true,
        secret: false,
    }
}

const fn secret(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: true,
        secret: true,
    }
}

const fn optional(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: false,
        secret: false,
    }
}

static HUBSPOT: SourceSchema = SourceSchema {
    source: SourceType::Hubspot,
    display_name: "HubSpot",
    connector_name: "HubSpotConnector",
    name_fields: &[],
    credential_fields: &[secret("hubspot_access_token", "HubSpot Access Token")],
    config_fields: &[],
    input_type: InputType::Poll,
    default_refresh_secs: Some(DEFAULT_POLL_REFRESH_SECS),
};

static GITHUB: SourceSchema = SourceSchema {
    source: SourceType::Github,
    display_name: "GitHub",
    connector_name: "GitHubConnector",
    name_fields: &["repo_owner", "repo_name"],
    credential_fields: &[secret("github_access_token", "GitHub Access Token")],
    config_fields: &[
        required("repo_owner", "Repository Owner"),
        required("repo_name", "Repository Name"),
    ],
    input_type: InputType::Poll,
    default_refresh_secs: Some(DEFAULT_POLL_REFRESH_SECS),
};

static SLACK: SourceSchema = SourceSchema {
    source: SourceType::Slack,
    display_name: "Slack",
    connector_name: "SlackConnector",
    name_fields: &["workspace"],
    credential_fields: &[secret("slack_bot_token", "Slack Bot Token")],
    config_fields: &[required("workspace", "Workspace"), optional("channels", "Channels")],
    input_type: InputType::Poll,
    default_refresh_secs: Some(DEFAULT_POLL_REFRESH_SECS),
};

static CONFLUENCE: SourceSchema = SourceSchema {
    source: SourceType::Confluence,
    display_name: "Confluence",
    connector_name: "ConfluenceConnector",
    name_fields: &["wiki_page_url"],
    credential_fields: &[
        required("confluence_username", "Confluence Username"),
        secret("confluence_access_token", "Confluence Access Token"),
    ],
    config_fields: &[required("wiki_page_url", "Confluence Space URL")],
    input_type: InputType::Poll,
    default_refresh_secs: Some(DEFAULT_POLL_REFRESH_SECS),
};

static JIRA: SourceSchema = SourceSchema {
    source: SourceType::Jira,
    display_name: "Jira",
    connector_name: "JiraConnector",
    name_fields: &["jira_project_url"],
    credential_fields: &[
        required("jira_user_email", "Jira User Email"),
        secret("jira_api_token", "Jira API Token"),
    ],
    config_fields: &[required("jira_project_url", "Jira Project URL")],
    input_type: InputType::Poll,
    default_refresh_secs: Some(DEFAULT_POLL_REFRESH_SECS),
};

static NOTION: SourceSchema = SourceSchema {
    source: SourceType::Notion,
    display_name: "Notion",
    connector_name: "NotionConnector",
    name_fields: &[],
    credential_fields: &[secret("notion_integration_token", "Notion Integration Token")],
    config_fields: &[],
    input_type: InputType::Poll,
    default_refresh_secs: Some(DEFAULT_POLL_REFRESH_SECS),
};

static GOOGLE_DRIVE: SourceSchema = SourceSchema {
    source: SourceType::GoogleDrive,
    display_name: "Google Drive",
    connector_name: "GoogleDriveConnector",
    name_fields: &[],
    credential_fields: &[secret("google_drive_tokens", "Google Drive Tokens")],
    config_fields: &[
        optional("folder_paths", "Folder Paths"),
        optional("include_shared", "Include Shared Files"),
    ],
    input_type: InputType::Poll,
    default_refresh_secs: Some(DEFAULT_POLL_REFRESH_SECS),
};

static WEB: SourceSchema = SourceSchema {
    source: SourceType::Web,
    display_name: "Web",
    connector_name: "WebConnector",
    name_fields: &["base_url"],
    credential_fields: &[],
    config_fields: &[
        required("base_url", "URL to Index"),
        optional("web_connector_type", "Scrape Method"),
    ],
    input_type: InputType::LoadState,
    // Fixed input set, re-crawled once a day
    default_refresh_secs: Some(60 * 60 * 24),
};

static FILE: SourceSchema = SourceSchema {
    source: SourceType::File,
    display_name: "File",
    connector_name: "FileConnector",
    name_fields: &[],
    credential_fields: &[],
    config_fields: &[required("file_locations", "File Locations")],
    input_type: InputType::LoadState,
    default_refresh_secs: None,
};

impl SourceType {
    pub const ALL: [SourceType; 9] = [
        SourceType::Hubspot,
        SourceType::Github,
        SourceType::Slack,
        SourceType::Confluence,
        SourceType::Jira,
        SourceType::Notion,
        SourceType::GoogleDrive,
        SourceType::Web,
        SourceType::File,
    ];

    /// Wire name (`"hubspot"`, `"google_drive"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Hubspot => "hubspot",
            SourceType::Github => "github",
            SourceType::Slack => "slack",
            SourceType::Confluence => "confluence",
            SourceType::Jira => "jira",
            SourceType::Notion => "notion",
            SourceType::GoogleDrive => "google_drive",
            SourceType::Web => "web",
            SourceType::File => "file",
        }
    }

    pub fn schema(&self) -> &'static SourceSchema {
        match self {
            SourceType::Hubspot => &HUBSPOT,
            SourceType::Github => &GITHUB,
            SourceType::Slack => &SLACK,
            SourceType::Confluence => &CONFLUENCE,
            SourceType::Jira => &JIRA,
            SourceType::Notion => &NOTION,
            SourceType::GoogleDrive => &GOOGLE_DRIVE,
            SourceType::Web => &WEB,
            SourceType::File => &FILE,
        }
    }

    /// Whether connectors of this source authenticate with a credential.
    pub fn requires_credential(&self) -> bool {
        !self.schema().credential_fields.is_empty()
    }

    /// The credential field whose presence identifies a live credential.
    ///
    /// The first secret field wins; sources without credentials return `None`.
    pub fn key_field(&self) -> Option<&'static str> {
        let fields = self.schema().credential_fields;
        fields
            .iter()
            .find(|f| f.secret)
            .or_else(|| fields.first())
            .map(|f| f.name)
    }

    /// Derives the connector name for a new connector of this source.
    pub fn connector_name(&self, config: &serde_json::Map<String, serde_json::Value>) -> String {
        let schema = self.schema();
        let suffix: Vec<String> = schema
            .name_fields
            .iter()
            .filter_map(|field| config.get(*field))
            .filter_map(|value| match value {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect();

        if suffix.is_empty() {
            schema.connector_name.to_string()
        } else {
            format!("{}-{}", schema.connector_name, suffix.join("/"))
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        SourceType::ALL
            .iter()
            .copied()
            .find(|source| source.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownSource(s.to_string()))
    }
}

/// Validates a credential payload against the source's credential fields.
///
/// Rules:
/// - The source must accept credentials at all
/// - Every required field is present and non-blank
/// - No field outside the schema is present
pub fn validate_credential_payload(
    source: SourceType,
    payload: &BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    let schema = source.schema();
    if schema.credential_fields.is_empty() {
        return Err(ValidationError::NoCredentialRequired(source));
    }

    for key in payload.keys() {
        if !schema.credential_fields.iter().any(|f| f.name == key) {
            return Err(ValidationError::UnknownField {
                source,
                field: key.clone(),
            });
        }
    }

    for field in schema.credential_fields.iter().filter(|f| f.required) {
        let present = payload
            .get(field.name)
            .map_or(false, |value| !value.trim().is_empty());
        if !present {
            return Err(ValidationError::MissingField {
                source,
                label: field.label,
            });
        }
    }

    Ok(())
}

/// Validates connector-specific config against the source's config fields.
///
/// An empty object is valid for sources without config fields.
pub fn validate_connector_config(
    source: SourceType,
    config: &serde_json::Value,
) -> Result<(), ValidationError> {
    let Some(map) = config.as_object() else {
        return Err(ValidationError::ConfigNotObject);
    };
    let schema = source.schema();

    for key in map.keys() {
        if !schema.config_fields.iter().any(|f| f.name == key) {
            return Err(ValidationError::UnknownField {
                source,
                field: key.clone(),
            });
        }
    }

    for field in schema.config_fields.iter().filter(|f| f.required) {
        if !is_filled(map.get(field.name)) {
            return Err(ValidationError::MissingField {
                source,
                label: field.label,
            });
        }
    }

    Ok(())
}

/// Checks a connector refresh interval. `None` (run only on request) is valid.
pub fn validate_refresh_interval(refresh: Option<u64>) -> Result<(), ValidationError> {
    match refresh {
        Some(secs) if secs == 0 || secs > MAX_REFRESH_SECS => {
            Err(ValidationError::InvalidRefreshInterval)
        }
        _ => Ok(()),
    }
}

fn is_filled(value: Option<&serde_json::Value>) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => false,
        Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
        Some(serde_json::Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}
