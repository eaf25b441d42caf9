use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tracing::debug;

use crate::{
    consts::{
        DEFAULT_MAX_ENTRIES, HEARTBEAT_INTERVAL_SECS, MAX_ENTRIES_LIMIT, STREAM_CONNECT_TIMEOUT_SECS,
        STREAM_PATH,
    },
    error::{Result, SyncError},
    model::Priority,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub org_id: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_entries: usize,
    pub desktop_notifications: bool,
    pub min_priority: Priority,
    pub quiet_hours_start: Option<u8>,
    pub quiet_hours_end: Option<u8>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            org_id: None,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            connect_timeout_secs: STREAM_CONNECT_TIMEOUT_SECS,
            max_entries: DEFAULT_MAX_ENTRIES,
            desktop_notifications: true,
            min_priority: Priority::Unknown,
            quiet_hours_start: None,
            quiet_hours_end: None,
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!(?path, "settings file not found; using defaults");
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|error| SyncError::Settings(format!("Failed to read settings: {error}")))?;
        let settings = serde_json::from_str::<Settings>(&content)
            .map_err(|error| SyncError::Settings(format!("Failed to parse settings: {error}")))?;
        settings.normalized()
    }

    /// Validates the base URL and clamps numeric fields into range.
    pub fn normalized(mut self) -> Result<Settings> {
        self.base_url = normalize_base_url(&self.base_url)?;
        self.org_id = self.org_id.filter(|id| !id.trim().is_empty());
        self.heartbeat_interval_secs = self.heartbeat_interval_secs.max(1);
        self.connect_timeout_secs = self.connect_timeout_secs.max(1);
        self.max_entries = normalize_max_entries(self.max_entries);
        self.quiet_hours_start = self.quiet_hours_start.map(|h| h % 24);
        self.quiet_hours_end = self.quiet_hours_end.map(|h| h % 24);
        Ok(self)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

pub(crate) fn normalize_max_entries(limit: usize) -> usize {
    limit.clamp(1, MAX_ENTRIES_LIMIT)
}

pub fn normalize_base_url(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SyncError::InvalidUrl("Server URL is required".to_string()));
    }

    let url = reqwest::Url::parse(trimmed)
        .map_err(|error| SyncError::InvalidUrl(format!("Invalid server URL: {error}")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(SyncError::InvalidUrl(
            "Server URL must start with http:// or https://".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

pub fn build_ws_url(base_url: &str, token: &str, org_id: Option<&str>) -> Result<String> {
    let mut ws_url = reqwest::Url::parse(base_url)
        .map_err(|error| SyncError::InvalidUrl(format!("Invalid server URL: {error}")))?;

    match ws_url.scheme() {
        "http" => {
            ws_url.set_scheme("ws").map_err(|_| {
                SyncError::InvalidUrl("Unable to convert URL scheme to ws".to_string())
            })?;
        }
        "https" => {
            ws_url.set_scheme("wss").map_err(|_| {
                SyncError::InvalidUrl("Unable to convert URL scheme to wss".to_string())
            })?;
        }
        _ => {
            return Err(SyncError::InvalidUrl(
                "Server URL must start with http:// or https://".to_string(),
            ))
        }
    }

    let mut path = ws_url.path().trim_end_matches('/').to_string();
    path.push_str(STREAM_PATH);
    ws_url.set_path(&path);
    ws_url.set_query(None);
    {
        let mut query = ws_url.query_pairs_mut();
        query.append_pair("token", token.trim());
        if let Some(org_id) = org_id.map(str::trim).filter(|id| !id.is_empty()) {
            query.append_pair("org_id", org_id);
        }
    }
    Ok(ws_url.to_string())
}
