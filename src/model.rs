use std::{cmp::Ordering, fmt};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    CampaignAlert,
    System,
    Billing,
    Team,
    Integration,
    #[serde(other)]
    Other,
}

/// Severity, ordered from least to most urgent. Unrecognised wire values decode as
/// `Unknown`, which ranks below everything else.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum Priority {
    Unknown,
    #[default]
    Low,
    Medium,
    High,
    Urgent,
}

impl From<String> for Priority {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    #[serde(rename = "action_url")]
    pub url: String,
    #[serde(rename = "action_label")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NotificationWire")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: Option<String>,
    pub notification_type: NotificationType,
    pub priority: Priority,
    #[serde(flatten)]
    pub action: Option<NotificationAction>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Newest first; equal timestamps fall back to descending id so the order is total.
    pub fn newest_first(a: &Notification, b: &Notification) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct NotificationWire {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default = "default_notification_type")]
    notification_type: NotificationType,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    action_url: Option<String>,
    #[serde(default)]
    action_label: Option<String>,
    #[serde(default)]
    is_read: bool,
    created_at: String,
}

fn default_notification_type() -> NotificationType {
    NotificationType::System
}

impl TryFrom<NotificationWire> for Notification {
    type Error = String;

    fn try_from(wire: NotificationWire) -> Result<Self, Self::Error> {
        if wire.id.trim().is_empty() {
            return Err("notification id is empty".to_string());
        }
        let created_at = parse_timestamp(&wire.created_at)
            .ok_or_else(|| format!("invalid created_at {:?}", wire.created_at))?;
        let action = match (wire.action_url, wire.action_label) {
            (Some(url), Some(label)) if !url.trim().is_empty() => {
                Some(NotificationAction { url, label })
            }
            (None, None) => None,
            _ => {
                tracing::debug!(id = %wire.id, "dropping incomplete notification action");
                None
            }
        };

        Ok(Notification {
            id: wire.id,
            title: wire.title,
            message: wire.message.filter(|m| !m.trim().is_empty()),
            notification_type: wire.notification_type,
            priority: wire.priority,
            action,
            is_read: wire.is_read,
            created_at,
        })
    }
}

/// Accepts RFC 3339 and offset-less ISO 8601 (read as UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(value.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotWire {
    #[serde(default)]
    pub(crate) notifications: Vec<serde_json::Value>,
    #[serde(default)]
    pub(crate) unread_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

impl From<SnapshotWire> for Snapshot {
    /// Entries are decoded one by one; a bad entry is logged and skipped.
    fn from(wire: SnapshotWire) -> Self {
        let notifications = wire
            .notifications
            .into_iter()
            .enumerate()
            .filter_map(|(index, raw)| match serde_json::from_value::<Notification>(raw) {
                Ok(notification) => Some(notification),
                Err(error) => {
                    tracing::warn!(index, %error, "skipping undecodable snapshot entry");
                    None
                }
            })
            .collect();
        Snapshot {
            notifications,
            unread_count: wire.unread_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ServerFrame {
    Notification { data: Notification },
    Ping,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ClientFrame {
    Ping,
    Pong,
}

impl ClientFrame {
    pub(crate) fn to_text(self) -> String {
        match self {
            ClientFrame::Ping => r#"{"type":"ping"}"#.to_string(),
            ClientFrame::Pong => r#"{"type":"pong"}"#.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
