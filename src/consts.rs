pub(crate) const DEFAULT_MAX_ENTRIES: usize = 100;
pub(crate) const MAX_ENTRIES_LIMIT: usize = 2000;

pub(crate) const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub(crate) const STREAM_CONNECT_TIMEOUT_SECS: u64 = 10;

pub(crate) const NOTIFICATIONS_PATH: &str = "/api/v1/notifications";
pub(crate) const STREAM_PATH: &str = "/api/v1/ws/ws";

pub(crate) const KEYRING_SERVICE: &str = "inbox-sync";
pub(crate) const KEYRING_TOKEN_USER: &str = "access-token";
pub(crate) const KEYRING_ORG_USER: &str = "org-id";

pub(crate) const LOG_BODY_MAX_CHARS: usize = 200;
pub(crate) const LOG_FRAME_MAX_CHARS: usize = 140;
pub(crate) const NOTIFY_BODY_MAX_CHARS: usize = 220;
