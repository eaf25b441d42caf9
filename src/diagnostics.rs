use serde::Serialize;

use crate::{model::ConnectionState, util::unix_now_secs};

/// Bookkeeping the stream task updates as frames arrive.
#[derive(Debug, Default)]
pub(crate) struct RuntimeState {
    pub(crate) should_run: bool,
    pub(crate) last_connected_at: Option<u64>,
    pub(crate) last_stream_event_at: Option<u64>,
    pub(crate) last_notification_at: Option<u64>,
    pub(crate) last_notification_id: Option<String>,
    pub(crate) last_error: Option<String>,
    pub(crate) heartbeats_sent: u64,
    pub(crate) ignored_frames: u64,
    pub(crate) malformed_frames: u64,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RuntimeDiagnostics {
    pub connection_state: ConnectionState,
    pub should_run: bool,
    pub last_connected_at: Option<u64>,
    pub last_stream_event_at: Option<u64>,
    pub last_notification_at: Option<u64>,
    pub last_notification_id: Option<String>,
    pub stale_for_seconds: Option<u64>,
    pub last_error: Option<String>,
    pub heartbeats_sent: u64,
    pub ignored_frames: u64,
    pub malformed_frames: u64,
}

impl RuntimeState {
    pub(crate) fn snapshot(&self, connection_state: ConnectionState) -> RuntimeDiagnostics {
        let now = unix_now_secs();
        let stale_for_seconds = self
            .last_stream_event_at
            .map(|last| now.saturating_sub(last));

        RuntimeDiagnostics {
            connection_state,
            should_run: self.should_run,
            last_connected_at: self.last_connected_at,
            last_stream_event_at: self.last_stream_event_at,
            last_notification_at: self.last_notification_at,
            last_notification_id: self.last_notification_id.clone(),
            stale_for_seconds,
            last_error: self.last_error.clone(),
            heartbeats_sent: self.heartbeats_sent,
            ignored_frames: self.ignored_frames,
            malformed_frames: self.malformed_frames,
        }
    }

    pub(crate) fn mark_stream_activity(&mut self) {
        self.last_stream_event_at = Some(unix_now_secs());
    }
}
