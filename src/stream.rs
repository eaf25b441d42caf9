//! Connection manager: owns the session's single WebSocket, its heartbeat, and the
//! `Disconnected -> Connecting -> Connected -> Disconnected` lifecycle.
//!
//! A lost connection is not retried. The owner may call [`ConnectionManager::recover`]
//! explicitly; nothing in here reconnects on its own.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    auth::TokenProvider,
    consts::LOG_FRAME_MAX_CHARS,
    diagnostics::{RuntimeDiagnostics, RuntimeState},
    error::{Result, SyncError},
    model::{ClientFrame, ConnectionState, ServerFrame},
    notifications::DesktopNotifier,
    settings::{build_ws_url, Settings},
    socket::{FrameSocket, SocketEvent, SocketFactory},
    store::SharedStore,
    util::{redact_ws_url, truncate_message, unix_now_secs},
};

#[derive(Default)]
struct Control {
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    stream_epoch: u64,
    active: bool,
    runtime: RuntimeState,
}

struct Inner {
    factory: Arc<dyn SocketFactory>,
    tokens: Arc<dyn TokenProvider>,
    store: SharedStore,
    notifier: Arc<DesktopNotifier>,
    base_url: String,
    org_id: Option<String>,
    heartbeat_interval: Duration,
    connect_timeout: Duration,
    state_tx: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        factory: Arc<dyn SocketFactory>,
        tokens: Arc<dyn TokenProvider>,
        store: SharedStore,
        notifier: Arc<DesktopNotifier>,
        settings: &Settings,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                factory,
                tokens,
                store,
                notifier,
                base_url: settings.base_url.clone(),
                org_id: settings.org_id.clone(),
                heartbeat_interval: settings.heartbeat_interval(),
                connect_timeout: settings.connect_timeout(),
                state_tx,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn diagnostics(&self) -> RuntimeDiagnostics {
        let state = self.state();
        self.inner.control().runtime.snapshot(state)
    }

    /// Opens the socket in the background. A second call while a stream task is alive
    /// is a no-op.
    pub fn start(&self) -> Result<()> {
        let token = self
            .inner
            .tokens
            .access_token()
            .ok_or(SyncError::MissingToken)?;
        let org_id = self.inner.tokens.org_id().or_else(|| self.inner.org_id.clone());
        let ws_url = build_ws_url(&self.inner.base_url, &token, org_id.as_deref())?;

        let mut control = self.inner.control();
        control.active = true;
        if control.stop_tx.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        control.stop_tx = Some(stop_tx);
        control.stream_epoch = control.stream_epoch.wrapping_add(1);
        let task_epoch = control.stream_epoch;
        control.runtime.should_run = true;
        control.runtime.last_error = None;

        info!(url = %redact_ws_url(&ws_url), "starting notification stream");
        self.inner.set_state(ConnectionState::Connecting);
        let inner = Arc::clone(&self.inner);
        control.task = Some(tokio::spawn(async move {
            run_stream(inner, ws_url, stop_rx, task_epoch).await;
        }));
        Ok(())
    }

    /// Closes the socket and waits for the stream task to finish, so no heartbeat
    /// or frame handler outlives this call.
    pub async fn stop(&self) {
        let (stop_tx, task) = {
            let mut control = self.inner.control();
            control.active = false;
            control.runtime.should_run = false;
            (control.stop_tx.take(), control.task.take())
        };

        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = task {
            if let Err(error) = task.await {
                warn!(%error, "stream task ended abnormally");
            }
        }
        self.inner.set_state(ConnectionState::Disconnected);
    }

    /// Re-opens the stream only when a session is active and the previous connection
    /// has already ended. Never called automatically.
    pub fn recover(&self) -> Result<bool> {
        {
            let control = self.inner.control();
            if !control.active || control.stop_tx.is_some() {
                return Ok(false);
            }
        }
        self.start()?;
        Ok(true)
    }
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state");
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.control().stream_epoch == epoch
    }

    fn record_error(&self, error: &SyncError) {
        self.control().runtime.last_error = Some(truncate_message(&error.to_string(), 300));
    }

    async fn handle_text(&self, socket: &mut dyn FrameSocket, text: &str) -> Result<()> {
        self.control().runtime.mark_stream_activity();
        debug!(bytes = text.len(), "ws text frame");

        match serde_json::from_str::<ServerFrame>(text) {
            Ok(ServerFrame::Notification { data }) => {
                {
                    let mut control = self.control();
                    control.runtime.last_notification_at = Some(unix_now_secs());
                    control.runtime.last_notification_id = Some(data.id.clone());
                }
                debug!(id = %data.id, title = %truncate_message(&data.title, 60), "notification received");
                let notification = data.clone();
                if self.store.push(data) {
                    self.notifier.notify(&notification);
                }
            }
            Ok(ServerFrame::Ping) => {
                socket.send_text(ClientFrame::Pong.to_text()).await?;
            }
            Ok(ServerFrame::Unknown) => {
                self.control().runtime.ignored_frames += 1;
                debug!(frame = %truncate_message(text, LOG_FRAME_MAX_CHARS), "ignoring unknown frame type");
            }
            Err(error) => {
                self.control().runtime.malformed_frames += 1;
                warn!(
                    %error,
                    frame = %truncate_message(text, LOG_FRAME_MAX_CHARS),
                    "malformed stream frame"
                );
            }
        }
        Ok(())
    }
}

async fn run_stream(
    inner: Arc<Inner>,
    ws_url: String,
    mut stop_rx: watch::Receiver<bool>,
    task_epoch: u64,
) {
    debug!("stream task started");
    let connect = tokio::time::timeout(inner.connect_timeout, inner.factory.connect(&ws_url));
    let outcome = tokio::select! {
        _ = wait_for_stop(&mut stop_rx) => Ok(()),
        connected = connect => match connected {
            Err(_) => Err(SyncError::ConnectTimeout(inner.connect_timeout.as_secs())),
            Ok(Err(error)) => Err(error),
            Ok(Ok(mut socket)) => {
                if inner.is_current(task_epoch) {
                    inner.control().runtime.last_connected_at = Some(unix_now_secs());
                    inner.set_state(ConnectionState::Connected);
                }
                info!("notification stream connected");
                let result = stream_connected(&inner, socket.as_mut(), &mut stop_rx).await;
                if result.is_err() {
                    socket.close().await;
                }
                result
            }
        },
    };

    if let Err(error) = &outcome {
        warn!(%error, "notification stream ended; live updates paused");
        inner.record_error(error);
    }

    let mut control = inner.control();
    if control.stream_epoch == task_epoch {
        control.stop_tx = None;
        control.task = None;
        control.runtime.should_run = false;
        inner.set_state(ConnectionState::Disconnected);
    }
    debug!("stream task finished");
}

/// Resolves once stop is requested or the owning manager is gone.
async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Runs while `Connected`. The heartbeat interval is local to this call, so leaving
/// `Connected` for any reason cancels it.
async fn stream_connected(
    inner: &Inner,
    socket: &mut dyn FrameSocket,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let mut heartbeat = tokio::time::interval(inner.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = wait_for_stop(stop_rx) => {
                socket.close().await;
                return Ok(());
            }
            event = socket.next_event() => match event {
                SocketEvent::Text(text) => inner.handle_text(socket, &text).await?,
                SocketEvent::Closed => {
                    return Err(SyncError::Socket("Stream closed by server".to_string()));
                }
                SocketEvent::Error(error) => {
                    return Err(SyncError::Socket(format!("Stream read error: {error}")));
                }
            },
            _ = heartbeat.tick() => {
                socket.send_text(ClientFrame::Ping.to_text()).await?;
                inner.control().runtime.heartbeats_sent += 1;
                debug!("heartbeat ping sent");
            }
        }
    }
}
