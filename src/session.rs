//! Per-session service object. Built once after login, passed by reference to whatever
//! renders the inbox, and torn down deterministically with [`NotificationSession::stop`].

use std::sync::{Arc, Mutex};

use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

use crate::{
    api::{NotificationApi, RestApi},
    auth::TokenProvider,
    diagnostics::RuntimeDiagnostics,
    error::Result,
    gateway::MutationGateway,
    model::ConnectionState,
    notifications::{platform_notifier, DesktopNotifier, NativeNotifier, Permission},
    settings::Settings,
    snapshot::load_snapshot,
    socket::{SocketFactory, TungsteniteConnector},
    store::{InboxView, SharedStore},
    stream::ConnectionManager,
};

pub struct NotificationSession {
    store: SharedStore,
    api: Arc<dyn NotificationApi>,
    gateway: MutationGateway,
    connection: ConnectionManager,
    notifier: Arc<DesktopNotifier>,
    snapshot_task: Mutex<Option<JoinHandle<bool>>>,
}

impl NotificationSession {
    /// Wires the production stack: reqwest, tokio-tungstenite and the platform notifier.
    pub fn connect(settings: &Settings, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let api = Arc::new(RestApi::new(&settings.base_url, Arc::clone(&tokens))?);
        Ok(Self::with_parts(
            settings,
            tokens,
            api,
            Arc::new(TungsteniteConnector),
            platform_notifier(),
        ))
    }

    pub fn with_parts(
        settings: &Settings,
        tokens: Arc<dyn TokenProvider>,
        api: Arc<dyn NotificationApi>,
        sockets: Arc<dyn SocketFactory>,
        native: Arc<dyn NativeNotifier>,
    ) -> Self {
        let store = SharedStore::new(settings.max_entries);
        let notifier = Arc::new(DesktopNotifier::new(native, settings));
        let gateway = MutationGateway::new(Arc::clone(&api), store.clone());
        let connection = ConnectionManager::new(
            sockets,
            tokens,
            store.clone(),
            Arc::clone(&notifier),
            settings,
        );
        Self {
            store,
            api,
            gateway,
            connection,
            notifier,
            snapshot_task: Mutex::new(None),
        }
    }

    /// Resolves notification permission, then runs the snapshot fetch and the socket
    /// concurrently. The store merges whichever lands first.
    pub fn start(&self) -> Result<()> {
        let permission = self.notifier.prepare();
        if permission == Permission::Denied {
            debug!("desktop notifications denied for this session");
        }

        let api = Arc::clone(&self.api);
        let store = self.store.clone();
        let task = tokio::spawn(async move { load_snapshot(api.as_ref(), &store).await });
        if let Ok(mut slot) = self.snapshot_task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }

        self.connection.start()?;
        info!("notification session started");
        Ok(())
    }

    /// Re-fetches the snapshot on demand and merges it.
    pub async fn refresh(&self) -> bool {
        load_snapshot(self.api.as_ref(), &self.store).await
    }

    /// Closes the socket, cancels the heartbeat and any pending snapshot, and makes
    /// late results from in-flight requests no-ops. Safe to call more than once.
    pub async fn stop(&self) {
        self.store.close();
        let pending = self.snapshot_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = pending {
            task.abort();
        }
        self.connection.stop().await;
        info!("notification session stopped");
    }

    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn inbox(&self) -> InboxView {
        self.store.view()
    }

    pub fn subscribe(&self) -> watch::Receiver<InboxView> {
        self.store.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn diagnostics(&self) -> RuntimeDiagnostics {
        self.connection.diagnostics()
    }

    pub async fn mark_as_read(&self, id: &str) -> Result<()> {
        self.gateway.mark_as_read(id).await
    }

    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.gateway.mark_all_as_read().await
    }

    pub async fn delete_notification(&self, id: &str) -> Result<()> {
        self.gateway.delete_notification(id).await
    }
}
