//! Keeps one consistent view of a user's notification inbox by merging a REST snapshot
//! with a live WebSocket feed, and confirms every user mutation with the server before
//! applying it.

pub mod api;
pub mod auth;
mod consts;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod model;
pub mod notifications;
pub mod session;
pub mod settings;
pub mod snapshot;
pub mod socket;
pub mod store;
pub mod stream;
mod util;

pub use api::{NotificationApi, RestApi};
pub use auth::{KeyringTokens, StaticTokens, TokenProvider};
pub use diagnostics::RuntimeDiagnostics;
pub use error::{Result, SyncError};
pub use gateway::MutationGateway;
pub use model::{
    ConnectionState, Notification, NotificationAction, NotificationType, Priority, Snapshot,
};
pub use notifications::{DesktopNotifier, NativeNotifier, Permission};
pub use session::NotificationSession;
pub use settings::Settings;
pub use socket::{FrameSocket, SocketEvent, SocketFactory, TungsteniteConnector};
pub use store::{InboxView, NotificationStore, SharedStore};
pub use stream::ConnectionManager;
