use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("No access token available")]
    MissingToken,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid notification id: {0}")]
    InvalidId(String),

    #[error("Request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode {what}: {message}")]
    Decode { what: &'static str, message: String },

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Stream connection timed out after {0} seconds")]
    ConnectTimeout(u64),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Keychain error: {0}")]
    Keyring(String),

    #[error("Session is closed")]
    SessionClosed,
}

impl SyncError {
    pub fn decode(what: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            message: error.to_string(),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(error.to_string())
    }
}

impl From<keyring::Error> for SyncError {
    fn from(error: keyring::Error) -> Self {
        Self::Keyring(error.to_string())
    }
}
