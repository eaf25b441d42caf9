//! Identity capabilities consumed from the host's auth layer.

use std::sync::RwLock;

use tracing::{debug, warn};

use crate::{
    consts::{KEYRING_ORG_USER, KEYRING_SERVICE, KEYRING_TOKEN_USER},
    error::Result,
};

pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn org_id(&self) -> Option<String>;
}

/// Fixed credentials, e.g. handed over by a login flow or passed on the command line.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    token: Option<String>,
    org_id: Option<String>,
}

impl StaticTokens {
    pub fn new(token: impl Into<String>, org_id: Option<String>) -> Self {
        Self {
            token: Some(token.into()),
            org_id,
        }
    }
}

impl TokenProvider for StaticTokens {
    fn access_token(&self) -> Option<String> {
        non_blank(self.token.clone())
    }

    fn org_id(&self) -> Option<String> {
        non_blank(self.org_id.clone())
    }
}

/// Bearer token and organization id held in the OS keychain.
///
/// The keychain is read once at construction and again on [`KeyringTokens::reload`];
/// the async request paths only ever see the cached values. Construction blocks, so
/// callers on a runtime should build it inside `spawn_blocking`.
pub struct KeyringTokens {
    token_entry: keyring::Entry,
    org_entry: keyring::Entry,
    cached: RwLock<CachedIdentity>,
}

#[derive(Debug, Default)]
struct CachedIdentity {
    token: Option<String>,
    org_id: Option<String>,
}

impl KeyringTokens {
    pub fn new() -> Result<Self> {
        let tokens = Self {
            token_entry: keyring::Entry::new(KEYRING_SERVICE, KEYRING_TOKEN_USER)?,
            org_entry: keyring::Entry::new(KEYRING_SERVICE, KEYRING_ORG_USER)?,
            cached: RwLock::new(CachedIdentity::default()),
        };
        tokens.reload();
        Ok(tokens)
    }

    /// Re-reads both entries from the keychain, e.g. after the auth layer refreshed them.
    pub fn reload(&self) {
        let token = Self::read(&self.token_entry, "access token");
        let org_id = Self::read(&self.org_entry, "org id");
        if let Ok(mut cached) = self.cached.write() {
            *cached = CachedIdentity { token, org_id };
        }
    }

    pub fn store_token(&self, token: &str) -> Result<()> {
        self.token_entry.set_password(token.trim())?;
        if let Ok(mut cached) = self.cached.write() {
            cached.token = non_blank(Some(token.to_string()));
        }
        Ok(())
    }

    pub fn store_org_id(&self, org_id: &str) -> Result<()> {
        self.org_entry.set_password(org_id.trim())?;
        if let Ok(mut cached) = self.cached.write() {
            cached.org_id = non_blank(Some(org_id.to_string()));
        }
        Ok(())
    }

    fn read(entry: &keyring::Entry, what: &str) -> Option<String> {
        match entry.get_password() {
            Ok(value) => non_blank(Some(value)),
            Err(keyring::Error::NoEntry) => {
                debug!(what, "no keychain entry");
                None
            }
            Err(error) => {
                warn!(what, %error, "failed to read keychain entry");
                None
            }
        }
    }
}

impl TokenProvider for KeyringTokens {
    fn access_token(&self) -> Option<String> {
        self.cached.read().ok().and_then(|cached| cached.token.clone())
    }

    fn org_id(&self) -> Option<String> {
        self.cached.read().ok().and_then(|cached| cached.org_id.clone())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
