use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Url};
use tracing::debug;

use crate::{
    auth::TokenProvider,
    consts::{LOG_BODY_MAX_CHARS, NOTIFICATIONS_PATH},
    error::{Result, SyncError},
    model::{Snapshot, SnapshotWire},
    util::truncate_message,
};

/// The notification REST endpoints.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot>;

    async fn mark_read(&self, id: &str) -> Result<()>;

    async fn mark_all_read(&self) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

pub struct RestApi {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl RestApi {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| SyncError::Network(format!("Failed to build HTTP client: {error}")))?;
        Self::with_client(client, base_url, tokens)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|error| SyncError::InvalidUrl(format!("Invalid server URL: {error}")))?;
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    /// `{base}/api/v1/notifications/{segments...}`; an empty slice keeps the trailing slash.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SyncError::InvalidUrl("Server URL cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.extend(NOTIFICATIONS_PATH.trim_matches('/').split('/'));
            if segments.is_empty() {
                path.push("");
            } else {
                path.extend(segments);
            }
        }
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().ok_or(SyncError::MissingToken)?;
        debug!(%method, %url, "notification request");
        let response = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|error| SyncError::Network(format!("{method} request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response body>".to_string());
            return Err(SyncError::Http {
                status: status.as_u16(),
                body: truncate_message(&body, LOG_BODY_MAX_CHARS),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl NotificationApi for RestApi {
    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let url = self.endpoint(&[])?;
        let response = self.send(Method::GET, url).await?;
        let wire = response
            .json::<SnapshotWire>()
            .await
            .map_err(|error| SyncError::decode("notification snapshot", error))?;
        Ok(wire.into())
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&[id, "read"])?;
        self.send(Method::POST, url).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        let url = self.endpoint(&["read-all"])?;
        self.send(Method::POST, url).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&[id])?;
        self.send(Method::DELETE, url).await?;
        Ok(())
    }
}
