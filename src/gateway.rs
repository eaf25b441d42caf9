//! User-initiated mutations. Each one is confirmed by the server before the store
//! changes; a failed call leaves the inbox exactly as it was.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    api::NotificationApi,
    error::{Result, SyncError},
    store::SharedStore,
};

#[derive(Clone)]
pub struct MutationGateway {
    api: Arc<dyn NotificationApi>,
    store: SharedStore,
}

impl MutationGateway {
    pub fn new(api: Arc<dyn NotificationApi>, store: SharedStore) -> Self {
        Self { api, store }
    }

    pub async fn mark_as_read(&self, id: &str) -> Result<()> {
        let id = validate_id(id)?;
        debug!(id, "mark read requested");
        if let Err(error) = self.api.mark_read(id).await {
            warn!(id, %error, "mark read failed; inbox unchanged");
            return Err(error);
        }
        self.ensure_open()?;
        self.store.mark_read(id);
        Ok(())
    }

    pub async fn mark_all_as_read(&self) -> Result<()> {
        debug!("mark all read requested");
        if let Err(error) = self.api.mark_all_read().await {
            warn!(%error, "mark all read failed; inbox unchanged");
            return Err(error);
        }
        self.ensure_open()?;
        let changed = self.store.mark_all_read();
        info!(changed, "marked all notifications read");
        Ok(())
    }

    /// A 404 from the server counts as confirmation: the entry is already gone there.
    pub async fn delete_notification(&self, id: &str) -> Result<()> {
        let id = validate_id(id)?;
        debug!(id, "delete requested");
        match self.api.delete(id).await {
            Ok(()) => {}
            Err(error) if error.status() == Some(404) => {
                debug!(id, "delete answered 404; treating as already removed");
            }
            Err(error) => {
                warn!(id, %error, "delete failed; inbox unchanged");
                return Err(error);
            }
        }
        self.ensure_open()?;
        self.store.remove(id);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.store.is_closed() {
            debug!("session ended before confirmation arrived; discarding");
            return Err(SyncError::SessionClosed);
        }
        Ok(())
    }
}

fn validate_id(raw: &str) -> Result<&str> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(SyncError::InvalidId(format!("{raw:?} is blank")));
    }
    Ok(id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{tests::notification, Snapshot};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeApi {
        snapshot: Mutex<Option<Snapshot>>,
        fail_with: Mutex<Option<u16>>,
        pub(crate) calls: Mutex<Vec<String>>,
    }

    impl FakeApi {
        pub(crate) fn with_snapshot(snapshot: Snapshot) -> Self {
            let api = Self::default();
            *api.snapshot.lock().unwrap() = Some(snapshot);
            api
        }

        pub(crate) fn failing(status: u16) -> Self {
            let api = Self::default();
            *api.fail_with.lock().unwrap() = Some(status);
            api
        }

        fn call(&self, name: String) -> Result<()> {
            self.calls.lock().unwrap().push(name);
            match *self.fail_with.lock().unwrap() {
                Some(status) => Err(SyncError::Http {
                    status,
                    body: "mocked".to_string(),
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn fetch_snapshot(&self) -> Result<Snapshot> {
            self.call("GET /".to_string())?;
            Ok(self.snapshot.lock().unwrap().clone().unwrap_or(Snapshot {
                notifications: Vec::new(),
                unread_count: 0,
            }))
        }

        async fn mark_read(&self, id: &str) -> Result<()> {
            self.call(format!("POST /{id}/read"))
        }

        async fn mark_all_read(&self) -> Result<()> {
            self.call("POST /read-all".to_string())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.call(format!("DELETE /{id}"))
        }
    }

    fn setup(api: FakeApi, unread: &[(&str, u32)]) -> (MutationGateway, SharedStore, Arc<FakeApi>) {
        let store = SharedStore::new(100);
        for (id, minute) in unread {
            store.push(notification(id, *minute, false));
        }
        let api = Arc::new(api);
        (MutationGateway::new(api.clone(), store.clone()), store, api)
    }

    #[tokio::test]
    async fn confirmed_mark_read_updates_store() {
        let (gateway, store, api) = setup(FakeApi::default(), &[("n1", 1)]);
        gateway.mark_as_read("n1").await.unwrap();
        assert_eq!(store.unread_count(), 0);
        assert_eq!(*api.calls.lock().unwrap(), ["POST /n1/read"]);
    }

    #[tokio::test]
    async fn failed_mark_read_leaves_store() {
        let (gateway, store, api) = setup(FakeApi::failing(500), &[("n1", 1)]);
        let error = gateway.mark_as_read("n1").await.unwrap_err();
        assert_eq!(error.status(), Some(500));
        assert_eq!(*api.calls.lock().unwrap(), ["POST /n1/read"]);
        assert_eq!(store.unread_count(), 1);
        assert!(!store.view().notifications[0].is_read);
    }

    #[tokio::test]
    async fn mark_all_read_confirm_then_apply() {
        let (gateway, store, _api) = setup(FakeApi::default(), &[("n1", 1), ("n2", 2)]);
        gateway.mark_all_as_read().await.unwrap();
        assert_eq!(store.unread_count(), 0);

        let (gateway, store, _api) = setup(FakeApi::failing(503), &[("n1", 1), ("n2", 2)]);
        assert!(gateway.mark_all_as_read().await.is_err());
        assert_eq!(store.unread_count(), 2);
    }

    #[tokio::test]
    async fn delete_removes_on_success_and_on_404() {
        let (gateway, store, _api) = setup(FakeApi::default(), &[("n1", 1), ("n2", 2)]);
        gateway.delete_notification("n1").await.unwrap();
        assert_eq!(store.view().notifications.len(), 1);
        assert_eq!(store.unread_count(), 1);

        let (gateway, store, _api) = setup(FakeApi::failing(404), &[("n1", 1)]);
        gateway.delete_notification("n1").await.unwrap();
        assert!(store.view().notifications.is_empty());

        let (gateway, store, _api) = setup(FakeApi::failing(500), &[("n1", 1)]);
        assert!(gateway.delete_notification("n1").await.is_err());
        assert_eq!(store.unread_count(), 1);
    }

    #[tokio::test]
    async fn blank_id_is_rejected_without_a_request() {
        let (gateway, _store, api) = setup(FakeApi::default(), &[]);
        assert!(matches!(
            gateway.mark_as_read("  ").await,
            Err(SyncError::InvalidId(_))
        ));
        assert!(matches!(
            gateway.delete_notification("").await,
            Err(SyncError::InvalidId(_))
        ));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirmation_after_teardown_is_discarded() {
        let (gateway, store, _api) = setup(FakeApi::default(), &[("n1", 1)]);
        store.close();
        assert_eq!(
            gateway.mark_as_read("n1").await,
            Err(SyncError::SessionClosed)
        );
        assert_eq!(store.unread_count(), 1);
    }
}
