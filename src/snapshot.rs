use tracing::{debug, warn};

use crate::{api::NotificationApi, store::SharedStore};

/// Fetches the REST snapshot and merges it into the store.
///
/// Failures are logged and swallowed; the store is left as it was. Returns whether the
/// store was updated.
pub async fn load_snapshot(api: &dyn NotificationApi, store: &SharedStore) -> bool {
    let snapshot = match api.fetch_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(%error, "failed to fetch notification snapshot");
            return false;
        }
    };

    if store.is_closed() {
        debug!("session ended before snapshot arrived; discarding");
        return false;
    }
    debug!(
        count = snapshot.notifications.len(),
        unread = snapshot.unread_count,
        "notification snapshot fetched"
    );
    store.replace_all(snapshot.notifications, snapshot.unread_count)
}
