use std::sync::{Arc, Mutex};

use chrono::Timelike;
use tracing::{debug, info, warn};

use crate::{
    consts::NOTIFY_BODY_MAX_CHARS,
    error::Result,
    model::{Notification, Priority},
    settings::Settings,
    util::truncate_message,
};

/// OS notification permission, mirroring the browser's tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

pub trait NativeNotifier: Send + Sync {
    fn permission(&self) -> Permission;

    fn request_permission(&self) -> Permission;

    fn show(&self, title: &str, body: &str) -> Result<()>;
}

/// Raises OS notifications for pushed entries, gated by permission and the user's filters.
pub struct DesktopNotifier {
    native: Arc<dyn NativeNotifier>,
    permission: Mutex<Option<Permission>>,
    enabled: bool,
    min_priority: Priority,
    quiet_hours: (Option<u8>, Option<u8>),
}

impl DesktopNotifier {
    pub fn new(native: Arc<dyn NativeNotifier>, settings: &Settings) -> Self {
        Self {
            native,
            permission: Mutex::new(None),
            enabled: settings.desktop_notifications,
            min_priority: settings.min_priority,
            quiet_hours: (settings.quiet_hours_start, settings.quiet_hours_end),
        }
    }

    /// Resolves permission for the session. A never-asked state triggers exactly one prompt;
    /// whatever comes back is what the session lives with.
    pub fn prepare(&self) -> Permission {
        let Ok(mut cached) = self.permission.lock() else {
            return Permission::Denied;
        };
        if let Some(permission) = *cached {
            return permission;
        }

        let mut permission = self.native.permission();
        if permission == Permission::Default && self.enabled {
            permission = self.native.request_permission();
            info!(?permission, "desktop notification permission requested");
        }
        *cached = Some(permission);
        permission
    }

    pub fn permission(&self) -> Option<Permission> {
        self.permission.lock().ok().and_then(|cached| *cached)
    }

    /// Returns `true` if a native notification was raised.
    pub fn notify(&self, notification: &Notification) -> bool {
        if !self.enabled {
            return false;
        }
        if self.permission() != Some(Permission::Granted) {
            return false;
        }
        if notification.priority < self.min_priority {
            debug!(id = %notification.id, "below min priority; not raised");
            return false;
        }
        let hour = chrono::Local::now().hour() as u8;
        if is_quiet_hour(hour, self.quiet_hours.0, self.quiet_hours.1) {
            debug!(id = %notification.id, "quiet hours; not raised");
            return false;
        }

        let body = truncate_message(
            notification.message.as_deref().unwrap_or_default(),
            NOTIFY_BODY_MAX_CHARS,
        );
        match self.native.show(&notification.title, &body) {
            Ok(()) => true,
            Err(error) => {
                warn!(id = %notification.id, %error, "failed to show desktop notification");
                false
            }
        }
    }
}

pub(crate) fn is_quiet_hour(now: u8, start: Option<u8>, end: Option<u8>) -> bool {
    let (start, end) = match (start, end) {
        (Some(start), Some(end)) => (start, end),
        _ => return false,
    };

    if start == end {
        return true;
    }
    if start < end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

/// The native notifier for the current platform.
pub fn platform_notifier() -> Arc<dyn NativeNotifier> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(MacNotifier)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(LogNotifier)
    }
}

/// Fallback for platforms without a native backend: notifications go to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NativeNotifier for LogNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, title: &str, body: &str) -> Result<()> {
        info!(title, body, "notification");
        Ok(())
    }
}

#[cfg(target_os = "macos")]
#[derive(Debug, Default)]
pub struct MacNotifier;

#[cfg(target_os = "macos")]
impl NativeNotifier for MacNotifier {
    // macOS asks the user itself on first delivery; nothing to gate here.
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn show(&self, title: &str, body: &str) -> Result<()> {
        let title = title.to_string();
        let body = body.to_string();
        std::thread::spawn(move || {
            ensure_macos_notification_application();
            let mut notification = mac_notification_sys::Notification::new();
            notification
                .title(&title)
                .message(&body)
                .default_sound()
                .asynchronous(true);
            if let Err(error) = notification.send() {
                warn!(%error, "failed to show macOS notification");
            }
        });
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn ensure_macos_notification_application() {
    static INIT_NOTIFICATION_APP: std::sync::Once = std::sync::Once::new();
    INIT_NOTIFICATION_APP.call_once(|| {
        for bundle_id in ["com.apple.Terminal", "com.apple.Finder"] {
            match mac_notification_sys::set_application(bundle_id) {
                Ok(_) => return,
                Err(error) => {
                    debug!(bundle_id, %error, "failed to set macOS notification bundle id");
                }
            }
        }
    });
}
