//! Local notification delivery.

use async_trait::async_trait;
use tracing::info;

/// Notification permission as granted by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Not asked yet
    Default,
    Granted,
    Denied,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask the user. Only meaningful while the permission is `Default`.
    async fn request_permission(&self) -> Permission;

    async fn show(&self, title: &str, body: &str);
}

/// Writes notifications to the log. Always permitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn show(&self, title: &str, body: &str) {
        info!(title = %title, body = %body, "Notification");
    }
}
