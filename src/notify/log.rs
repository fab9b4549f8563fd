use async_trait::async_trait;
use tracing::info;

use super::{NotificationSender, NotifyError};
use crate::domain::events::NotificationEvent;

/// Writes notifications to the log instead of delivering them. Used when no bus is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        info!(to = event.recipient(), kind = event.topic(), "Notification (log only)");
        Ok(())
    }
}
