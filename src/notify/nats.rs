//! Publishes notification events to NATS for the email worker to deliver.

use async_trait::async_trait;
use tracing::debug;

use super::{NotificationSender, NotifyError};
use crate::domain::events::NotificationEvent;

#[derive(Clone)]
pub struct NatsNotifier {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsNotifier {
    pub fn new(client: async_nats::Client, subject_prefix: impl Into<String>) -> Self {
        Self { client, subject_prefix: subject_prefix.into() }
    }

    pub fn subject(&self, event: &NotificationEvent) -> String {
        format!("{}.{}", self.subject_prefix, event.topic())
    }
}

#[async_trait]
impl NotificationSender for NatsNotifier {
    async fn send(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        let subject = self.subject(&event);
        let payload = serde_json::to_vec(&event)?;
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))?;
        debug!(%subject, to = event.recipient(), "Notification published");
        Ok(())
    }
}
