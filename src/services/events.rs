//! Publishes domain events to NATS when a connection is configured.

use tracing::{debug, warn};

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self::default() }

    /// Fire and forget; a failed publish is logged and dropped.
    pub async fn publish(&self, event: &DomainEvent) {
        let subject = event.subject();
        let Some(client) = &self.nats else {
            debug!(%subject, "no event bus configured");
            return;
        };
        let payload = match serde_json::to_vec(event) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            warn!(%subject, error = %e, "failed to publish event");
        }
    }
}
