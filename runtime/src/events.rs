//! Event publishers shipped with the runtime.

use rwa_issuer_core::{EventPublisher, IssuerEvent};
use tokio::sync::broadcast;

/// Fan-out publisher backed by a tokio broadcast channel.
///
/// Slow subscribers that fall more than `capacity` events behind receive
/// `RecvError::Lagged` and skip ahead; publishing never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<IssuerEvent>,
}

impl BroadcastEventPublisher {
    /// Create a publisher buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<IssuerEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: IssuerEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }
}

/// Publisher that writes every event to the log as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: IssuerEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(event = event.name(), payload = %json, "Issuer event"),
            Err(e) => {
                tracing::warn!(event = event.name(), error = %e, "Failed to serialize event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use rwa_issuer_core::RequestId;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let publisher = BroadcastEventPublisher::new(16);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        let sent = IssuerEvent::RequestSent {
            request_id: RequestId::from_u64(1),
        };
        let cancelled = IssuerEvent::RequestCancelled {
            request_id: RequestId::from_u64(1),
        };
        publisher.publish(sent.clone());
        publisher.publish(cancelled.clone());

        assert_eq!(first.recv().await.unwrap(), sent);
        assert_eq!(first.recv().await.unwrap(), cancelled);
        assert_eq!(second.recv().await.unwrap(), sent);
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let publisher = BroadcastEventPublisher::default();
        publisher.publish(IssuerEvent::RequestSent {
            request_id: RequestId::from_u64(1),
        });
        TracingEventPublisher.publish(IssuerEvent::RequestSent {
            request_id: RequestId::from_u64(1),
        });
    }
}
