// Event bus for domain events published after transitions commit

//! # Event System
//!
//! The workflow engine publishes a [`DomainEvent`] once a transition has been
//! committed. Subscribers (search indexing, analytics, webhooks) receive
//! events through a `tokio::sync::broadcast` channel.
//!
//! Publishing never fails a transition: when nobody is subscribed the event
//! is simply dropped, and slow subscribers see `RecvError::Lagged` instead of
//! blocking the engine.

use tokio::sync::broadcast;
use tracing::debug;

use crate::models::{ApplicationStatusChangedEvent, ApplicationSubmittedEvent, DomainEvent};

/// Default number of events buffered for slow subscribers
pub const DEFAULT_EVENT_BUFFER: usize = 1000;

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to all current subscribers
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: DomainEvent) -> usize {
        let name = event.name();
        let application_id = event.application_id();

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(event = name, %application_id, receivers, "event published");
                receivers
            }
            Err(_) => {
                debug!(event = name, %application_id, "event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn emit_status_changed(&self, event: ApplicationStatusChangedEvent) -> usize {
        self.publish(DomainEvent::ApplicationStatusChanged(event))
    }

    pub fn emit_submitted(&self, event: ApplicationSubmittedEvent) -> usize {
        self.publish(DomainEvent::ApplicationSubmitted(event))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn submitted() -> ApplicationSubmittedEvent {
        ApplicationSubmittedEvent {
            application_id: Uuid::new_v4(),
            applicant_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = submitted();
        assert_eq!(bus.emit_submitted(event.clone()), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, DomainEvent::ApplicationSubmitted(event));
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        assert_eq!(bus.emit_submitted(submitted()), 0);
    }

    #[test]
    fn test_slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();

        bus.emit_submitted(submitted());
        let latest = submitted();
        bus.emit_submitted(latest.clone());

        tokio_test::block_on(async {
            assert!(matches!(
                rx.recv().await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(1))
            ));
            assert_eq!(rx.recv().await.unwrap(), DomainEvent::ApplicationSubmitted(latest));
        });
    }
}
