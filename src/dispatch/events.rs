use tokio::sync::broadcast;

use crate::delivery::DeliveryResult;

/// Fan-out of terminal delivery results.
///
/// Publishing never blocks; subscribers that fall behind observe
/// `RecvError::Lagged` and skip ahead.
#[derive(Clone)]
pub struct DeliveryEvents {
    tx: broadcast::Sender<DeliveryResult>,
}

impl DeliveryEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryResult> {
        self.tx.subscribe()
    }

    /// Publish a result if it is terminal; non-terminal snapshots are dropped.
    pub fn publish(&self, result: &DeliveryResult) {
        if !result.state.is_terminal() {
            return;
        }
        // no subscribers is fine
        let _ = self.tx.send(result.clone());
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{
        Channel, DeliveryJob, DeliveryRequest, DeliveryResult, DeliveryStatus,
    };

    fn result(state: DeliveryStatus) -> DeliveryResult {
        let job = DeliveryJob::new(DeliveryRequest::builder(Channel::Email, "a@x.com", "welcome").build());
        DeliveryResult::with_state(&job, state)
    }

    #[tokio::test]
    async fn test_only_terminal_results_are_published() {
        let events = DeliveryEvents::new(8);
        let mut rx = events.subscribe();

        events.publish(&result(DeliveryStatus::Pending));
        events.publish(&result(DeliveryStatus::Delivered));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.state, DeliveryStatus::Delivered);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let events = DeliveryEvents::new(1);
        assert_eq!(events.subscriber_count(), 0);
        events.publish(&result(DeliveryStatus::DeadLettered));
    }
}
