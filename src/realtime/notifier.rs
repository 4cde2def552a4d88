//! Broadcast of committed changes to interested readers

use tokio::sync::broadcast;

use super::events::{ChangeEvent, ChangeFilter};

const CHANNEL_CAPACITY: usize = 1000;

/// Fans change events out to every subscriber
///
/// Publishing never blocks and never fails; with no subscribers the event is
/// dropped.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to the events matching `filter` only
    pub fn subscribe_filtered(&self, filter: ChangeFilter) -> FilteredReceiver {
        FilteredReceiver {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

pub struct FilteredReceiver {
    rx: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl FilteredReceiver {
    /// Next matching event; `None` once the notifier is gone
    ///
    /// A lagging receiver skips the events it missed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Change subscriber lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::EventType;
    use crate::types::Collection;

    #[tokio::test]
    async fn test_filtered_subscription() {
        let notifier = ChangeNotifier::new();
        let mut venues = notifier.subscribe_filtered(ChangeFilter::collection(Collection::Venues));
        let mut all = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.publish(ChangeEvent::inserted(Collection::Guests, 1));
        notifier.publish(ChangeEvent::updated(Collection::Venues, 2));

        let event = venues.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::RecordUpdated);
        assert_eq!(event.local_id, Some(2));

        assert_eq!(all.recv().await.unwrap().collection, Collection::Guests);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = ChangeNotifier::default();
        notifier.publish(ChangeEvent::deleted(Collection::Jobs, 1));
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
