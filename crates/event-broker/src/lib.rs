//! The Event Broker (Component D): fans out `Event`s published by the
//! Dispatcher to every connected `/api/events` subscriber (§4.4).
//!
//! Built directly on `tokio::sync::broadcast`, whose ring-buffer channel
//! already gives the policy this needs: once a slow subscriber's
//! queue is full, the oldest buffered message is dropped to make room for
//! the new one, and that subscriber's next `recv()` reports how many it
//! missed via `RecvError::Lagged`. The broker turns that lag count into the
//! cumulative drop counter exposed to metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use openfero_core::Event;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// Default per-subscriber channel capacity (§4.4).
pub const DEFAULT_CAPACITY: usize = 64;

/// Central broadcaster. Cheap to clone — internally just an `Arc`-backed
/// `broadcast::Sender` plus a shared drop counter.
#[derive(Clone)]
pub struct EventBroker {
    sender: broadcast::Sender<Event>,
    dropped: std::sync::Arc<AtomicU64>,
}

impl EventBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        EventBroker {
            sender,
            dropped: std::sync::Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publishes an event to every current subscriber. A `SendError` here
    /// only means there are currently zero subscribers, which is routine
    /// (no client connected to `/api/events` yet) and not logged as a
    /// failure.
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Registers a new subscriber and returns an async stream of events it
    /// will receive from this point on. Lag (dropped messages) is folded
    /// into the broker's cumulative counter and the stream continues rather
    /// than terminating, matching the "never hang the SSE connection on a
    /// slow client" requirement (§4.4).
    pub fn subscribe(&self) -> impl Stream<Item = Event> + Send + 'static {
        let rx = self.sender.subscribe();
        let dropped = self.dropped.clone();
        BroadcastStream::new(rx).filter_map(move |item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                dropped.fetch_add(n, Ordering::Relaxed);
                warn!(skipped = n, "event broker subscriber lagged, dropping oldest events");
                None
            }
        })
    }

    /// Number of events dropped across all subscribers so far, for the
    /// `broker_dropped_events_total` metric.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        EventBroker::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openfero_core::AlertStoreEntry;
    use std::collections::BTreeMap;

    fn sample_event() -> Event {
        let mut labels = BTreeMap::new();
        labels.insert("alertname".to_string(), "DiskFull".to_string());
        let alert = openfero_core::Alert {
            labels,
            annotations: BTreeMap::new(),
            starts_at: None,
            ends_at: None,
        };
        let entry = AlertStoreEntry::new(alert, openfero_core::AlertStatus::Firing, chrono::Utc::now());
        Event::AlertNew(entry)
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let broker = EventBroker::new(4);
        let stream = broker.subscribe();
        tokio::pin!(stream);

        broker.publish(sample_event());

        let received = stream.next().await.unwrap();
        assert_eq!(received.type_name(), "alert:new");
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_and_counts_it() {
        let broker = EventBroker::new(2);
        let stream = broker.subscribe();
        tokio::pin!(stream);

        for _ in 0..5 {
            broker.publish(sample_event());
        }

        // Draining should eventually surface fewer than 5 events, with the
        // gap reflected in the drop counter.
        let mut received = 0;
        while tokio::time::timeout(std::time::Duration::from_millis(50), stream.next())
            .await
            .ok()
            .flatten()
            .is_some()
        {
            received += 1;
        }
        assert!(received < 5);
        assert!(broker.dropped_count() > 0);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let broker = EventBroker::new(4);
        broker.publish(sample_event());
    }
}
