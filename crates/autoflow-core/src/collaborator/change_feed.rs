//! Row change subscription interface for `database_event` triggers.

use autoflow_types::record::ChangeEvent;
use tokio::sync::broadcast;

/// Publishes row changes per table to any number of subscribers.
///
/// Subscribing returns a broadcast receiver; dropping it unsubscribes.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent>;

    fn publish(&self, event: ChangeEvent);

    /// Number of live subscribers for a table.
    fn subscriber_count(&self, table: &str) -> usize;
}

// ---------------------------------------------------------------------------
// In-process implementation
// ---------------------------------------------------------------------------

/// Capacity of each per-table channel. Slow subscribers past this lag and
/// skip events (reported as `RecvError::Lagged`).
const CHANNEL_CAPACITY: usize = 256;

/// Change feed backed by one `tokio::sync::broadcast` channel per table.
///
/// Publishing to a table nobody subscribed to is a no-op.
#[derive(Default)]
pub struct BroadcastChangeFeed {
    channels: dashmap::DashMap<String, broadcast::Sender<ChangeEvent>>,
}

impl BroadcastChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeFeed for BroadcastChangeFeed {
    fn subscribe(&self, table: &str) -> broadcast::Receiver<ChangeEvent> {
        self.channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn publish(&self, event: ChangeEvent) {
        if let Some(sender) = self.channels.get(&event.table) {
            // Err only means no live receivers.
            let delivered = sender.send(event).unwrap_or(0);
            tracing::trace!(delivered, "change event published");
        }
    }

    fn subscriber_count(&self, table: &str) -> usize {
        self.channels
            .get(table)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_types::record::ChangeKind;
    use serde_json::json;

    fn event(table: &str) -> ChangeEvent {
        ChangeEvent {
            table: table.to_string(),
            kind: ChangeKind::Insert,
            record_id: "r1".to_string(),
            old: None,
            new: Some(json!({"id": "r1"})),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_table_subscribers_only() {
        let feed = BroadcastChangeFeed::new();
        let mut jobs = feed.subscribe("jobs");
        let mut other = feed.subscribe("invoices");

        feed.publish(event("jobs"));
        assert_eq!(jobs.recv().await.unwrap().record_id, "r1");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_subscriber_count_tracks_drops() {
        let feed = BroadcastChangeFeed::new();
        assert_eq!(feed.subscriber_count("jobs"), 0);
        let rx = feed.subscribe("jobs");
        let _rx2 = feed.subscribe("jobs");
        assert_eq!(feed.subscriber_count("jobs"), 2);
        drop(rx);
        assert_eq!(feed.subscriber_count("jobs"), 1);

        // No subscribers: publishing is a silent no-op.
        feed.publish(event("nobody"));
    }
}
