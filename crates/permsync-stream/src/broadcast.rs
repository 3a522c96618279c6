//! Multi-subscriber fan-out of change events.
//!
//! Built on a `tokio::sync::broadcast` channel. `publish` never waits on
//! consumers. A subscriber that falls more than the channel capacity behind
//! loses its own oldest events, which surface as a lag count on its
//! [`Subscription`]; other subscribers are unaffected. No history is kept:
//! a new subscriber sees events published after it attached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use permsync_core::ChangeEvent;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

/// Broadcaster settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Events buffered per subscriber before the oldest are dropped.
    /// Rounded up to a power of two by the channel.
    pub subscriber_queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
        }
    }
}

/// The event stream. Cheap to clone; clones share subscribers.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<ChangeEvent>,
    next_id: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        // A zero capacity would panic in the channel constructor.
        let (sender, _) = broadcast::channel(config.subscriber_queue_capacity.max(1));
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach a subscriber. It receives events published from now on.
    pub fn subscribe(&self, server_id: impl Into<String>) -> Subscription {
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let server_id = server_id.into();
        tracing::debug!(subscriber_id, server_id = %server_id, "subscriber attached");

        Subscription {
            receiver: self.sender.subscribe(),
            server_id,
            subscriber_id,
            dropped: 0,
        }
    }

    /// Deliver `event` to every attached subscriber. Never blocks on
    /// consumers. Returns the number of subscribers it was queued for.
    pub fn publish(&self, event: &ChangeEvent) -> usize {
        // Sending with no receivers is not a failure here.
        self.sender.send(event.clone()).unwrap_or(0)
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}

/// One consumer's view of the stream. Dropping it detaches the subscriber.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    server_id: String,
    subscriber_id: u64,
    dropped: u64,
}

impl Subscription {
    /// Wait for the next event. `None` once the broadcaster is gone and
    /// every buffered event has been taken.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is buffered.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Take every buffered event.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Events discarded for this subscriber because it fell behind.
    /// Counted as they are discovered, so this is current after a receive.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Identifier of the server that opened this subscription.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn subscriber_id(&self) -> u64 {
        self.subscriber_id
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        tracing::warn!(
            subscriber_id = self.subscriber_id,
            server_id = %self.server_id,
            skipped,
            "subscriber lagging, oldest events dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permsync_core::{reason, PlayerId};

    fn event(n: i64) -> ChangeEvent {
        ChangeEvent::refresh(PlayerId::from_bytes([1; 16]), reason::EXPIRY, n)
    }

    #[tokio::test]
    async fn test_publish_delivers_to_all_subscribers() {
        let broadcaster = Broadcaster::default();
        let mut a = broadcaster.subscribe("a");
        let mut b = broadcaster.subscribe("b");

        assert_eq!(broadcaster.publish(&event(1)), 2);
        assert_eq!(a.recv().await.unwrap().occurred_at, 1);
        assert_eq!(b.recv().await.unwrap().occurred_at, 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_returns_zero() {
        let broadcaster = Broadcaster::default();
        assert_eq!(broadcaster.publish(&event(1)), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_no_history() {
        let broadcaster = Broadcaster::default();
        broadcaster.publish(&event(1));
        let mut sub = broadcaster.subscribe("late");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_only_for_itself() {
        let broadcaster = Broadcaster::new(BroadcastConfig {
            subscriber_queue_capacity: 2,
        });
        let mut slow = broadcaster.subscribe("slow");
        let mut fast = broadcaster.subscribe("fast");

        for n in 0..3 {
            broadcaster.publish(&event(n));
            assert_eq!(fast.recv().await.unwrap().occurred_at, n);
        }

        let kept: Vec<i64> = slow.drain().into_iter().map(|e| e.occurred_at).collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(slow.dropped(), 1);
        assert_eq!(fast.dropped(), 0);
    }

    #[tokio::test]
    async fn test_lagged_recv_skips_to_oldest_kept_event() {
        let broadcaster = Broadcaster::new(BroadcastConfig {
            subscriber_queue_capacity: 2,
        });
        let mut sub = broadcaster.subscribe("s");
        for n in 0..5 {
            broadcaster.publish(&event(n));
        }

        assert_eq!(sub.recv().await.unwrap().occurred_at, 3);
        assert_eq!(sub.dropped(), 3);
        assert_eq!(sub.recv().await.unwrap().occurred_at, 4);
    }

    #[tokio::test]
    async fn test_subscribe_drop_unregisters_subscriber() {
        let broadcaster = Broadcaster::default();
        let sub = broadcaster.subscribe("s");
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_ids_are_distinct() {
        let broadcaster = Broadcaster::default();
        let a = broadcaster.subscribe("a");
        let b = broadcaster.clone().subscribe("b");
        assert_ne!(a.subscriber_id(), b.subscriber_id());
        assert_eq!(b.server_id(), "b");
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let broadcaster = Broadcaster::default();
        let mut sub = broadcaster.subscribe("s");

        let publisher = broadcaster.clone();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            publisher.publish(&event(7));
        });

        let received = sub.recv().await.unwrap();
        assert_eq!(received.occurred_at, 7);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_ends_when_broadcaster_dropped() {
        let broadcaster = Broadcaster::default();
        let mut sub = broadcaster.subscribe("s");
        broadcaster.publish(&event(1));
        drop(broadcaster);

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
