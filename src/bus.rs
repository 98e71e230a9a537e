//! Message bus - named-topic pub/sub, the only communication medium
//!
//! Each topic is backed by a tokio broadcast channel, created lazily on first
//! subscribe or publish. Components never hold references to each other; they
//! publish to and subscribe from topics on a shared `Bus`.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Default per-topic channel capacity (messages)
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Named-topic publish/subscribe bus
///
/// Supports two delivery modes: [`Bus::publish`] enqueues to every current
/// subscriber before returning (used for state transitions that must be
/// observable before the triggering call completes), and
/// [`Bus::publish_deferred`] enqueues from a spawned task after
/// currently-queued work (used for best-effort notifications).
pub struct Bus {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<Value>>>,
}

impl Bus {
    /// Create a new bus with the given per-topic capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "Bus::new: creating bus");
        Self {
            capacity,
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new bus with default per-topic capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Value> {
        if let Some(tx) = self.topics.read().expect("bus topic map poisoned").get(topic) {
            return tx.clone();
        }
        let mut topics = self.topics.write().expect("bus topic map poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to a topic
    ///
    /// Returns a receiver for all messages published after subscription.
    /// Earlier messages are not replayed; late joiners are expected to
    /// request a snapshot instead.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Value> {
        debug!(%topic, "Bus::subscribe: new subscriber");
        self.sender(topic).subscribe()
    }

    /// Publish a message to a topic, synchronous delivery mode
    ///
    /// The message is enqueued to every current subscriber before this call
    /// returns. Publishing to a topic with no subscribers is a silent no-op.
    pub fn publish(&self, topic: &str, payload: Value) {
        debug!(%topic, "Bus::publish");
        if let Some(tx) = self.topics.read().expect("bus topic map poisoned").get(topic) {
            // No subscribers is OK
            let _ = tx.send(payload);
        }
    }

    /// Publish a message to a topic, deferred delivery mode
    ///
    /// The message is enqueued from a spawned task, after any work already
    /// queued on the runtime.
    pub fn publish_deferred(&self, topic: &str, payload: Value) {
        debug!(%topic, "Bus::publish_deferred");
        let Some(tx) = self
            .topics
            .read()
            .expect("bus topic map poisoned")
            .get(topic)
            .cloned()
        else {
            return;
        };
        tokio::spawn(async move {
            let _ = tx.send(payload);
        });
    }

    /// Number of active subscribers on a topic
    ///
    /// Synchronous lookup; the RPC layer uses this for its no-handler
    /// fast-fail.
    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .expect("bus topic map poisoned")
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Drop topic entries with no remaining subscribers
    ///
    /// One-shot reply topics would otherwise accumulate in the topic map.
    pub fn prune(&self) {
        self.topics
            .write()
            .expect("bus topic map poisoned")
            .retain(|_, tx| tx.receiver_count() > 0);
    }

    /// Number of topics currently held in the map
    pub fn topic_count(&self) -> usize {
        self.topics.read().expect("bus topic map poisoned").len()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let bus = Bus::with_default_capacity();
        let mut rx = bus.subscribe("profile:updated");

        bus.publish("profile:updated", json!({"profileId": "alpha"}));

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg["profileId"], "alpha");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = Bus::with_default_capacity();
        // Must not panic or create a topic entry
        bus.publish("nobody:listens", json!(1));
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = Bus::with_default_capacity();
        let mut rx_a = bus.subscribe("a");
        let mut rx_b = bus.subscribe("b");

        bus.publish("a", json!("only-a"));

        assert_eq!(rx_a.recv().await.unwrap(), json!("only-a"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listener_count() {
        let bus = Bus::with_default_capacity();
        assert_eq!(bus.listener_count("t"), 0);

        let rx1 = bus.subscribe("t");
        assert_eq!(bus.listener_count("t"), 1);
        let rx2 = bus.subscribe("t");
        assert_eq!(bus.listener_count("t"), 2);

        drop(rx1);
        drop(rx2);
        assert_eq!(bus.listener_count("t"), 0);
    }

    #[tokio::test]
    async fn test_prune_drops_unused_topics() {
        let bus = Bus::with_default_capacity();
        let rx = bus.subscribe("keep");
        let rx2 = bus.subscribe("drop");
        drop(rx2);

        bus.prune();
        assert_eq!(bus.topic_count(), 1);
        assert_eq!(bus.listener_count("keep"), 1);
        drop(rx);
    }

    #[tokio::test]
    async fn test_deferred_publish_arrives_after_yield() {
        let bus = Bus::with_default_capacity();
        let mut rx = bus.subscribe("t");

        bus.publish_deferred("t", json!("later"));

        // Deferred delivery happens on the spawned task, so it becomes
        // visible only after the current task yields.
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg, json!("later"));
    }

    #[tokio::test]
    async fn test_sync_publish_visible_before_deferred() {
        let bus = Bus::with_default_capacity();
        let mut rx_sync = bus.subscribe("sync");
        let mut rx_def = bus.subscribe("deferred");

        bus.publish_deferred("deferred", json!(1));
        bus.publish("sync", json!(2));

        // The synchronous publish is already queued; the deferred one is not.
        assert_eq!(rx_sync.try_recv().unwrap(), json!(2));
        assert!(rx_def.try_recv().is_err());

        assert_eq!(rx_def.recv().await.unwrap(), json!(1));
    }
}
