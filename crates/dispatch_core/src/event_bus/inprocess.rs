//! In-process [`EventBus`] backed by one `tokio::sync::broadcast` channel
//! per topic, created lazily on first publish or subscribe.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{BusMessage, EventBus, Subscription};
use crate::error::CoreResult;

/// Per-topic channel capacity. A slow subscriber that falls this far behind
/// starts dropping messages (reported as a `Lagged` error on recv).
const CHANNEL_CAPACITY: usize = 256;

pub struct InProcessBus {
    channels: DashMap<String, broadcast::Sender<Arc<BusMessage>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Arc<BusMessage>> {
        match self.channels.entry(channel.to_string()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
                e.insert(tx.clone());
                tx
            }
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InProcessBus {
    async fn publish(&self, channel: &str, payload: Value) -> CoreResult<usize> {
        let sender = self.sender_for(channel);
        let message = Arc::new(BusMessage { channel: channel.to_string(), payload });
        // `send` errors only when there are zero receivers; that is a valid
        // "nobody is listening" outcome for this bus, not a failure.
        Ok(sender.send(message).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> CoreResult<Subscription> {
        let sender = self.sender_for(channel);
        Ok(Subscription::new(sender.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_before_any_subscriber_reaches_zero() {
        let bus = InProcessBus::new();
        let reached = bus.publish("driver:abc", serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(reached, 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_message() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe("available-drivers:cab").await.unwrap();
        let reached = bus
            .publish("available-drivers:cab", serde_json::json!({"rideId": "r1"}))
            .await
            .unwrap();
        assert_eq!(reached, 1);
        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.channel, "available-drivers:cab");
        assert_eq!(msg.payload["rideId"], "r1");
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = InProcessBus::new();
        let mut a = bus.subscribe("driver:1").await.unwrap();
        let mut b = bus.subscribe("driver:1").await.unwrap();
        let reached = bus.publish("driver:1", serde_json::json!(null)).await.unwrap();
        assert_eq!(reached, 2);
        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }
}
