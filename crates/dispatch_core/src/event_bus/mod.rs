//! The "pub/sub fan-out" external collaborator (spec §1) — e.g. a ride
//! offer broadcast to every nearby driver's socket, or a location update
//! streamed to a passenger's tracking view. Modeled as a trait so a real
//! deployment can swap in Redis/NATS/whatever without this crate knowing.

pub mod inprocess;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreResult;

/// A published message: topic plus a JSON payload, already serialized by
/// the caller (spec wire payloads are the boundary — this crate never
/// assumes a specific transport framing beyond JSON).
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: String,
    pub payload: Value,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes to `channel`. Returns the number of live subscribers the
    /// message reached (0 is not an error — spec §4.5 logs it but does not
    /// fail dispatch on a channel with no listeners).
    async fn publish(&self, channel: &str, payload: Value) -> CoreResult<usize>;

    /// Subscribes to `channel`, returning a handle that yields messages
    /// published after this call. Messages published before subscribing
    /// are not replayed.
    async fn subscribe(&self, channel: &str) -> CoreResult<Subscription>;
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    receiver: tokio::sync::broadcast::Receiver<Arc<BusMessage>>,
}

impl Subscription {
    pub fn new(receiver: tokio::sync::broadcast::Receiver<Arc<BusMessage>>) -> Self {
        Self { receiver }
    }

    /// Awaits the next message. Returns `None` once the channel is closed
    /// (the publisher side was dropped) or a slow-receiver lag is detected
    /// — spec §4.5 treats a dropped broadcast the same as zero reach.
    pub async fn recv(&mut self) -> Option<Arc<BusMessage>> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event bus subscriber lagged, dropping skipped messages");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
