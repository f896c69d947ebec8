//! The "shared key-value store" external collaborator (spec §1) that lets
//! the Driver State Store and Event Bus scale horizontally across process
//! instances (spec §4.3, §4.7, §9: "Selection at startup, not per call").
//!
//! A single-process deployment never needs this — [`DriverStateStore`] and
//! [`crate::event_bus::inprocess::InProcessBus`] are already correct and
//! faster without it. [`InProcessSharedStore`] exists so the trait has a
//! working, test-exercised implementation; a production multi-instance
//! deployment would supply a Redis-backed one instead.
//!
//! [`DriverStateStore`]: crate::driver_store::DriverStateStore

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;

use crate::error::CoreResult;
use crate::event_bus::inprocess::InProcessBus;
use crate::event_bus::{EventBus, Subscription};

/// Key-value, set, and pub/sub operations backing a horizontally-scaled
/// Driver State Store and Event Bus. Shaped after the subset of Redis a
/// typical deployment actually uses for this workload — strings, hashes,
/// sets, and channels — not a general KV abstraction.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> CoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> CoreResult<()>;

    async fn hget(&self, hash: &str, field: &str) -> CoreResult<Option<String>>;
    async fn hset(&self, hash: &str, field: &str, value: &str) -> CoreResult<()>;

    /// Adds `member` to the set at `key` (e.g. the driver-id set for an H3
    /// cell). Idempotent.
    async fn sadd(&self, key: &str, member: &str) -> CoreResult<()>;
    /// Removes `member` from the set at `key`. A no-op if absent.
    async fn srem(&self, key: &str, member: &str) -> CoreResult<()>;
    async fn smembers(&self, key: &str) -> CoreResult<Vec<String>>;

    /// Moves `member` from `from_key`'s set to `to_key`'s set in one
    /// pipelined call (spec §4.3: "the move is executed in a single
    /// pipelined batch"). The default implementation is two round trips and
    /// is not atomic across them; a real Redis-backed store overrides this
    /// with a single `MULTI`/`EXEC` or Lua script.
    async fn smove(&self, from_key: &str, to_key: &str, member: &str) -> CoreResult<()> {
        self.srem(from_key, member).await?;
        self.sadd(to_key, member).await
    }

    async fn publish(&self, channel: &str, payload: Value) -> CoreResult<usize>;
    async fn subscribe(&self, channel: &str) -> CoreResult<Subscription>;
}

/// Single-instance reference implementation backed by `dashmap`. Pub/sub is
/// delegated to an embedded [`InProcessBus`] rather than reimplemented, since
/// the semantics (fire-and-forget, at-most-once, no replay — spec §4.7) are
/// identical.
#[derive(Default)]
pub struct InProcessSharedStore {
    strings: DashMap<String, String>,
    hashes: DashMap<String, DashMap<String, String>>,
    sets: DashMap<String, DashSet<String>>,
    bus: Arc<InProcessBus>,
}

impl InProcessSharedStore {
    pub fn new() -> Self {
        Self { bus: Arc::new(InProcessBus::new()), ..Default::default() }
    }
}

#[async_trait]
impl SharedStore for InProcessSharedStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.strings.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        self.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, hash: &str, field: &str) -> CoreResult<Option<String>> {
        Ok(self.hashes.get(hash).and_then(|h| h.get(field).map(|v| v.clone())))
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> CoreResult<()> {
        self.hashes
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> CoreResult<()> {
        self.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> CoreResult<()> {
        if let Some(set) = self.sets.get(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .sets
            .get(key)
            .map(|s| s.iter().map(|m| m.clone()).collect())
            .unwrap_or_default())
    }

    async fn publish(&self, channel: &str, payload: Value) -> CoreResult<usize> {
        self.bus.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> CoreResult<Subscription> {
        self.bus.subscribe(channel).await
    }
}
