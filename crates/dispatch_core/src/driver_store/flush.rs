//! Background task that drains [`DriverStateStore`]'s dirty set into the
//! persistent store on a fixed period, with bounded retry. Writers never
//! wait on this; a dropped update after exhausting retries only costs one
//! stale location read, never correctness (spec §4.3, §5).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::DriverStateStore;
use crate::persistence::PersistentStore;

/// Spawns the flush loop. The returned handle completes once `cancel` fires
/// and the in-flight batch has drained.
pub fn spawn(
    store: Arc<DriverStateStore>,
    persistent: Arc<dyn PersistentStore>,
    period: Duration,
    max_retries: u32,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    flush_once(&store, persistent.as_ref(), max_retries).await;
                }
                _ = cancel.cancelled() => {
                    flush_once(&store, persistent.as_ref(), max_retries).await;
                    break;
                }
            }
        }
    })
}

async fn flush_once(store: &DriverStateStore, persistent: &dyn PersistentStore, max_retries: u32) {
    let dirty = store.take_dirty();
    if dirty.is_empty() {
        return;
    }
    for driver_id in dirty {
        let Some(record) = store.get_driver(driver_id) else { continue };
        let (Some(location), Some(h3_index)) = (record.location.clone(), record.h3_index) else {
            continue;
        };

        let mut attempt = 0;
        loop {
            let result = persistent
                .update_driver_location(driver_id, location.clone(), h3_index, record.last_active_at)
                .await;
            match result {
                Ok(()) => {
                    store.metrics().record_write_flushed();
                    break;
                }
                Err(err) if attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(%driver_id, attempt, error = %err, "retrying driver location flush");
                    tokio::time::sleep(Duration::from_millis(50 * 2u64.pow(attempt))).await;
                }
                Err(err) => {
                    tracing::error!(%driver_id, error = %err, "dropping driver location flush after exhausting retries");
                    store.metrics().record_write_failure();
                    store.mark_dirty_again(driver_id);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{DriverId, UserId};
    use crate::model::VehicleType;
    use crate::persistence::memory::InMemoryStore;
    use chrono::Utc;
    use h3o::Resolution;

    #[tokio::test]
    async fn flush_persists_and_clears_dirty_set() {
        let store = Arc::new(DriverStateStore::new(Resolution::Nine, Duration::from_secs(300)));
        let persistent: Arc<dyn PersistentStore> = Arc::new(InMemoryStore::new());

        let driver_id = DriverId::new();
        store.register_driver(driver_id, UserId::new(), VehicleType::Cab, Utc::now());
        persistent
            .upsert_driver(crate::model::Driver::new(
                driver_id,
                UserId::new(),
                VehicleType::Cab,
                "DL1",
                "Swift",
            ))
            .await
            .unwrap();
        store.update_location(driver_id, 28.6139, 77.2090, Utc::now()).unwrap();

        flush_once(&store, persistent.as_ref(), 3).await;

        let driver = persistent.get_driver(driver_id).await.unwrap().unwrap();
        assert!(driver.location.is_some());
        assert!(store.take_dirty().is_empty());
    }
}
