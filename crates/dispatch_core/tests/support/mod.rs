use std::sync::Arc;

use dispatch_core::config::CoreConfig;
use dispatch_core::coordinator::RideLifecycleCoordinator;
use dispatch_core::driver_store::DriverStateStore;
use dispatch_core::event_bus::inprocess::InProcessBus;
use dispatch_core::event_bus::EventBus;
use dispatch_core::ids::{DriverId, UserId};
use dispatch_core::model::{Driver, VehicleType};
use dispatch_core::persistence::memory::InMemoryStore;
use dispatch_core::persistence::PersistentStore;
use dispatch_core::ride_store::RideStateCache;

/// Bundles a coordinator with direct handles to its collaborators so tests
/// can inspect state the public API doesn't expose (e.g. the driver store).
pub struct Harness {
    pub coordinator: Arc<RideLifecycleCoordinator>,
    pub driver_store: Arc<DriverStateStore>,
    pub persistent: Arc<dyn PersistentStore>,
    pub bus: Arc<InProcessBus>,
}

pub fn build_harness() -> Harness {
    let config = CoreConfig::default();
    let persistent: Arc<dyn PersistentStore> = Arc::new(InMemoryStore::new());
    let driver_store = Arc::new(DriverStateStore::new(config.h3_resolution, config.heartbeat_staleness));
    let ride_cache = Arc::new(RideStateCache::new());
    let bus = Arc::new(InProcessBus::new());
    let bus_dyn: Arc<dyn EventBus> = bus.clone();

    let coordinator = Arc::new(RideLifecycleCoordinator::new(
        persistent.clone(),
        driver_store.clone(),
        ride_cache,
        bus_dyn,
        config,
    ));

    Harness { coordinator, driver_store, persistent, bus }
}

/// Registers an online, active, verified driver both in the durable store
/// and in the live spatial index, at the given coordinates.
pub async fn spawn_online_driver(
    harness: &Harness,
    lat: f64,
    lng: f64,
    vehicle_type: VehicleType,
) -> DriverId {
    let driver_id = DriverId::new();
    let user_id = UserId::new();
    let mut driver = Driver::new(driver_id, user_id, vehicle_type, "DL01AB1234", "Swift Dzire");
    driver.is_online = true;
    driver.is_verified = true;
    harness.persistent.upsert_driver(driver).await.unwrap();

    harness.driver_store.register_driver(driver_id, user_id, vehicle_type, chrono::Utc::now());
    harness.driver_store.update_location(driver_id, lat, lng, chrono::Utc::now()).unwrap();
    harness.driver_store.set_online_status(driver_id, true).unwrap();
    harness.driver_store.set_active_status(driver_id, true).unwrap();

    driver_id
}
