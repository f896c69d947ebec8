//! Telemetry Sink (spec §4.6): the inbound path for periodic driver
//! location pings. Never blocks on persistence — the background flush loop
//! in [`crate::driver_store::flush`] owns that.

use chrono::Utc;

use crate::driver_store::DriverStateStore;
use crate::error::CoreResult;
use crate::event_bus::EventBus;
use crate::ids::DriverId;
use crate::model::LocationEvent;

/// Topic every driver's location update is published to, regardless of
/// which driver sent it (spec §4.6 — a single `driver-locations` topic).
pub const DRIVER_LOCATIONS_TOPIC: &str = "driver-locations";

/// Handles one telemetry ping: validates the coordinate, updates the
/// in-memory index, and publishes a `driver-location` event. The caller is
/// expected to call this once per inbound ping; it never touches the
/// persistent store directly.
pub async fn handle_location_update(
    driver_store: &DriverStateStore,
    bus: &dyn EventBus,
    driver_id: DriverId,
    lat: f64,
    lng: f64,
    heading: Option<f64>,
    speed: Option<f64>,
) -> CoreResult<()> {
    let now = Utc::now();
    driver_store.update_location(driver_id, lat, lng, now)?;

    let record = driver_store
        .get_driver(driver_id)
        .expect("update_location just succeeded for this driver");
    let h3_index = record.h3_index.expect("update_location always sets h3_index");

    let event = LocationEvent {
        driver_id,
        lat,
        lng,
        h3_index: h3_index.to_string(),
        heading,
        speed,
        timestamp: now,
    };

    let payload = serde_json::to_value(&event).expect("LocationEvent always serializes");
    if let Err(err) = bus.publish(DRIVER_LOCATIONS_TOPIC, payload).await {
        // Best-effort: a dropped location broadcast is a quality-of-service
        // issue, not a correctness one (spec §4.5 carries the same stance
        // for dispatch; the telemetry path mirrors it).
        tracing::warn!(%driver_id, error = %err, "failed to publish driver-location event");
    }

    Ok(())
}
