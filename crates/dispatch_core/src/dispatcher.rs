//! Fans a newly created ride out to nearby drivers (spec §4.5). Dispatch is
//! best-effort: the ride is already durable by the time this runs, so a
//! missed broadcast is a quality-of-service issue, never a correctness one.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::driver_store::DriverStateStore;
use crate::event_bus::EventBus;
use crate::ids::RideId;
use crate::model::{GeoPointWire, Ride, VehicleType};

/// Wire payload for a ride offer (spec §6). Deliberately carries no OTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferEvent {
    pub ride_id: RideId,
    pub pickup: GeoPointWire,
    pub drop: GeoPointWire,
    pub pickup_address: String,
    pub drop_address: String,
    pub total_fare: f64,
    pub vehicle_type: VehicleType,
    pub passenger_name: String,
}

impl OfferEvent {
    pub fn from_ride(ride: &Ride, passenger_name: impl Into<String>) -> Self {
        Self {
            ride_id: ride.id,
            pickup: ride.pickup.clone().into(),
            drop: ride.drop.clone().into(),
            pickup_address: ride.pickup_address.clone(),
            drop_address: ride.drop_address.clone(),
            total_fare: ride.fare.total_fare,
            vehicle_type: ride.vehicle_type,
            passenger_name: passenger_name.into(),
        }
    }
}

/// What came back from fanning out a single ride (spec §4.5 step 5).
#[derive(Debug, Clone, Default)]
pub struct BroadcastReport {
    pub targeted_drivers: usize,
    pub connected_drivers: usize,
    pub available_channel_subscribers: usize,
    pub errors: Vec<String>,
}

const MAX_PUBLISH_ATTEMPTS: u32 = 3;

async fn publish_with_retry(bus: &dyn EventBus, channel: &str, payload: serde_json::Value) -> Result<usize, String> {
    let mut attempt = 0;
    loop {
        match bus.publish(channel, payload.clone()).await {
            Ok(reached) => return Ok(reached),
            Err(err) if attempt + 1 < MAX_PUBLISH_ATTEMPTS => {
                attempt += 1;
                tracing::warn!(channel, attempt, error = %err, "retrying event bus publish");
                tokio::time::sleep(Duration::from_millis(50 * 2u64.pow(attempt))).await;
            }
            Err(err) => return Err(format!("{channel}: {err}")),
        }
    }
}

/// Queries nearby drivers, publishes a per-driver offer and a fan-out
/// availability notice, and reports reach.
pub async fn dispatch_ride(
    ride: &Ride,
    passenger_name: &str,
    driver_store: &DriverStateStore,
    bus: &dyn EventBus,
    max_k: u32,
    radius_km: f64,
) -> Result<BroadcastReport, crate::error::CoreError> {
    let nearby = driver_store.find_nearby_drivers(
        ride.pickup.clone(),
        Some(ride.vehicle_type),
        max_k,
        radius_km,
        Utc::now(),
    )?;

    let offer = OfferEvent::from_ride(ride, passenger_name);
    let payload = serde_json::to_value(&offer).expect("OfferEvent always serializes");

    let mut report = BroadcastReport { targeted_drivers: nearby.len(), ..Default::default() };

    for driver in &nearby {
        let channel = format!("driver:{}", driver.driver_id);
        match publish_with_retry(bus, &channel, payload.clone()).await {
            Ok(reached) => report.connected_drivers += reached,
            Err(e) => report.errors.push(e),
        }
    }

    let available_channel = format!("available-drivers:{:?}", ride.vehicle_type).to_lowercase();
    match publish_with_retry(bus, &available_channel, payload).await {
        Ok(reached) => report.available_channel_subscribers = reached,
        Err(e) => report.errors.push(e),
    }

    if report.targeted_drivers > 0 && report.connected_drivers == 0 {
        tracing::error!(
            ride_id = %ride.id,
            targeted = report.targeted_drivers,
            "P0: ride dispatched but reached zero drivers"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::inprocess::InProcessBus;
    use crate::ids::{DriverId, Otp, UserId};
    use crate::model::driver::GeoPoint;
    use crate::model::{PaymentMethod, PaymentStatus, RideStatus};
    use crate::pricing::calculate_fare;
    use h3o::Resolution;
    use std::time::Duration as StdDuration;

    fn sample_ride() -> Ride {
        let pickup = GeoPoint { lat: 28.6139, lng: 77.2090 };
        let drop = GeoPoint { lat: 28.5355, lng: 77.3910 };
        let fare = calculate_fare(pickup.clone(), drop.clone(), VehicleType::Cab);
        let now = Utc::now();
        Ride {
            id: RideId::new(),
            passenger_id: UserId::new(),
            driver_id: None,
            pickup,
            drop,
            pickup_address: "A".to_string(),
            drop_address: "B".to_string(),
            fare,
            distance_km: 21.7,
            duration_min: 53,
            vehicle_type: VehicleType::Cab,
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Pending,
            ride_otp: Otp::generate(&mut rand::thread_rng()),
            status: RideStatus::Pending,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            passenger_rating: None,
            driver_rating: None,
        }
    }

    #[tokio::test]
    async fn dispatch_reaches_a_nearby_online_driver() {
        let store = DriverStateStore::new(Resolution::Nine, StdDuration::from_secs(300));
        let driver_id = DriverId::new();
        store.register_driver(driver_id, UserId::new(), VehicleType::Cab, Utc::now());
        store.update_location(driver_id, 28.6150, 77.2100, Utc::now()).unwrap();
        store.set_online_status(driver_id, true).unwrap();

        let bus = InProcessBus::new();
        let mut sub = bus.subscribe(&format!("driver:{driver_id}")).await.unwrap();

        let ride = sample_ride();
        let report = dispatch_ride(&ride, "Asha", &store, &bus, 3, 10.0).await.unwrap();

        assert_eq!(report.targeted_drivers, 1);
        assert_eq!(report.connected_drivers, 1);
        assert!(report.errors.is_empty());
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn zero_targeted_drivers_is_not_an_error() {
        let store = DriverStateStore::new(Resolution::Nine, StdDuration::from_secs(300));
        let bus = InProcessBus::new();
        let ride = sample_ride();
        let report = dispatch_ride(&ride, "Asha", &store, &bus, 3, 10.0).await.unwrap();
        assert_eq!(report.targeted_drivers, 0);
        assert_eq!(report.connected_drivers, 0);
    }
}
