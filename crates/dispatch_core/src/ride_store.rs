//! In-memory active-ride cache (spec §3: "mirrors active rides for O(1) OTP
//! verification; terminal rides may be evicted"). This is a read-through
//! cache in front of the persistent store, not a source of truth — every
//! mutation still goes through [`crate::persistence::PersistentStore`]; this
//! store is refreshed afterward so the next read is in-memory.

use dashmap::DashMap;

use crate::ids::RideId;
use crate::model::Ride;

#[derive(Default)]
pub struct RideStateCache {
    rides: DashMap<RideId, Ride>,
}

impl RideStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ride: Ride) {
        if ride.status.is_terminal() {
            self.rides.remove(&ride.id);
        } else {
            self.rides.insert(ride.id, ride);
        }
    }

    pub fn get(&self, ride_id: RideId) -> Option<Ride> {
        self.rides.get(&ride_id).map(|r| r.clone())
    }

    pub fn evict(&self, ride_id: RideId) {
        self.rides.remove(&ride_id);
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Otp, UserId};
    use crate::model::{PaymentMethod, PaymentStatus, RideStatus, VehicleType};
    use crate::model::driver::GeoPoint;
    use crate::pricing::calculate_fare;
    use chrono::Utc;

    fn sample_ride(status: RideStatus) -> Ride {
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
            status,
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

    #[test]
    fn terminal_rides_are_never_cached() {
        let cache = RideStateCache::new();
        let ride = sample_ride(RideStatus::RideCompleted);
        let id = ride.id;
        cache.insert(ride);
        assert!(cache.get(id).is_none());
    }

    #[test]
    fn active_rides_are_retrievable_in_o1() {
        let cache = RideStateCache::new();
        let ride = sample_ride(RideStatus::Pending);
        let id = ride.id;
        cache.insert(ride);
        assert!(cache.get(id).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reinserting_as_terminal_evicts_the_earlier_entry() {
        let cache = RideStateCache::new();
        let mut ride = sample_ride(RideStatus::RideStarted);
        let id = ride.id;
        cache.insert(ride.clone());
        assert!(cache.get(id).is_some());

        ride.status = RideStatus::RideCompleted;
        cache.insert(ride);
        assert!(cache.get(id).is_none());
    }
}
