//! In-process reference implementation of [`PersistentStore`], backed by
//! `dashmap` for lock-free concurrent access. Good enough to exercise every
//! invariant the trait promises (optimistic locks, idempotent completion,
//! idempotent rating) without an external database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{CoreError, CoreResult};
use crate::ids::{DriverId, EarningId, RideId, UserId};
use crate::model::{Driver, DriverEarning, DriverPenalty, PaymentStatus, Ride, RideStatus, ShareToken};

use super::{CompletionOutcome, PersistentStore, RatingOutcome, RatingRole, RideStatusPatch};

/// Default commission rate used when no platform-config override is set.
/// Mirrors `CoreConfig::default_commission_rate`; this store has no
/// dependency on `config` so it keeps its own copy, overridable via
/// [`InMemoryStore::set_platform_config`].
const FALLBACK_COMMISSION_RATE: f64 = 0.20;

#[derive(Default)]
pub struct InMemoryStore {
    rides: DashMap<RideId, Ride>,
    drivers: DashMap<DriverId, Driver>,
    earnings_by_id: DashMap<EarningId, DriverEarning>,
    earnings_by_ride: DashMap<RideId, EarningId>,
    penalties: DashMap<DriverId, Vec<DriverPenalty>>,
    platform_config: DashMap<String, String>,
    share_tokens: DashMap<String, ShareToken>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_platform_config(&self, key: impl Into<String>, value: impl Into<String>) {
        self.platform_config.insert(key.into(), value.into());
    }

    fn commission_rate(&self) -> f64 {
        self.platform_config
            .get("platform_fee_rate")
            .and_then(|v| v.parse().ok())
            .unwrap_or(FALLBACK_COMMISSION_RATE)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn create_ride(&self, ride: Ride) -> CoreResult<()> {
        self.rides.insert(ride.id, ride);
        Ok(())
    }

    async fn get_ride(&self, ride_id: RideId) -> CoreResult<Option<Ride>> {
        Ok(self.rides.get(&ride_id).map(|r| r.clone()))
    }

    async fn list_rides_for_passenger(
        &self,
        passenger_id: UserId,
        page: u32,
        limit: u32,
    ) -> CoreResult<Vec<Ride>> {
        let mut rides: Vec<Ride> = self
            .rides
            .iter()
            .filter(|r| r.passenger_id == passenger_id)
            .map(|r| r.clone())
            .collect();
        rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let skip = (page as usize) * (limit as usize);
        Ok(rides.into_iter().skip(skip).take(limit as usize).collect())
    }

    async fn conditional_assign_driver(
        &self,
        ride_id: RideId,
        driver_id: DriverId,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let mut entry = match self.rides.get_mut(&ride_id) {
            Some(e) => e,
            None => return Err(CoreError::NotFound(format!("ride {ride_id}"))),
        };
        if entry.driver_id.is_some() || entry.status != RideStatus::Pending {
            return Ok(false);
        }
        entry.driver_id = Some(driver_id);
        entry.status = RideStatus::DriverAssigned;
        entry.updated_at = now;
        Ok(true)
    }

    async fn apply_status_transition(
        &self,
        ride_id: RideId,
        expected_status: RideStatus,
        new_status: RideStatus,
        patch: RideStatusPatch,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let mut entry = match self.rides.get_mut(&ride_id) {
            Some(e) => e,
            None => return Err(CoreError::NotFound(format!("ride {ride_id}"))),
        };
        if entry.status != expected_status {
            return Ok(false);
        }
        entry.status = new_status;
        entry.updated_at = now;
        if let Some(v) = patch.started_at {
            entry.started_at = Some(v);
        }
        if let Some(v) = patch.completed_at {
            entry.completed_at = Some(v);
        }
        if let Some(v) = patch.payment_status {
            entry.payment_status = v;
        }
        if let Some(v) = patch.cancelled_at {
            entry.cancelled_at = Some(v);
        }
        if let Some(v) = patch.cancelled_by {
            entry.cancelled_by = Some(v);
        }
        if let Some(v) = patch.cancellation_reason {
            entry.cancellation_reason = Some(v);
        }
        Ok(true)
    }

    async fn complete_ride_tx(&self, ride_id: RideId, now: DateTime<Utc>) -> CoreResult<CompletionOutcome> {
        // Idempotency check first: a replayed completion must return the
        // same earning rather than double-pay the driver (spec §4.4 step 3).
        if let Some(existing_id) = self.earnings_by_ride.get(&ride_id).map(|e| *e) {
            let ride = self
                .rides
                .get(&ride_id)
                .map(|r| r.clone())
                .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
            let earning = self
                .earnings_by_id
                .get(&existing_id)
                .map(|e| e.clone())
                .ok_or_else(|| CoreError::NotFound(format!("earning {existing_id}")))?;
            return Ok(CompletionOutcome { ride, earning, already_completed: true });
        }

        let mut ride_entry = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
        if ride_entry.status != RideStatus::RideStarted {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", ride_entry.status),
                to: "RideCompleted".to_string(),
            });
        }
        let driver_id = ride_entry
            .driver_id
            .ok_or_else(|| CoreError::Conflict("ride has no assigned driver".to_string()))?;

        ride_entry.status = RideStatus::RideCompleted;
        ride_entry.completed_at = Some(now);
        ride_entry.updated_at = now;
        ride_entry.payment_status = PaymentStatus::Paid;
        let fare = ride_entry.fare;
        drop(ride_entry);

        let commission_rate = self.commission_rate();
        let earning =
            DriverEarning::from_ride_fare(driver_id, ride_id, &fare, commission_rate, now);

        match self.earnings_by_ride.entry(ride_id) {
            Entry::Occupied(occ) => {
                // Lost the race to a concurrent completion; return its result.
                let existing_id = *occ.get();
                let existing = self
                    .earnings_by_id
                    .get(&existing_id)
                    .map(|e| e.clone())
                    .expect("earnings_by_id and earnings_by_ride must stay in sync");
                let ride = self.rides.get(&ride_id).map(|r| r.clone()).unwrap();
                return Ok(CompletionOutcome { ride, earning: existing, already_completed: true });
            }
            Entry::Vacant(vac) => {
                vac.insert(earning.id);
            }
        }
        self.earnings_by_id.insert(earning.id, earning.clone());

        if let Some(mut driver) = self.drivers.get_mut(&driver_id) {
            driver.total_rides += 1;
            driver.total_earnings = round2(driver.total_earnings + earning.net_amount);
        }

        let ride = self.rides.get(&ride_id).map(|r| r.clone()).unwrap();
        Ok(CompletionOutcome { ride, earning, already_completed: false })
    }

    async fn submit_rating(
        &self,
        ride_id: RideId,
        role: RatingRole,
        rating: u8,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<RatingOutcome> {
        let mut ride_entry = self
            .rides
            .get_mut(&ride_id)
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
        if ride_entry.status != RideStatus::RideCompleted {
            return Err(CoreError::Conflict("ride is not completed".to_string()));
        }

        let entry = crate::model::RatingEntry { rating, feedback, rated_at: now };
        match role {
            RatingRole::Passenger => {
                if ride_entry.driver_rating.is_some() {
                    return Err(CoreError::AlreadyRated(ride_id));
                }
                ride_entry.driver_rating = Some(entry);
            }
            RatingRole::Driver => {
                if ride_entry.passenger_rating.is_some() {
                    return Err(CoreError::AlreadyRated(ride_id));
                }
                ride_entry.passenger_rating = Some(entry);
            }
        }
        let driver_id = ride_entry.driver_id;
        let ride = ride_entry.clone();
        drop(ride_entry);

        // Only a passenger rating a driver feeds the driver's aggregate —
        // there is no symmetric passenger aggregate in scope.
        let driver = if matches!(role, RatingRole::Passenger) {
            match driver_id {
                Some(driver_id) => {
                    if let Some(mut d) = self.drivers.get_mut(&driver_id) {
                        d.apply_rating(rating);
                        Some(d.clone())
                    } else {
                        None
                    }
                }
                None => None,
            }
        } else {
            None
        };

        Ok(RatingOutcome { ride, driver })
    }

    async fn get_earning_by_ride(&self, ride_id: RideId) -> CoreResult<Option<DriverEarning>> {
        Ok(match self.earnings_by_ride.get(&ride_id) {
            Some(id) => self.earnings_by_id.get(&id).map(|e| e.clone()),
            None => None,
        })
    }

    async fn get_earning(&self, earning_id: EarningId) -> CoreResult<Option<DriverEarning>> {
        Ok(self.earnings_by_id.get(&earning_id).map(|e| e.clone()))
    }

    async fn get_driver(&self, driver_id: DriverId) -> CoreResult<Option<Driver>> {
        Ok(self.drivers.get(&driver_id).map(|d| d.clone()))
    }

    async fn upsert_driver(&self, driver: Driver) -> CoreResult<()> {
        self.drivers.insert(driver.id, driver);
        Ok(())
    }

    async fn set_driver_online(&self, driver_id: DriverId, is_online: bool) -> CoreResult<()> {
        match self.drivers.get_mut(&driver_id) {
            Some(mut d) => {
                d.is_online = is_online;
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("driver {driver_id}"))),
        }
    }

    async fn update_driver_location(
        &self,
        driver_id: DriverId,
        location: crate::model::GeoPoint,
        h3_index: h3o::CellIndex,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        match self.drivers.get_mut(&driver_id) {
            Some(mut d) => {
                d.location = Some(location);
                d.h3_index = Some(h3_index);
                d.last_active_at = now;
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("driver {driver_id}"))),
        }
    }

    async fn list_pending_penalties(&self, driver_id: DriverId) -> CoreResult<Vec<DriverPenalty>> {
        Ok(self
            .penalties
            .get(&driver_id)
            .map(|v| {
                v.iter()
                    .filter(|p| p.status == crate::model::PenaltyStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_penalty(&self, penalty: DriverPenalty) -> CoreResult<()> {
        self.penalties.entry(penalty.driver_id).or_default().push(penalty);
        Ok(())
    }

    async fn get_platform_config(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.platform_config.get(key).map(|v| v.clone()))
    }

    async fn create_share_token(&self, token: ShareToken) -> CoreResult<()> {
        self.share_tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn get_share_token(&self, token: &str) -> CoreResult<Option<ShareToken>> {
        Ok(self.share_tokens.get(token).map(|t| t.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Otp, RideId, UserId};
    use crate::model::driver::GeoPoint;
    use crate::model::{PaymentMethod, VehicleType};
    use crate::pricing::calculate_fare;

    fn sample_ride(passenger: UserId, driver: Option<DriverId>) -> Ride {
        let pickup = GeoPoint { lat: 28.6139, lng: 77.2090 };
        let drop = GeoPoint { lat: 28.5355, lng: 77.3910 };
        let fare = calculate_fare(pickup.clone(), drop.clone(), VehicleType::Cab);
        let now = Utc::now();
        Ride {
            id: RideId::new(),
            passenger_id: passenger,
            driver_id: driver,
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
    async fn conditional_assign_wins_only_once() {
        let store = InMemoryStore::new();
        let ride = sample_ride(UserId::new(), None);
        let ride_id = ride.id;
        store.create_ride(ride).await.unwrap();

        let d1 = DriverId::new();
        let d2 = DriverId::new();
        let first = store.conditional_assign_driver(ride_id, d1, Utc::now()).await.unwrap();
        let second = store.conditional_assign_driver(ride_id, d2, Utc::now()).await.unwrap();
        assert!(first);
        assert!(!second);
        let ride = store.get_ride(ride_id).await.unwrap().unwrap();
        assert_eq!(ride.driver_id, Some(d1));
    }

    #[tokio::test]
    async fn complete_ride_is_idempotent() {
        let store = InMemoryStore::new();
        let driver_id = DriverId::new();
        store
            .upsert_driver(Driver::new(driver_id, UserId::new(), VehicleType::Cab, "DL1", "Swift"))
            .await
            .unwrap();
        let mut ride = sample_ride(UserId::new(), Some(driver_id));
        ride.status = RideStatus::RideStarted;
        let ride_id = ride.id;
        store.create_ride(ride).await.unwrap();

        let first = store.complete_ride_tx(ride_id, Utc::now()).await.unwrap();
        let second = store.complete_ride_tx(ride_id, Utc::now()).await.unwrap();
        assert!(!first.already_completed);
        assert!(second.already_completed);
        assert_eq!(first.earning.id, second.earning.id);

        let driver = store.get_driver(driver_id).await.unwrap().unwrap();
        assert_eq!(driver.total_rides, 1, "retried completion must not double count");
    }

    #[tokio::test]
    async fn rating_cannot_be_submitted_twice_for_the_same_role() {
        let store = InMemoryStore::new();
        let driver_id = DriverId::new();
        store
            .upsert_driver(Driver::new(driver_id, UserId::new(), VehicleType::Cab, "DL1", "Swift"))
            .await
            .unwrap();
        let mut ride = sample_ride(UserId::new(), Some(driver_id));
        ride.status = RideStatus::RideCompleted;
        let ride_id = ride.id;
        store.create_ride(ride).await.unwrap();

        store
            .submit_rating(ride_id, RatingRole::Passenger, 5, None, Utc::now())
            .await
            .unwrap();
        let err = store
            .submit_rating(ride_id, RatingRole::Passenger, 4, None, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_RATED");

        let driver = store.get_driver(driver_id).await.unwrap().unwrap();
        assert_eq!(driver.rating_count, 1);
    }
}
