//! Ride Lifecycle Coordinator (spec §4.4): the single place that enforces
//! the ride state machine and owns every transactional operation on a ride.

use std::sync::Arc;

use chrono::Utc;

use crate::config::CoreConfig;
use crate::driver_store::DriverStateStore;
use crate::error::{CoreError, CoreResult};
use crate::event_bus::EventBus;
use crate::ids::{DriverId, Otp, RideId, UserId};
use crate::model::driver::GeoPoint;
use crate::model::{
    CancelledBy, DriverPenalty, PaymentMethod, PublicRideView, Ride, RideStatus, ShareToken, VehicleType,
};
use crate::persistence::{CompletionOutcome, PersistentStore, RatingOutcome, RatingRole, RideStatusPatch};
use crate::pricing;
use crate::ride_store::RideStateCache;

/// Who is calling an operation that requires an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Passenger(UserId),
    Driver(DriverId),
}

pub struct CreateRideRequest {
    pub passenger_id: UserId,
    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub pickup_address: String,
    pub drop_address: String,
    pub vehicle_type: VehicleType,
    pub payment_method: PaymentMethod,
}

pub struct RideLifecycleCoordinator {
    persistent: Arc<dyn PersistentStore>,
    driver_store: Arc<DriverStateStore>,
    ride_cache: Arc<RideStateCache>,
    bus: Arc<dyn EventBus>,
    config: CoreConfig,
}

impl RideLifecycleCoordinator {
    pub fn new(
        persistent: Arc<dyn PersistentStore>,
        driver_store: Arc<DriverStateStore>,
        ride_cache: Arc<RideStateCache>,
        bus: Arc<dyn EventBus>,
        config: CoreConfig,
    ) -> Self {
        Self { persistent, driver_store, ride_cache, bus, config }
    }

    fn ride_channel(ride_id: RideId) -> String {
        format!("ride:{ride_id}")
    }

    async fn publish_ride_event(&self, ride_id: RideId, event: &str, payload: serde_json::Value) {
        let mut body = payload;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("event".to_string(), serde_json::Value::String(event.to_string()));
        }
        if let Err(err) = self.bus.publish(&Self::ride_channel(ride_id), body).await {
            tracing::warn!(%ride_id, event, error = %err, "failed to publish ride event");
        }
    }

    /// `createRide` (spec §4.4): computes fare, generates the OTP, writes
    /// the ride in PENDING with no driver assigned. The returned `Ride`
    /// carries the OTP — it is the transport layer's job to withhold it
    /// from anyone but the passenger (spec §6).
    pub async fn create_ride(&self, req: CreateRideRequest) -> CoreResult<Ride> {
        let quote = pricing::calculate_fare_with_rates(
            req.pickup.clone(),
            req.drop.clone(),
            req.vehicle_type,
            &self.config.vehicle_rates,
            self.config.fixed_fees,
            None,
        );
        let (distance_km, duration_min) = pricing::distance_and_duration(req.pickup.clone(), req.drop.clone());

        let now = Utc::now();
        let ride = Ride {
            id: RideId::new(),
            passenger_id: req.passenger_id,
            driver_id: None,
            pickup: req.pickup,
            drop: req.drop,
            pickup_address: req.pickup_address,
            drop_address: req.drop_address,
            fare: quote,
            distance_km,
            duration_min,
            vehicle_type: req.vehicle_type,
            payment_method: req.payment_method,
            payment_status: crate::model::PaymentStatus::Pending,
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
        };

        self.persistent.create_ride(ride.clone()).await?;
        self.ride_cache.insert(ride.clone());
        Ok(ride)
    }

    async fn refresh_cache(&self, ride_id: RideId) -> CoreResult<Ride> {
        let ride = self
            .persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
        self.ride_cache.insert(ride.clone());
        Ok(ride)
    }

    /// `assignDriver` (spec §4.4): race-free via the persistent store's
    /// conditional update. Only one of any number of concurrent callers
    /// wins; the rest receive `RideAlreadyTaken`.
    pub async fn assign_driver(&self, ride_id: RideId, driver_id: DriverId) -> CoreResult<Ride> {
        let ride = self
            .persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
        if ride.status != RideStatus::Pending || ride.driver_id.is_some() {
            return Err(CoreError::RideAlreadyTaken(ride_id));
        }

        let driver = self
            .driver_store
            .get_driver(driver_id)
            .ok_or_else(|| CoreError::NotFound(format!("driver {driver_id}")))?;
        if !driver.is_online || !driver.is_active {
            return Err(CoreError::DriverNotEligible(driver_id));
        }

        let now = Utc::now();
        let won = self.persistent.conditional_assign_driver(ride_id, driver_id, now).await?;
        if !won {
            return Err(CoreError::RideAlreadyTaken(ride_id));
        }

        let ride = self.refresh_cache(ride_id).await?;
        self.publish_ride_event(
            ride_id,
            "driver-assigned",
            serde_json::json!({ "rideId": ride_id.to_string(), "driverId": driver_id.to_string() }),
        )
        .await;
        Ok(ride)
    }

    fn assert_authorized_for_driver_only_status(&self, ride: &Ride, actor: Actor) -> CoreResult<()> {
        match actor {
            Actor::Driver(driver_id) if ride.driver_id == Some(driver_id) => Ok(()),
            _ => Err(CoreError::Forbidden("only the assigned driver may set this status".to_string())),
        }
    }

    /// `updateStatus` (spec §4.4) for the non-OTP, non-terminal transitions
    /// (CONFIRMED, DRIVER_ARRIVED). RIDE_STARTED goes through
    /// [`Self::start_ride`] and RIDE_COMPLETED through
    /// [`Self::complete_ride`] — both have their own transactional
    /// semantics the generic path does not need to duplicate.
    pub async fn update_status(&self, ride_id: RideId, new_status: RideStatus, actor: Actor) -> CoreResult<Ride> {
        if matches!(new_status, RideStatus::RideStarted | RideStatus::RideCompleted) {
            return Err(CoreError::Validation(
                "use start_ride/complete_ride for this transition".to_string(),
            ));
        }

        let ride = self
            .persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;

        if !ride.status.can_transition_to(new_status) {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", ride.status),
                to: format!("{:?}", new_status),
            });
        }
        if new_status.is_driver_only() {
            self.assert_authorized_for_driver_only_status(&ride, actor)?;
        }

        let now = Utc::now();
        let updated = self
            .persistent
            .apply_status_transition(ride_id, ride.status, new_status, RideStatusPatch::default(), now)
            .await?;
        if !updated {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", ride.status),
                to: format!("{:?}", new_status),
            });
        }

        let ride = self.refresh_cache(ride_id).await?;
        self.publish_ride_event(
            ride_id,
            "ride-status-update",
            serde_json::json!({ "rideId": ride_id.to_string(), "status": format!("{:?}", new_status) }),
        )
        .await;
        Ok(ride)
    }

    /// `startRide` (spec §4.4): OTP-gated transition from DRIVER_ARRIVED to
    /// RIDE_STARTED. The OTP comparison is constant-time; a mismatch never
    /// changes ride state and never logs the expected value.
    pub async fn start_ride(&self, ride_id: RideId, driver_id: DriverId, otp_input: &str) -> CoreResult<Ride> {
        let ride = self
            .persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;

        if ride.driver_id != Some(driver_id) {
            return Err(CoreError::Forbidden("only the assigned driver may start this ride".to_string()));
        }
        if ride.status != RideStatus::DriverArrived {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", ride.status),
                to: "RideStarted".to_string(),
            });
        }

        let candidate = Otp::parse(otp_input).ok_or(CoreError::InvalidOtp)?;
        if !candidate.constant_time_eq(&ride.ride_otp) {
            return Err(CoreError::InvalidOtp);
        }

        let now = Utc::now();
        let patch = RideStatusPatch { started_at: Some(now), ..Default::default() };
        let updated = self
            .persistent
            .apply_status_transition(ride_id, RideStatus::DriverArrived, RideStatus::RideStarted, patch, now)
            .await?;
        if !updated {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", ride.status),
                to: "RideStarted".to_string(),
            });
        }

        let ride = self.refresh_cache(ride_id).await?;
        self.publish_ride_event(
            ride_id,
            "ride-status-update",
            serde_json::json!({ "rideId": ride_id.to_string(), "status": "RIDE_STARTED" }),
        )
        .await;
        Ok(ride)
    }

    /// `completeRide` (spec §4.4): the atomic completion transaction. Safe
    /// to retry — idempotency comes from the unique `rideId` on
    /// `DriverEarning`, enforced inside the persistent store.
    pub async fn complete_ride(&self, ride_id: RideId) -> CoreResult<CompletionOutcome> {
        let now = Utc::now();
        let outcome = self.persistent.complete_ride_tx(ride_id, now).await?;
        self.ride_cache.evict(ride_id);
        if !outcome.already_completed {
            self.publish_ride_event(
                ride_id,
                "ride-status-update",
                serde_json::json!({ "rideId": ride_id.to_string(), "status": "RIDE_COMPLETED" }),
            )
            .await;
        }
        Ok(outcome)
    }

    /// `cancelRide` (spec §4.4). Cancellation is allowed unconditionally
    /// from any non-terminal status (spec §9 open question — no penalty
    /// wiring for a driver cancelling between CONFIRMED and
    /// DRIVER_ARRIVED; only `cancelledBy` is recorded for downstream policy).
    pub async fn cancel_ride(
        &self,
        ride_id: RideId,
        cancelled_by: CancelledBy,
        reason: Option<String>,
    ) -> CoreResult<Ride> {
        let ride = self
            .persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
        if ride.status.is_terminal() {
            return Err(CoreError::Validation("ride is already in a terminal state".to_string()));
        }

        let now = Utc::now();
        let patch = RideStatusPatch {
            cancelled_at: Some(now),
            cancelled_by: Some(cancelled_by),
            cancellation_reason: reason,
            ..Default::default()
        };
        let updated = self
            .persistent
            .apply_status_transition(ride_id, ride.status, RideStatus::Cancelled, patch, now)
            .await?;
        if !updated {
            return Err(CoreError::InvalidTransition {
                from: format!("{:?}", ride.status),
                to: "Cancelled".to_string(),
            });
        }

        self.ride_cache.evict(ride_id);
        self.publish_ride_event(
            ride_id,
            "ride-cancelled",
            serde_json::json!({ "rideId": ride_id.to_string(), "cancelledBy": format!("{:?}", cancelled_by) }),
        )
        .await;

        self.persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))
    }

    /// `submitRating` (spec §4.4). Idempotent per role; a passenger rating
    /// a driver feeds the driver's aggregate via the exact recurrence in
    /// [`crate::model::Driver::apply_rating`]. Only the ride's passenger may
    /// submit a `Passenger`-role rating, and only the assigned driver may
    /// submit a `Driver`-role rating (spec §7: role/ownership violations are
    /// `Forbidden`).
    pub async fn submit_rating(
        &self,
        ride_id: RideId,
        actor: Actor,
        role: RatingRole,
        rating: u8,
        feedback: Option<String>,
    ) -> CoreResult<RatingOutcome> {
        if !(1..=5).contains(&rating) {
            return Err(CoreError::Validation("rating must be between 1 and 5".to_string()));
        }
        if let Some(fb) = &feedback {
            if fb.len() > 500 {
                return Err(CoreError::Validation("feedback must be at most 500 characters".to_string()));
            }
        }

        let ride = self
            .persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
        match (role, actor) {
            (RatingRole::Passenger, Actor::Passenger(user_id)) if ride.passenger_id == user_id => {}
            (RatingRole::Driver, Actor::Driver(driver_id)) if ride.driver_id == Some(driver_id) => {}
            _ => {
                return Err(CoreError::Forbidden(
                    "only the ride's passenger or assigned driver may submit a rating for that role".to_string(),
                ));
            }
        }
        self.persistent.submit_rating(ride_id, role, rating, feedback, Utc::now()).await
    }

    /// Creates a share token for an unauthenticated public ride fetch
    /// (spec §6). Valid for 24h from creation.
    pub async fn create_share_link(&self, ride_id: RideId) -> CoreResult<ShareToken> {
        self.persistent
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {ride_id}")))?;
        let token = ShareToken::new(ride_id, &mut rand::thread_rng());
        self.persistent.create_share_token(token.clone()).await?;
        Ok(token)
    }

    /// Resolves a share token to the public, phone/OTP-free ride
    /// projection. An unknown or expired token is indistinguishable from
    /// `NotFound` — the expiry leaks no information about validity.
    pub async fn fetch_shared_ride(
        &self,
        token: &str,
        driver_name: Option<&str>,
        vehicle_label: Option<&str>,
    ) -> CoreResult<PublicRideView> {
        let share = self
            .persistent
            .get_share_token(token)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("share token {token}")))?;
        if share.is_expired(Utc::now()) {
            return Err(CoreError::NotFound(format!("share token {token}")));
        }
        let ride = self
            .persistent
            .get_ride(share.ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ride {}", share.ride_id)))?;
        Ok(ride.public_projection(driver_name, vehicle_label))
    }

    /// Toggles a driver's online status (spec §3: "a driver with any PENDING
    /// penalty is blocked from transitioning online"; spec §9 open question:
    /// going offline always incurs a flat stop-riding fee, with no cooldown
    /// on prior online duration — preserved here as configurable via
    /// [`CoreConfig::stop_riding_penalty`]).
    pub async fn set_driver_online(&self, driver_id: DriverId, is_online: bool) -> CoreResult<Vec<DriverPenalty>> {
        if is_online {
            let pending = self.persistent.list_pending_penalties(driver_id).await?;
            if !pending.is_empty() {
                return Err(CoreError::Forbidden(format!(
                    "driver {driver_id} has {} pending penalty(ies)",
                    pending.len()
                )));
            }
        }

        self.persistent.set_driver_online(driver_id, is_online).await?;
        self.driver_store.set_online_status(driver_id, is_online)?;

        let mut new_penalties = Vec::new();
        if !is_online {
            let penalty = DriverPenalty::stop_riding(driver_id, self.config.stop_riding_penalty);
            self.persistent.insert_penalty(penalty.clone()).await?;
            new_penalties.push(penalty);
        }
        Ok(new_penalties)
    }

    pub fn driver_store(&self) -> &Arc<DriverStateStore> {
        &self.driver_store
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }
}
