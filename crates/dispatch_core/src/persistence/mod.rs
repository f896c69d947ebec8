//! The "transactional relational store" external collaborator (spec §1),
//! modeled as a trait so the coordinator's serializable-transaction
//! requirements have a concrete, testable seam without pulling in a real
//! database driver. [`memory::InMemoryStore`] is the in-process reference
//! implementation used by this crate's own tests; a production deployment
//! supplies a different implementation (e.g. backed by `sqlx`).

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use h3o::CellIndex;

use crate::error::CoreResult;
use crate::ids::{DriverId, EarningId, RideId, UserId};
use crate::model::{
    CancelledBy, Driver, DriverEarning, DriverPenalty, GeoPoint, PaymentStatus, Ride, RideStatus,
};

/// Which side submitted a rating (spec §4.4 `submitRating`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingRole {
    Passenger,
    Driver,
}

/// Fields that change together on a ride status transition. Only the fields
/// relevant to the transition are `Some`; everything else is left untouched.
#[derive(Debug, Clone, Default)]
pub struct RideStatusPatch {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub payment_status: Option<PaymentStatus>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancellation_reason: Option<String>,
}

/// Outcome of the atomic completion transaction (spec §4.4 `completeRide`).
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub ride: Ride,
    pub earning: DriverEarning,
    /// `true` if an earning already existed for this ride (idempotent replay).
    pub already_completed: bool,
}

/// Outcome of `submitRating`: the updated ride plus the driver's refreshed
/// aggregate, if the rating side affects the driver (passenger rating a
/// driver).
#[derive(Debug, Clone)]
pub struct RatingOutcome {
    pub ride: Ride,
    pub driver: Option<Driver>,
}

/// The persistent store's contract. Every method that must participate in a
/// serializable transaction (assignment, completion, rating) is a single
/// call so the implementation owns the transaction boundary.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn create_ride(&self, ride: Ride) -> CoreResult<()>;
    async fn get_ride(&self, ride_id: RideId) -> CoreResult<Option<Ride>>;
    async fn list_rides_for_passenger(
        &self,
        passenger_id: UserId,
        page: u32,
        limit: u32,
    ) -> CoreResult<Vec<Ride>>;

    /// `UPDATE rides SET driver_id=?, status='DRIVER_ASSIGNED' WHERE id=? AND
    /// driver_id IS NULL AND status='PENDING'`. Returns `true` iff the row
    /// was updated (the optimistic lock was won).
    async fn conditional_assign_driver(
        &self,
        ride_id: RideId,
        driver_id: DriverId,
        now: DateTime<Utc>,
    ) -> CoreResult<bool>;

    /// Applies a validated transition. Returns `true` iff the ride still had
    /// `expected_status` at write time (guards against out-of-order
    /// updates — spec §5 ordering guarantee #1).
    async fn apply_status_transition(
        &self,
        ride_id: RideId,
        expected_status: RideStatus,
        new_status: RideStatus,
        patch: RideStatusPatch,
        now: DateTime<Utc>,
    ) -> CoreResult<bool>;

    /// The atomic completion transaction: transition to RIDE_COMPLETED, look
    /// up the commission rate, idempotently insert the `DriverEarning`, and
    /// bump the driver's totals (spec §4.4 `completeRide` steps 1-5).
    async fn complete_ride_tx(&self, ride_id: RideId, now: DateTime<Utc>) -> CoreResult<CompletionOutcome>;

    async fn submit_rating(
        &self,
        ride_id: RideId,
        role: RatingRole,
        rating: u8,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<RatingOutcome>;

    async fn get_earning_by_ride(&self, ride_id: RideId) -> CoreResult<Option<DriverEarning>>;
    async fn get_earning(&self, earning_id: EarningId) -> CoreResult<Option<DriverEarning>>;

    async fn get_driver(&self, driver_id: DriverId) -> CoreResult<Option<Driver>>;
    async fn upsert_driver(&self, driver: Driver) -> CoreResult<()>;
    async fn set_driver_online(&self, driver_id: DriverId, is_online: bool) -> CoreResult<()>;

    /// Durably records a driver's last known location. Called from the
    /// flush loop, never inline with a telemetry update (spec §4.3 — the
    /// store must never block on persistence).
    async fn update_driver_location(
        &self,
        driver_id: DriverId,
        location: GeoPoint,
        h3_index: CellIndex,
        now: DateTime<Utc>,
    ) -> CoreResult<()>;

    async fn list_pending_penalties(&self, driver_id: DriverId) -> CoreResult<Vec<DriverPenalty>>;
    async fn insert_penalty(&self, penalty: DriverPenalty) -> CoreResult<()>;

    /// Platform-config key-value lookup (e.g. `platform_fee_rate`). A miss
    /// or read error is handled by the caller, which falls back to the
    /// configured default (spec §4.4 step 2).
    async fn get_platform_config(&self, key: &str) -> CoreResult<Option<String>>;

    async fn create_share_token(&self, token: crate::model::ShareToken) -> CoreResult<()>;
    async fn get_share_token(&self, token: &str) -> CoreResult<Option<crate::model::ShareToken>>;
}
