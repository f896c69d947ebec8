//! Ride entity and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DriverId, Otp, RideId, UserId};
use crate::model::driver::GeoPoint;
use crate::model::driver::VehicleType;
use crate::pricing::FareQuote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RideStatus {
    Pending,
    DriverAssigned,
    Confirmed,
    DriverArrived,
    RideStarted,
    RideCompleted,
    Cancelled,
}

impl RideStatus {
    /// The state machine table from spec §4.4. Any transition not listed
    /// here fails with `InvalidTransition`.
    pub fn can_transition_to(self, next: RideStatus) -> bool {
        use RideStatus::*;
        matches!(
            (self, next),
            (Pending, DriverAssigned)
                | (Pending, Cancelled)
                | (DriverAssigned, Confirmed)
                | (DriverAssigned, Cancelled)
                | (Confirmed, DriverArrived)
                | (Confirmed, Cancelled)
                | (DriverArrived, RideStarted)
                | (DriverArrived, Cancelled)
                | (RideStarted, RideCompleted)
                | (RideStarted, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::RideCompleted | RideStatus::Cancelled)
    }

    /// Statuses only the assigned driver may set via `updateStatus`.
    pub fn is_driver_only(self) -> bool {
        matches!(
            self,
            RideStatus::Confirmed
                | RideStatus::DriverArrived
                | RideStatus::RideStarted
                | RideStatus::RideCompleted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelledBy {
    Passenger,
    Driver,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingEntry {
    pub rating: u8,
    pub feedback: Option<String>,
    pub rated_at: DateTime<Utc>,
}

/// A ride's full record. `driver_id` is set iff the ride has passed through
/// `DriverAssigned`; timestamps are set exactly when the corresponding
/// transition occurs (spec §3 invariants).
#[derive(Debug, Clone, PartialEq)]
pub struct Ride {
    pub id: RideId,
    pub passenger_id: UserId,
    pub driver_id: Option<DriverId>,

    pub pickup: GeoPoint,
    pub drop: GeoPoint,
    pub pickup_address: String,
    pub drop_address: String,

    pub fare: FareQuote,
    pub distance_km: f64,
    pub duration_min: u32,

    pub vehicle_type: VehicleType,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,

    pub ride_otp: Otp,
    pub status: RideStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
    pub cancellation_reason: Option<String>,

    pub passenger_rating: Option<RatingEntry>,
    pub driver_rating: Option<RatingEntry>,
}

impl Ride {
    /// Public projection for an unauthenticated share-link fetch: never
    /// includes the OTP or a phone number (spec §6 — there is no phone
    /// number field on `Ride` at all; it lives on the out-of-scope profile).
    pub fn public_projection(&self, driver_name: Option<&str>, vehicle_label: Option<&str>) -> PublicRideView {
        PublicRideView {
            ride_id: self.id,
            status: self.status,
            pickup_address: self.pickup_address.clone(),
            drop_address: self.drop_address.clone(),
            pickup: self.pickup.clone().into(),
            drop: self.drop.clone().into(),
            driver_name: driver_name.map(|s| s.to_string()),
            vehicle_label: vehicle_label.map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRideView {
    pub ride_id: RideId,
    pub status: RideStatus,
    pub pickup_address: String,
    pub drop_address: String,
    pub pickup: GeoPointWire,
    pub drop: GeoPointWire,
    pub driver_name: Option<String>,
    pub vehicle_label: Option<String>,
}

/// Serde-friendly mirror of `GeoPoint` (kept separate so the internal type
/// doesn't need to derive serde everywhere it's used).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoPointWire {
    pub lat: f64,
    pub lng: f64,
}

impl From<GeoPoint> for GeoPointWire {
    fn from(p: GeoPoint) -> Self {
        Self { lat: p.lat, lng: p.lng }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_allows_only_documented_transitions() {
        use RideStatus::*;
        assert!(Pending.can_transition_to(DriverAssigned));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(RideStarted));
        assert!(!RideCompleted.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(DriverArrived.can_transition_to(RideStarted));
    }

    #[test]
    fn terminal_states_have_no_outbound_transitions() {
        for next in [
            RideStatus::Pending,
            RideStatus::DriverAssigned,
            RideStatus::Confirmed,
            RideStatus::DriverArrived,
            RideStatus::RideStarted,
            RideStatus::RideCompleted,
            RideStatus::Cancelled,
        ] {
            assert!(!RideStatus::RideCompleted.can_transition_to(next));
            assert!(!RideStatus::Cancelled.can_transition_to(next));
        }
    }
}
