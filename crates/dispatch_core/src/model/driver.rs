//! Driver entity: onboarding-owned fields plus the mutable state the core
//! mutates (status, location, ratings, earnings, connectivity).

use chrono::{DateTime, Utc};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::ids::{DriverId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Cab,
    Auto,
    Bike,
}

impl VehicleType {
    /// Parses a vehicle type leniently. An unrecognized value defaults to
    /// `Cab` — spec §4.2: `UnknownVehicleType` never hard-fails.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "cab" => VehicleType::Cab,
            "auto" => VehicleType::Auto,
            "bike" => VehicleType::Bike,
            other => {
                tracing::warn!(value = other, "unknown vehicle type, defaulting to cab");
                VehicleType::Cab
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// The driver record. Coordinates and `h3_index` are both set or both
/// unset (spec §3 invariant); `h3_index` always equals
/// `lat_lng_to_cell(current_lat, current_lng, resolution)` when set.
#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    pub id: DriverId,
    pub user_id: UserId,
    pub is_online: bool,
    pub is_active: bool,
    pub is_verified: bool,

    pub location: Option<GeoPoint>,
    pub h3_index: Option<CellIndex>,

    pub vehicle_type: VehicleType,
    pub vehicle_number: String,
    pub vehicle_model: String,

    pub rating: f64,
    pub rating_count: u32,
    pub total_rides: u64,
    pub total_earnings: f64,

    pub last_active_at: DateTime<Utc>,
    pub connected_transports: Vec<String>,
}

impl Driver {
    pub fn new(
        id: DriverId,
        user_id: UserId,
        vehicle_type: VehicleType,
        vehicle_number: impl Into<String>,
        vehicle_model: impl Into<String>,
    ) -> Self {
        Self {
            id,
            user_id,
            is_online: false,
            is_active: true,
            is_verified: false,
            location: None,
            h3_index: None,
            vehicle_type,
            vehicle_number: vehicle_number.into(),
            vehicle_model: vehicle_model.into(),
            rating: 5.0,
            rating_count: 0,
            total_rides: 0,
            total_earnings: 0.0,
            last_active_at: Utc::now(),
            connected_transports: Vec::new(),
        }
    }

    /// Applies the exact recurrence from spec §4.4: the new average is
    /// `(rating * rating_count + new_rating) / (rating_count + 1)`, rounded
    /// to 1 decimal, with `rating_count` incremented — a distinct counter
    /// from `total_rides` so the average is never diluted by unrated trips
    /// (spec §9 open question).
    pub fn apply_rating(&mut self, new_rating: u8) {
        let new_avg = (self.rating * self.rating_count as f64 + new_rating as f64)
            / (self.rating_count as f64 + 1.0);
        self.rating = (new_avg * 10.0).round() / 10.0;
        self.rating_count += 1;
    }
}

/// Wire payload for a driver's live location, published on telemetry updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationEvent {
    pub driver_id: DriverId,
    pub lat: f64,
    pub lng: f64,
    pub h3_index: String,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
