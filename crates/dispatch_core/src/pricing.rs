//! Deterministic fare computation from coordinates, vehicle class, and a
//! fixed fee schedule. No surge/peak multipliers in the current
//! absolute-pricing mode; the engine retains pluggable hooks for a future
//! dynamic-pricing module (spec §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::driver::{GeoPoint, VehicleType};
use crate::spatial::haversine_km;

/// Per-vehicle-type absolute rates: base fare, per-km rate, per-minute rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateCard {
    pub base: f64,
    pub per_km: f64,
    pub per_min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleRates {
    pub cab: RateCard,
    pub auto: RateCard,
    pub bike: RateCard,
}

impl Default for VehicleRates {
    fn default() -> Self {
        Self {
            cab: RateCard { base: 30.0, per_km: 15.0, per_min: 1.5 },
            auto: RateCard { base: 30.0, per_km: 10.0, per_min: 1.0 },
            bike: RateCard { base: 20.0, per_km: 7.0, per_min: 1.0 },
        }
    }
}

impl VehicleRates {
    pub fn rate_for(&self, vehicle_type: VehicleType) -> RateCard {
        match vehicle_type {
            VehicleType::Cab => self.cab,
            VehicleType::Auto => self.auto,
            VehicleType::Bike => self.bike,
        }
    }
}

/// Extension point for a future dynamic-pricing module. Pinned to 1.0 in the
/// current absolute-pricing mode (spec §4.2).
pub fn surge_multiplier(_pickup: GeoPoint, _scheduled_time: Option<DateTime<Utc>>) -> f64 {
    1.0
}

/// Extension point for a future dynamic-pricing module. Pinned to 1.0.
pub fn peak_hour_multiplier(_scheduled_time: Option<DateTime<Utc>>) -> f64 {
    1.0
}

/// Full fare breakdown. `total_fare` is always the sum of the other fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FareQuote {
    pub base_fare: f64,
    pub distance_fare: f64,
    pub time_fare: f64,
    pub service_fee: f64,
    pub insurance_fee: f64,
    pub platform_fee: f64,
    pub total_fare: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Average assumed speed for duration estimation (spec §4.2).
const ASSUMED_SPEED_KMH: f64 = 25.0;

/// Computes great-circle distance (km, 2 decimals) and duration (minutes,
/// `ceil(distance / 25 * 60)`) between pickup and drop.
pub fn distance_and_duration(pickup: GeoPoint, drop: GeoPoint) -> (f64, u32) {
    let distance_km = round2(haversine_km(pickup.lat, pickup.lng, drop.lat, drop.lng));
    let duration_min = ((distance_km / ASSUMED_SPEED_KMH) * 60.0).ceil() as u32;
    (distance_km, duration_min)
}

/// Computes the fare for a single vehicle type (spec §4.2):
/// `rideFare = base + distance*perKm + duration*perMin`, plus fixed fees
/// (service 10, insurance 2, platform 10), each field rounded to 2 decimals.
pub fn calculate_fare_with_rates(
    pickup: GeoPoint,
    drop: GeoPoint,
    vehicle_type: VehicleType,
    rates: &VehicleRates,
    fixed_fees: (f64, f64, f64),
    scheduled_time: Option<DateTime<Utc>>,
) -> FareQuote {
    let (distance_km, duration_min) = distance_and_duration(pickup.clone(), drop.clone());
    let rate = rates.rate_for(vehicle_type);
    let multiplier = surge_multiplier(pickup, scheduled_time) * peak_hour_multiplier(scheduled_time);

    let base_fare = round2(rate.base * multiplier);
    let distance_fare = round2(distance_km * rate.per_km * multiplier);
    let time_fare = round2(duration_min as f64 * rate.per_min * multiplier);

    let (service_fee, insurance_fee, platform_fee) = fixed_fees;
    let total_fare = round2(base_fare + distance_fare + time_fare + service_fee + insurance_fee + platform_fee);

    FareQuote {
        base_fare,
        distance_fare,
        time_fare,
        service_fee: round2(service_fee),
        insurance_fee: round2(insurance_fee),
        platform_fee: round2(platform_fee),
        total_fare,
    }
}

/// Convenience wrapper using the default rate card and default fixed fees.
pub fn calculate_fare(pickup: GeoPoint, drop: GeoPoint, vehicle_type: VehicleType) -> FareQuote {
    calculate_fare_with_rates(
        pickup,
        drop,
        vehicle_type,
        &VehicleRates::default(),
        (10.0, 2.0, 10.0),
        None,
    )
}

/// Returns a fare quote for every vehicle type (spec §4.2's `calculateAllFares`).
pub fn calculate_all_fares_with_rates(
    pickup: GeoPoint,
    drop: GeoPoint,
    rates: &VehicleRates,
    fixed_fees: (f64, f64, f64),
    scheduled_time: Option<DateTime<Utc>>,
) -> BTreeMap<VehicleType, FareQuote> {
    [VehicleType::Cab, VehicleType::Auto, VehicleType::Bike]
        .into_iter()
        .map(|vt| {
            (
                vt,
                calculate_fare_with_rates(
                    pickup.clone(),
                    drop.clone(),
                    vt,
                    rates,
                    fixed_fees,
                    scheduled_time,
                ),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gp(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint { lat, lng }
    }

    #[test]
    fn delhi_to_noida_cab_fare_matches_worked_example() {
        // spec §8 scenario 1
        let pickup = gp(28.6139, 77.2090);
        let drop = gp(28.5355, 77.3910);
        let (distance, duration) = distance_and_duration(pickup.clone(), drop.clone());
        assert!((distance - 21.7).abs() < 0.05, "distance was {distance}");
        assert_eq!(duration, 53);

        let quote = calculate_fare(pickup, drop, VehicleType::Cab);
        assert!((quote.total_fare - 457.0).abs() < 0.5, "total was {}", quote.total_fare);
    }

    #[test]
    fn zero_distance_ride_is_base_fare_only() {
        let point = gp(12.0, 77.0);
        let quote = calculate_fare(point.clone(), point, VehicleType::Cab);
        assert_eq!(quote.base_fare, 30.0);
        assert_eq!(quote.distance_fare, 0.0);
        assert_eq!(quote.time_fare, 0.0);
    }

    #[test]
    fn total_fare_is_always_the_sum_of_its_parts() {
        let pickup = gp(28.6139, 77.2090);
        let drop = gp(28.5355, 77.3910);
        let quote = calculate_fare(pickup, drop, VehicleType::Auto);
        let sum = quote.base_fare
            + quote.distance_fare
            + quote.time_fare
            + quote.service_fee
            + quote.insurance_fee
            + quote.platform_fee;
        assert!((sum - quote.total_fare).abs() < 1e-6);
    }

    #[test]
    fn calculate_all_fares_covers_every_vehicle_type() {
        let pickup = gp(28.6139, 77.2090);
        let drop = gp(28.5355, 77.3910);
        let all = calculate_all_fares_with_rates(
            pickup,
            drop,
            &VehicleRates::default(),
            (10.0, 2.0, 10.0),
            None,
        );
        assert_eq!(all.len(), 3);
        assert!(all.contains_key(&VehicleType::Cab));
        assert!(all.contains_key(&VehicleType::Auto));
        assert!(all.contains_key(&VehicleType::Bike));
    }

    #[test]
    fn same_inputs_yield_same_quote() {
        let pickup = gp(28.6139, 77.2090);
        let drop = gp(28.5355, 77.3910);
        let a = calculate_fare(pickup.clone(), drop.clone(), VehicleType::Cab);
        let b = calculate_fare(pickup, drop, VehicleType::Cab);
        assert_eq!(a, b);
    }
}
