//! Driver earnings record, written exactly once per completed ride.

use chrono::{DateTime, Utc};

use crate::ids::{DriverId, EarningId, RideId};
use crate::pricing::FareQuote;

/// One ride's earnings. `ride_id` is unique — this is what makes
/// `completeRide` idempotent: a second completion attempt finds an existing
/// row and skips creation (spec §4.4 step 3).
#[derive(Debug, Clone, PartialEq)]
pub struct DriverEarning {
    pub id: EarningId,
    pub driver_id: DriverId,
    pub ride_id: RideId,
    pub amount: f64,
    pub commission: f64,
    pub commission_rate: f64,
    pub net_amount: f64,
    pub fare_breakdown: FareQuote,
    pub date: DateTime<Utc>,
}

impl DriverEarning {
    pub fn from_ride_fare(
        driver_id: DriverId,
        ride_id: RideId,
        fare: &FareQuote,
        commission_rate: f64,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let amount = fare.total_fare;
        let commission = round2(amount * commission_rate);
        let net_amount = round2(amount - commission);
        Self {
            id: EarningId::new(),
            driver_id,
            ride_id,
            amount,
            commission,
            commission_rate,
            net_amount,
            fare_breakdown: fare.clone(),
            date: completed_at,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::driver::VehicleType;
    use crate::pricing::calculate_fare;

    #[test]
    fn commission_and_net_amount_match_the_worked_example() {
        // spec §8 scenario 4: totalFare=500, commissionRate=0.20 -> commission=100, net=400
        let fare = FareQuote {
            base_fare: 0.0,
            distance_fare: 0.0,
            time_fare: 0.0,
            service_fee: 0.0,
            insurance_fee: 0.0,
            platform_fee: 0.0,
            total_fare: 500.0,
        };
        let earning = DriverEarning::from_ride_fare(
            crate::ids::DriverId::new(),
            crate::ids::RideId::new(),
            &fare,
            0.20,
            Utc::now(),
        );
        assert_eq!(earning.commission, 100.0);
        assert_eq!(earning.net_amount, 400.0);
        let _ = calculate_fare(
            crate::model::driver::GeoPoint { lat: 0.0, lng: 0.0 },
            crate::model::driver::GeoPoint { lat: 0.0, lng: 0.0 },
            VehicleType::Cab,
        );
    }
}
