//! Core entities: `Driver`, `Ride`, `DriverEarning`, `DriverPenalty`, `ShareToken`.

pub mod driver;
pub mod earning;
pub mod penalty;
pub mod ride;
pub mod share;

pub use driver::{Driver, GeoPoint, LocationEvent, VehicleType};
pub use earning::DriverEarning;
pub use penalty::{DriverPenalty, PenaltyReason, PenaltyStatus};
pub use ride::{
    CancelledBy, GeoPointWire, PaymentMethod, PaymentStatus, PublicRideView, RatingEntry, Ride, RideStatus,
};
pub use share::ShareToken;
