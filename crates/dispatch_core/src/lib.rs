//! # Ride Dispatch Core
//!
//! The matching, pricing, and lifecycle engine behind a ride-hailing
//! marketplace: fare computation, H3-indexed driver lookup, the ride state
//! machine, and the dispatcher/telemetry/event-bus plumbing that connects
//! them.
//!
//! ## Overview
//!
//! - **Spatial indexing** (`spatial`): H3 cell math and Haversine distance.
//! - **Pricing** (`pricing`): deterministic fare quotes per vehicle type.
//! - **Model** (`model`): `Driver`, `Ride`, `DriverEarning`, `DriverPenalty`,
//!   `ShareToken`.
//! - **Driver state** (`driver_store`): the concurrent, H3-indexed view of
//!   every online driver, with background persistence flush loops.
//! - **Ride cache** (`ride_store`): an in-memory mirror of active rides for
//!   O(1) OTP verification.
//! - **Coordinator** (`coordinator`): the ride state machine and every
//!   transactional ride operation.
//! - **Dispatcher** (`dispatcher`): fans a new ride out to nearby drivers.
//! - **Telemetry** (`telemetry`): the inbound driver-location path.
//! - **Persistence / event bus / shared store** (`persistence`, `event_bus`,
//!   `shared_store`): traits over the durable store, the pub/sub fan-out,
//!   and the horizontal-scaling key-value store, each with an in-process
//!   reference implementation.
//!
//! ## Key concepts
//!
//! - **Race-free assignment**: ride acceptance is a conditional update, not
//!   an application-level lock.
//! - **Idempotent completion**: a unique `rideId` on `DriverEarning` makes
//!   `completeRide` safe to retry.
//! - **Dirty-flag coalescing**: the driver store never blocks a telemetry
//!   write on a persistent round trip.

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod driver_store;
pub mod error;
pub mod event_bus;
pub mod ids;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod pricing;
pub mod ride_store;
pub mod shared_store;
pub mod spatial;
pub mod telemetry;
