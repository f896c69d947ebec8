//! Stable error kinds for the dispatch core, mapped to HTTP by the transport
//! layer (out of scope here) via [`CoreError::http_status`] / [`CoreError::code`].

use thiserror::Error;

use crate::ids::{DriverId, RideId};

/// Every error the dispatch core can return. Variants carry just enough
/// context for logging; they never carry OTPs, tokens, or phone numbers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("ride {0} already taken")]
    RideAlreadyTaken(RideId),

    #[error("ride {0} already rated by this role")]
    AlreadyRated(RideId),

    #[error("otp mismatch")]
    InvalidOtp,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("downstream store unavailable: {0}")]
    Unavailable(String),

    #[error("coordinate out of range: lat={lat}, lng={lng}")]
    BadCoordinate { lat: f64, lng: f64 },

    #[error("driver {0} is not eligible (offline, inactive, or penalized)")]
    DriverNotEligible(DriverId),
}

impl CoreError {
    /// HTTP status the transport layer should map this to.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) | CoreError::BadCoordinate { .. } | CoreError::InvalidOtp => {
                400
            }
            CoreError::Unauthenticated => 401,
            CoreError::Forbidden(_) | CoreError::DriverNotEligible(_) => 403,
            CoreError::NotFound(_) => 404,
            CoreError::InvalidTransition { .. }
            | CoreError::RideAlreadyTaken(_)
            | CoreError::AlreadyRated(_)
            | CoreError::Conflict(_) => 409,
            CoreError::Unavailable(_) => 503,
        }
    }

    /// Stable machine-readable code, independent of the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION",
            CoreError::BadCoordinate { .. } => "BAD_COORDINATE",
            CoreError::Unauthenticated => "UNAUTHENTICATED",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::DriverNotEligible(_) => "DRIVER_NOT_ELIGIBLE",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::RideAlreadyTaken(_) => "RIDE_ALREADY_TAKEN",
            CoreError::AlreadyRated(_) => "ALREADY_RATED",
            CoreError::InvalidOtp => "INVALID_OTP",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ride_already_taken_maps_to_409() {
        let err = CoreError::RideAlreadyTaken(RideId::new());
        assert_eq!(err.http_status(), 409);
        assert_eq!(err.code(), "RIDE_ALREADY_TAKEN");
    }

    #[test]
    fn invalid_otp_never_carries_the_value() {
        let err = CoreError::InvalidOtp;
        assert_eq!(format!("{err}"), "otp mismatch");
    }
}
