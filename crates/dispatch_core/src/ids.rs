//! Opaque entity identifiers.
//!
//! Every id in the data model is a `Uuid` wrapped in a distinct newtype so a
//! `DriverId` and a `RideId` can never be swapped at a call site by accident.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

opaque_id!(DriverId);
opaque_id!(UserId);
opaque_id!(RideId);
opaque_id!(EarningId);
opaque_id!(PenaltyId);

/// A 4-digit ride-start OTP. `Debug` deliberately does not print the value —
/// OTPs must never appear in logs (spec §7).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Otp(pub(crate) [u8; 4]);

impl Otp {
    /// Generates a uniform 4-digit OTP in `[1000, 9999]`.
    pub fn generate(rng: &mut impl rand::Rng) -> Self {
        let value = rng.gen_range(1000..=9999);
        Self::from_u16(value)
    }

    fn from_u16(value: u16) -> Self {
        let s = format!("{value:04}");
        let mut digits = [0u8; 4];
        for (i, c) in s.bytes().enumerate() {
            digits[i] = c - b'0';
        }
        Self(digits)
    }

    /// Parses a candidate OTP from client input. Returns `None` if it is not
    /// exactly 4 decimal digits.
    pub fn parse(input: &str) -> Option<Self> {
        let bytes = input.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let mut digits = [0u8; 4];
        for (i, b) in bytes.iter().enumerate() {
            digits[i] = b - b'0';
        }
        Some(Self(digits))
    }

    pub fn as_string(&self) -> String {
        self.0.iter().map(|d| (d + b'0') as char).collect()
    }

    /// Constant-time comparison — timing side channels must not leak how
    /// many leading digits matched.
    pub fn constant_time_eq(&self, other: &Otp) -> bool {
        let mut diff = 0u8;
        for i in 0..4 {
            diff |= self.0[i] ^ other.0[i];
        }
        diff == 0
    }
}

impl fmt::Debug for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Otp(<redacted>)")
    }
}
