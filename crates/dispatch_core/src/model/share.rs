//! Share tokens: an opaque string mapping to a ride, for an unauthenticated
//! public ride-status fetch. Never carries a phone number or OTP.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

use crate::ids::RideId;

/// 24-hour validity window (spec §6).
pub const SHARE_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct ShareToken {
    pub token: String,
    pub ride_id: RideId,
    pub expires_at: DateTime<Utc>,
}

impl ShareToken {
    pub fn new(ride_id: RideId, rng: &mut impl RngCore) -> Self {
        let mut bytes = [0u8; 24];
        rng.fill_bytes(&mut bytes);
        let token = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self {
            token,
            ride_id,
            expires_at: Utc::now() + Duration::hours(SHARE_TOKEN_TTL_HOURS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expires_after_24_hours() {
        let token = ShareToken::new(RideId::new(), &mut rand::thread_rng());
        assert!(!token.is_expired(Utc::now()));
        assert!(token.is_expired(Utc::now() + Duration::hours(25)));
    }
}
