//! Driver penalties. A driver with any `Pending` penalty is blocked from
//! transitioning online (spec §3).

use chrono::{DateTime, Utc};

use crate::ids::{DriverId, PenaltyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyReason {
    /// Flat fee for toggling offline mid-session. Spec §9 open question:
    /// applied unconditionally regardless of prior online duration, no
    /// cooldown — the flat amount is configurable via `CoreConfig`.
    StopRiding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverPenalty {
    pub id: PenaltyId,
    pub driver_id: DriverId,
    pub reason: PenaltyReason,
    pub amount: f64,
    pub status: PenaltyStatus,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl DriverPenalty {
    pub fn stop_riding(driver_id: DriverId, amount: f64) -> Self {
        Self {
            id: PenaltyId::new(),
            driver_id,
            reason: PenaltyReason::StopRiding,
            amount,
            status: PenaltyStatus::Pending,
            created_at: Utc::now(),
            paid_at: None,
        }
    }
}
