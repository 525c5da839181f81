use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capacity::{CapacityCounts, CapacityReason};

/// Domain outcome of a registration, doubling as its cancellation flag.
/// Exam registrations sit at `Pending` until graded; everything else books
/// straight to `Passed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Passed,
    Cancelled,
}

impl RegistrationStatus {
    pub fn is_active(&self) -> bool {
        !matches!(self, RegistrationStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Passed => "passed",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "passed" => Ok(RegistrationStatus::Passed),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            other => Err(format!("unknown registration status: {other}")),
        }
    }
}

/// Links a user to one session (and optionally a price tier).
///
/// At most one row exists per (user, session); a cancelled row is reactivated
/// in place on re-registration instead of inserting a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub tier_id: Option<Uuid>,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    pub payment_reference: Option<String>,
}

/// Input to the store's atomic reservation primitive. The limits are carried
/// along so the store can re-evaluate them under its own lock; the engine's
/// earlier evaluator pass only produces the friendly error counts.
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub tier_id: Option<Uuid>,
    pub initial_status: RegistrationStatus,
    /// Set when the session is part of a series; switches counting to
    /// distinct users across the whole series.
    pub series_key: Option<i64>,
    pub session_capacity: i32,
    pub tier_capacity: Option<i32>,
    pub payment_reference: Option<String>,
}

/// What the store did with a reservation request.
#[derive(Debug, Clone)]
pub enum ReservationOutcome {
    /// No prior row existed; a fresh registration was inserted.
    Created(Registration),
    /// A cancelled row for (user, session) was reactivated in place.
    Reactivated(Registration),
    /// An active registration already existed; nothing was written.
    AlreadyActive(Registration),
    /// The conditional write found the limit reached; nothing was written.
    Full {
        reason: CapacityReason,
        counts: CapacityCounts,
    },
}
