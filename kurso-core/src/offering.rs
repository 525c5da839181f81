use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registration::RegistrationStatus;

/// Registration semantics of an offering. Exam-style offerings hold their
/// registrations at `Pending` until a result is entered; everything else is
/// booked as `Passed` right away.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OfferingKind {
    Standard,
    Exam,
}

impl OfferingKind {
    pub fn initial_registration_status(&self) -> RegistrationStatus {
        match self {
            OfferingKind::Exam => RegistrationStatus::Pending,
            OfferingKind::Standard => RegistrationStatus::Passed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferingKind::Standard => "standard",
            OfferingKind::Exam => "exam",
        }
    }
}

impl std::str::FromStr for OfferingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(OfferingKind::Standard),
            "exam" => Ok(OfferingKind::Exam),
            other => Err(format!("unknown offering kind: {other}")),
        }
    }
}

/// A bookable item. Sessions are its concrete time windows; `capacity` is the
/// base attendee limit every session inherits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offering {
    pub id: Uuid,
    pub title: String,
    pub kind: OfferingKind,
    pub capacity: i32,
    pub tiered_pricing: bool,
    pub multi_day: bool,
    /// Present exactly while `multi_day` is set; the key all of this
    /// offering's sessions share.
    pub series_key: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Offering {
    pub fn new(title: impl Into<String>, kind: OfferingKind, capacity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            kind,
            capacity,
            tiered_pricing: false,
            multi_day: false,
            series_key: None,
            created_at: Utc::now(),
        }
    }
}
