use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a session.
///
/// `Active -> Past` is driven purely by wall-clock time (the lifecycle
/// worker); `Cancelled` is set only by the cancellation engine and is
/// terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Past,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Past => "past",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "past" => Ok(SessionStatus::Past),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Whether a session stands alone or is one day of a multi-day series.
///
/// Stored as a nullable key, but modelled as a sum type so "is this part of a
/// series" is a match, not a scattered null check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "key")]
pub enum Grouping {
    Standalone,
    Series(i64),
}

impl Grouping {
    pub fn series_key(&self) -> Option<i64> {
        match self {
            Grouping::Standalone => None,
            Grouping::Series(key) => Some(*key),
        }
    }

    pub fn is_series(&self) -> bool {
        matches!(self, Grouping::Series(_))
    }
}

impl From<Option<i64>> for Grouping {
    fn from(key: Option<i64>) -> Self {
        match key {
            Some(k) => Grouping::Series(k),
            None => Grouping::Standalone,
        }
    }
}

/// The time window of a session: the canonical UTC pair plus the wall-clock
/// pair shown to attendees in the venue timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub local_start: NaiveDateTime,
    pub local_end: NaiveDateTime,
}

/// One concrete occurrence of an offering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub offering_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub local_start: NaiveDateTime,
    pub local_end: NaiveDateTime,
    pub timezone: String,
    pub status: SessionStatus,
    pub grouping: Grouping,
    /// Groups sessions created together through "offer again".
    pub offer_batch_key: Option<i64>,
    pub calendar_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        offering_id: Uuid,
        window: SessionWindow,
        timezone: impl Into<String>,
        grouping: Grouping,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            offering_id,
            start_at: window.start_at,
            end_at: window.end_at,
            local_start: window.local_start,
            local_end: window.local_end,
            timezone: timezone.into(),
            status: SessionStatus::Active,
            grouping,
            offer_batch_key: None,
            calendar_event_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn window(&self) -> SessionWindow {
        SessionWindow {
            start_at: self.start_at,
            end_at: self.end_at,
            local_start: self.local_start,
            local_end: self.local_end,
        }
    }
}
