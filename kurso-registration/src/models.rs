use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-session result of a registration call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// A fresh registration row was created.
    Registered,
    /// A previously cancelled registration was reactivated in place.
    Reregistered,
    /// An active registration already existed; nothing changed.
    AlreadyRegistered,
    /// This session's write failed; the rest of the series is unaffected.
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub outcome: RegistrationOutcome,
}

/// Result of registering for a whole series: one entry per session, in start
/// order. Partial success is possible and reported, never rolled back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesRegistration {
    pub series_key: i64,
    pub user_id: Uuid,
    pub outcomes: Vec<SessionOutcome>,
}
