use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registration::Registration;
use crate::session::Session;

/// Audit entry for one cancellation event.
///
/// One record per (user, event): cancelling a whole series produces a single
/// record per affected user with the earliest session as representative;
/// cancelling a standalone session produces one per affected registration.
/// Terminal except for the `resolved` flag, which the refund workflow flips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub offering_id: Uuid,
    /// Representative session: the earliest affected one for a series.
    pub session_id: Uuid,
    pub series_key: Option<i64>,
    pub tier_id: Option<Uuid>,
    pub registered_at: DateTime<Utc>,
    pub cancelled_at: DateTime<Utc>,
    pub payment_reference: Option<String>,
    pub cancelled_by_admin: bool,
    pub resolved: bool,
}

impl CancellationRecord {
    pub fn for_registration(
        registration: &Registration,
        session: &Session,
        cancelled_by_admin: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: registration.user_id,
            offering_id: session.offering_id,
            session_id: session.id,
            series_key: session.grouping.series_key(),
            tier_id: registration.tier_id,
            registered_at: registration.registered_at,
            cancelled_at: Utc::now(),
            payment_reference: registration.payment_reference.clone(),
            cancelled_by_admin,
            resolved: false,
        }
    }
}

/// Equivalence probe for the shared idempotency rule: an audit record is a
/// duplicate when user, offering and admin flag match, and either the series
/// key matches (series cancellations) or the representative session does
/// (standalone ones).
#[derive(Debug, Clone)]
pub struct CancellationProbe {
    pub user_id: Uuid,
    pub offering_id: Uuid,
    pub session_id: Uuid,
    pub series_key: Option<i64>,
    pub cancelled_by_admin: bool,
}

impl CancellationProbe {
    pub fn matches(&self, record: &CancellationRecord) -> bool {
        if record.user_id != self.user_id
            || record.offering_id != self.offering_id
            || record.cancelled_by_admin != self.cancelled_by_admin
        {
            return false;
        }
        match self.series_key {
            Some(key) => record.series_key == Some(key),
            None => record.session_id == self.session_id,
        }
    }
}
