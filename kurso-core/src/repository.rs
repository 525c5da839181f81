use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cancellation::{CancellationProbe, CancellationRecord};
use crate::capacity::TierPeak;
use crate::offering::Offering;
use crate::registration::{Registration, ReservationOutcome, ReservationRequest};
use crate::session::{Session, SessionStatus, SessionWindow};
use crate::tier::{PriceTier, TierState};

/// Errors surface from backends unchanged; retry policy belongs to callers.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Repository trait for offering records.
#[async_trait]
pub trait OfferingRepository: Send + Sync {
    async fn create(&self, offering: &Offering) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Offering>, StoreError>;

    async fn list(&self) -> Result<Vec<Offering>, StoreError>;

    async fn update(&self, offering: &Offering) -> Result<(), StoreError>;

    /// Deletes the offering and cascades to its sessions.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Repository trait for session records.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Sessions of one offering, ordered by start time.
    async fn list_by_offering(&self, offering_id: Uuid) -> Result<Vec<Session>, StoreError>;

    /// Sessions sharing a series key, ordered by start time.
    async fn list_by_series(&self, series_key: i64) -> Result<Vec<Session>, StoreError>;

    async fn update_window(&self, id: Uuid, window: &SessionWindow) -> Result<(), StoreError>;

    async fn set_status(&self, id: Uuid, status: SessionStatus) -> Result<(), StoreError>;

    async fn set_calendar_event(
        &self,
        id: Uuid,
        event_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Stamps (or clears) the series key on every session of an offering.
    /// Returns the number of sessions touched.
    async fn set_series_key_for_offering(
        &self,
        offering_id: Uuid,
        series_key: Option<i64>,
    ) -> Result<u64, StoreError>;

    /// Mints the next series key: max existing + 1.
    async fn next_series_key(&self) -> Result<i64, StoreError>;

    /// Mints the next offer-batch key: max existing + 1.
    async fn next_offer_batch_key(&self) -> Result<i64, StoreError>;

    /// Bulk-transitions `Active` sessions whose start time has elapsed to
    /// `Past`; returns how many changed. Cancelled sessions are never
    /// touched.
    async fn mark_elapsed_past(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Repository trait for price tiers.
#[async_trait]
pub trait PriceTierRepository: Send + Sync {
    async fn create(&self, tier: &PriceTier) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<PriceTier>, StoreError>;

    async fn list_by_offering(&self, offering_id: Uuid) -> Result<Vec<PriceTier>, StoreError>;

    async fn update(&self, tier: &PriceTier) -> Result<(), StoreError>;

    async fn set_state(&self, id: Uuid, state: TierState) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Repository trait for registrations, including the aggregate queries the
/// capacity evaluator runs and the atomic reservation primitive.
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// The row for (session, user) regardless of status, if any.
    async fn find(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, StoreError>;

    async fn active_for_session(&self, session_id: Uuid) -> Result<Vec<Registration>, StoreError>;

    async fn active_for_series(&self, series_key: i64) -> Result<Vec<Registration>, StoreError>;

    async fn active_for_tier(&self, tier_id: Uuid) -> Result<Vec<Registration>, StoreError>;

    /// Non-cancelled registrations on one session.
    async fn count_active(&self, session_id: Uuid) -> Result<i64, StoreError>;

    /// Non-cancelled registrations on one session against one tier.
    async fn count_active_by_tier(
        &self,
        session_id: Uuid,
        tier_id: Uuid,
    ) -> Result<i64, StoreError>;

    /// Distinct users with a non-cancelled registration on any session of a
    /// series; a series consumes one slot per user.
    async fn count_series_users(&self, series_key: i64) -> Result<i64, StoreError>;

    async fn count_series_users_by_tier(
        &self,
        series_key: i64,
        tier_id: Uuid,
    ) -> Result<i64, StoreError>;

    /// Per tier, the maximum concurrent non-cancelled registration count
    /// across all of an offering's sessions.
    async fn tier_peaks(&self, offering_id: Uuid) -> Result<Vec<TierPeak>, StoreError>;

    /// Whether any registration row (any status) references the session.
    async fn session_has_any(&self, session_id: Uuid) -> Result<bool, StoreError>;

    /// Whether any registration row (any status) references the tier.
    async fn tier_has_any(&self, tier_id: Uuid) -> Result<bool, StoreError>;

    /// Atomic check-then-act write: re-evaluates the capacity predicate and
    /// the (user, session) row state under one lock/transaction, then
    /// creates, reactivates, or refuses. Two concurrent calls can never both
    /// overshoot a limit.
    async fn reserve(
        &self,
        request: &ReservationRequest,
    ) -> Result<ReservationOutcome, StoreError>;

    /// Flips one registration to cancelled.
    async fn cancel(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Repository trait for the cancellation audit log.
#[async_trait]
pub trait CancellationLogRepository: Send + Sync {
    async fn insert(&self, record: &CancellationRecord) -> Result<(), StoreError>;

    /// An already-recorded equivalent of the probe, if one exists. The
    /// engines consult this before every insert so replayed cancellation
    /// logic never duplicates audit rows.
    async fn find_equivalent(
        &self,
        probe: &CancellationProbe,
    ) -> Result<Option<CancellationRecord>, StoreError>;

    async fn list_unresolved(&self) -> Result<Vec<CancellationRecord>, StoreError>;

    async fn mark_resolved(&self, id: Uuid) -> Result<(), StoreError>;
}
