use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use kurso_catalog::capacity::{CapacityError, CapacityEvaluator, CapacityTarget};
use kurso_core::capacity::{CapacityCounts, CapacityReason};
use kurso_core::repository::{
    OfferingRepository, PriceTierRepository, RegistrationRepository, SessionRepository,
    StoreError,
};
use kurso_core::{
    Offering, PriceTier, ReservationOutcome, ReservationRequest, Session, SessionStatus,
    TierState,
};

use crate::models::{RegistrationOutcome, SeriesRegistration, SessionOutcome};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Offering not found: {0}")]
    OfferingNotFound(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Series not found: {0}")]
    SeriesNotFound(i64),

    #[error("Price tier not found: {0}")]
    TierNotFound(Uuid),

    #[error("Price tier is cancelled: {0}")]
    TierUnavailable(Uuid),

    #[error("Session is cancelled: {0}")]
    SessionUnavailable(Uuid),

    #[error("capacity exhausted: {reason}")]
    CapacityExhausted {
        reason: CapacityReason,
        counts: CapacityCounts,
    },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        RegistrationError::Store(err)
    }
}

impl From<CapacityError> for RegistrationError {
    fn from(err: CapacityError) -> Self {
        match err {
            CapacityError::OfferingNotFound(id) => RegistrationError::OfferingNotFound(id),
            CapacityError::SessionNotFound(id) => RegistrationError::SessionNotFound(id),
            CapacityError::SeriesNotFound(key) => RegistrationError::SeriesNotFound(key),
            CapacityError::TierNotFound(id) => RegistrationError::TierNotFound(id),
            CapacityError::Store(err) => RegistrationError::Store(err),
        }
    }
}

/// Books users onto sessions, one at a time or a whole series at once.
///
/// The capacity evaluator produces the friendly rejection (reason + counts);
/// the store's `reserve` primitive re-checks the same predicate atomically,
/// so a race loser gets the same structured rejection instead of an
/// overshoot.
pub struct RegistrationEngine {
    offerings: Arc<dyn OfferingRepository>,
    sessions: Arc<dyn SessionRepository>,
    tiers: Arc<dyn PriceTierRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    evaluator: CapacityEvaluator,
}

impl RegistrationEngine {
    pub fn new(
        offerings: Arc<dyn OfferingRepository>,
        sessions: Arc<dyn SessionRepository>,
        tiers: Arc<dyn PriceTierRepository>,
        registrations: Arc<dyn RegistrationRepository>,
    ) -> Self {
        let evaluator = CapacityEvaluator::new(
            offerings.clone(),
            sessions.clone(),
            tiers.clone(),
            registrations.clone(),
        );
        Self {
            offerings,
            sessions,
            tiers,
            registrations,
            evaluator,
        }
    }

    pub async fn register_for_session(
        &self,
        session_id: Uuid,
        user_id: Uuid,
        tier_id: Option<Uuid>,
    ) -> Result<SessionOutcome, RegistrationError> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(RegistrationError::SessionNotFound(session_id))?;
        if session.status == SessionStatus::Cancelled {
            return Err(RegistrationError::SessionUnavailable(session_id));
        }

        let offering = self
            .offerings
            .get(session.offering_id)
            .await?
            .ok_or(RegistrationError::OfferingNotFound(session.offering_id))?;
        let tier = self.resolve_tier(&offering, tier_id).await?;

        let decision = self
            .evaluator
            .evaluate(CapacityTarget::Session(session_id), tier_id)
            .await?;
        if !decision.has_capacity {
            return Err(RegistrationError::CapacityExhausted {
                reason: decision.reason.unwrap_or(CapacityReason::SessionFull),
                counts: decision.counts,
            });
        }

        let request = self.reservation_request(&offering, &session, user_id, tier.as_ref());
        let outcome = match self.registrations.reserve(&request).await? {
            ReservationOutcome::Created(_) => RegistrationOutcome::Registered,
            ReservationOutcome::Reactivated(_) => RegistrationOutcome::Reregistered,
            ReservationOutcome::AlreadyActive(_) => RegistrationOutcome::AlreadyRegistered,
            ReservationOutcome::Full { reason, counts } => {
                // Lost a race between the evaluator pass and the write.
                return Err(RegistrationError::CapacityExhausted { reason, counts });
            }
        };

        if outcome != RegistrationOutcome::AlreadyRegistered {
            self.publish_tier(tier.as_ref()).await?;
        }

        info!(session = %session_id, user = %user_id, ?outcome, "registration processed");
        Ok(SessionOutcome {
            session_id,
            start_at: session.start_at,
            outcome,
        })
    }

    /// Series-level capacity is granted once; after that every session gets
    /// its own independent write, and a failure on one never unwinds the
    /// others.
    pub async fn register_for_series(
        &self,
        series_key: i64,
        user_id: Uuid,
        tier_id: Option<Uuid>,
    ) -> Result<SeriesRegistration, RegistrationError> {
        let sessions = self.sessions.list_by_series(series_key).await?;
        let first = sessions
            .first()
            .ok_or(RegistrationError::SeriesNotFound(series_key))?;

        let offering = self
            .offerings
            .get(first.offering_id)
            .await?
            .ok_or(RegistrationError::OfferingNotFound(first.offering_id))?;
        let tier = self.resolve_tier(&offering, tier_id).await?;

        let decision = self
            .evaluator
            .evaluate(CapacityTarget::Series(series_key), tier_id)
            .await?;
        if !decision.has_capacity {
            return Err(RegistrationError::CapacityExhausted {
                reason: decision.reason.unwrap_or(CapacityReason::SessionFull),
                counts: decision.counts,
            });
        }

        let mut outcomes = Vec::with_capacity(sessions.len());
        let mut any_written = false;

        for session in &sessions {
            if session.status == SessionStatus::Cancelled {
                outcomes.push(SessionOutcome {
                    session_id: session.id,
                    start_at: session.start_at,
                    outcome: RegistrationOutcome::Failed("session is cancelled".into()),
                });
                continue;
            }

            let request = self.reservation_request(&offering, session, user_id, tier.as_ref());
            let outcome = match self.registrations.reserve(&request).await {
                Ok(ReservationOutcome::Created(_)) => {
                    any_written = true;
                    RegistrationOutcome::Registered
                }
                Ok(ReservationOutcome::Reactivated(_)) => {
                    any_written = true;
                    RegistrationOutcome::Reregistered
                }
                Ok(ReservationOutcome::AlreadyActive(_)) => RegistrationOutcome::AlreadyRegistered,
                Ok(ReservationOutcome::Full { reason, .. }) => {
                    RegistrationOutcome::Failed(reason.as_str().to_string())
                }
                Err(err) => {
                    error!(session = %session.id, user = %user_id, error = %err, "series registration write failed");
                    RegistrationOutcome::Failed(err.to_string())
                }
            };
            outcomes.push(SessionOutcome {
                session_id: session.id,
                start_at: session.start_at,
                outcome,
            });
        }

        if any_written {
            self.publish_tier(tier.as_ref()).await?;
        }

        info!(series_key, user = %user_id, sessions = outcomes.len(), "series registration processed");
        Ok(SeriesRegistration {
            series_key,
            user_id,
            outcomes,
        })
    }

    async fn resolve_tier(
        &self,
        offering: &Offering,
        tier_id: Option<Uuid>,
    ) -> Result<Option<PriceTier>, RegistrationError> {
        let Some(id) = tier_id else {
            return Ok(None);
        };
        let tier = self
            .tiers
            .get(id)
            .await?
            .filter(|t| t.offering_id == offering.id)
            .ok_or(RegistrationError::TierNotFound(id))?;
        if !tier.state.is_bookable() {
            return Err(RegistrationError::TierUnavailable(id));
        }
        Ok(Some(tier))
    }

    fn reservation_request(
        &self,
        offering: &Offering,
        session: &Session,
        user_id: Uuid,
        tier: Option<&PriceTier>,
    ) -> ReservationRequest {
        ReservationRequest {
            session_id: session.id,
            user_id,
            tier_id: tier.map(|t| t.id),
            initial_status: offering.kind.initial_registration_status(),
            series_key: session.grouping.series_key(),
            session_capacity: offering.capacity,
            tier_capacity: tier.map(|t| t.capacity),
            payment_reference: None,
        }
    }

    /// First registration against a draft tier publishes it; from then on the
    /// tier can only be cancelled, never hard-deleted.
    async fn publish_tier(&self, tier: Option<&PriceTier>) -> Result<(), RegistrationError> {
        if let Some(tier) = tier {
            if tier.state == TierState::Draft {
                self.tiers.set_state(tier.id, TierState::Published).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use kurso_core::{Grouping, OfferingKind, RegistrationStatus, SessionWindow};
    use kurso_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: RegistrationEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let engine = RegistrationEngine::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
            );
            Self { store, engine }
        }

        async fn offering(&self, kind: OfferingKind, capacity: i32) -> Offering {
            let offering = Offering::new("Metalworking 101", kind, capacity);
            OfferingRepository::create(self.store.as_ref(), &offering)
                .await
                .unwrap();
            offering
        }

        async fn session(&self, offering: &Offering, grouping: Grouping) -> Session {
            let start = Utc::now() + Duration::days(7);
            let window = SessionWindow {
                start_at: start,
                end_at: start + Duration::hours(3),
                local_start: start.naive_utc(),
                local_end: (start + Duration::hours(3)).naive_utc(),
            };
            let session = Session::new(offering.id, window, "Europe/Berlin", grouping);
            SessionRepository::create(self.store.as_ref(), &session)
                .await
                .unwrap();
            session
        }

        async fn tier(&self, offering: &Offering, capacity: i32) -> PriceTier {
            let tier = PriceTier::new(offering.id, "Student", 4500, capacity);
            PriceTierRepository::create(self.store.as_ref(), &tier)
                .await
                .unwrap();
            tier
        }
    }

    #[tokio::test]
    async fn third_registration_hits_session_capacity() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 2).await;
        let session = fx.session(&offering, Grouping::Standalone).await;

        for _ in 0..2 {
            let out = fx
                .engine
                .register_for_session(session.id, Uuid::new_v4(), None)
                .await
                .unwrap();
            assert_eq!(out.outcome, RegistrationOutcome::Registered);
        }

        let err = fx
            .engine
            .register_for_session(session.id, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        match err {
            RegistrationError::CapacityExhausted { reason, counts } => {
                assert_eq!(reason, CapacityReason::SessionFull);
                assert_eq!(counts.registered, 2);
                assert_eq!(counts.capacity, 2);
            }
            other => panic!("expected CapacityExhausted, got {other}"),
        }
    }

    #[tokio::test]
    async fn full_tier_rejects_but_base_price_succeeds() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 10).await;
        let session = fx.session(&offering, Grouping::Standalone).await;
        let tier = fx.tier(&offering, 1).await;

        fx.engine
            .register_for_session(session.id, Uuid::new_v4(), Some(tier.id))
            .await
            .unwrap();

        let blocked_user = Uuid::new_v4();
        let err = fx
            .engine
            .register_for_session(session.id, blocked_user, Some(tier.id))
            .await
            .unwrap_err();
        match err {
            RegistrationError::CapacityExhausted { reason, counts } => {
                assert_eq!(reason, CapacityReason::TierFull);
                assert_eq!(counts.tier_registered, Some(1));
            }
            other => panic!("expected CapacityExhausted, got {other}"),
        }

        // The session itself has room, so booking base price works.
        let out = fx
            .engine
            .register_for_session(session.id, blocked_user, None)
            .await
            .unwrap();
        assert_eq!(out.outcome, RegistrationOutcome::Registered);
    }

    #[tokio::test]
    async fn series_registration_writes_one_row_per_session() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 8).await;
        let a = fx.session(&offering, Grouping::Series(5)).await;
        let b = fx.session(&offering, Grouping::Series(5)).await;
        let c = fx.session(&offering, Grouping::Series(5)).await;
        let user = Uuid::new_v4();

        let result = fx
            .engine
            .register_for_series(5, user, None)
            .await
            .unwrap();

        assert_eq!(result.outcomes.len(), 3);
        assert!(result
            .outcomes
            .iter()
            .all(|o| o.outcome == RegistrationOutcome::Registered));
        for session in [&a, &b, &c] {
            let reg = fx.store.find(session.id, user).await.unwrap().unwrap();
            assert!(reg.status.is_active());
        }
    }

    #[tokio::test]
    async fn series_capacity_counts_distinct_users_once() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 1).await;
        fx.session(&offering, Grouping::Series(9)).await;
        fx.session(&offering, Grouping::Series(9)).await;

        // One user spanning both sessions consumes a single slot.
        fx.engine
            .register_for_series(9, Uuid::new_v4(), None)
            .await
            .unwrap();

        let err = fx
            .engine
            .register_for_series(9, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::CapacityExhausted {
                reason: CapacityReason::SessionFull,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_registration_is_reactivated_not_duplicated() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 5).await;
        let session = fx.session(&offering, Grouping::Standalone).await;
        let user = Uuid::new_v4();

        fx.engine
            .register_for_session(session.id, user, None)
            .await
            .unwrap();
        let reg = fx.store.find(session.id, user).await.unwrap().unwrap();
        RegistrationRepository::cancel(fx.store.as_ref(), reg.id)
            .await
            .unwrap();

        let out = fx
            .engine
            .register_for_session(session.id, user, None)
            .await
            .unwrap();
        assert_eq!(out.outcome, RegistrationOutcome::Reregistered);

        let after = fx.store.find(session.id, user).await.unwrap().unwrap();
        assert_eq!(after.id, reg.id);
        assert!(after.status.is_active());
    }

    #[tokio::test]
    async fn second_registration_is_a_noop() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 5).await;
        let session = fx.session(&offering, Grouping::Standalone).await;
        let user = Uuid::new_v4();

        fx.engine
            .register_for_session(session.id, user, None)
            .await
            .unwrap();
        let out = fx
            .engine
            .register_for_session(session.id, user, None)
            .await
            .unwrap();
        assert_eq!(out.outcome, RegistrationOutcome::AlreadyRegistered);
    }

    #[tokio::test]
    async fn exam_registrations_start_pending() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Exam, 5).await;
        let session = fx.session(&offering, Grouping::Standalone).await;
        let user = Uuid::new_v4();

        fx.engine
            .register_for_session(session.id, user, None)
            .await
            .unwrap();
        let reg = fx.store.find(session.id, user).await.unwrap().unwrap();
        assert_eq!(reg.status, RegistrationStatus::Pending);
    }

    #[tokio::test]
    async fn first_registration_publishes_draft_tier() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 5).await;
        let session = fx.session(&offering, Grouping::Standalone).await;
        let tier = fx.tier(&offering, 3).await;
        assert_eq!(tier.state, TierState::Draft);

        fx.engine
            .register_for_session(session.id, Uuid::new_v4(), Some(tier.id))
            .await
            .unwrap();

        let tier = PriceTierRepository::get(fx.store.as_ref(), tier.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tier.state, TierState::Published);
    }

    #[tokio::test]
    async fn concurrent_registrations_never_overshoot_capacity() {
        let fx = Fixture::new();
        let offering = fx.offering(OfferingKind::Standard, 3).await;
        let session = fx.session(&offering, Grouping::Standalone).await;

        let engine = Arc::new(RegistrationEngine::new(
            fx.store.clone(),
            fx.store.clone(),
            fx.store.clone(),
            fx.store.clone(),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            let session_id = session.id;
            handles.push(tokio::spawn(async move {
                engine
                    .register_for_session(session_id, Uuid::new_v4(), None)
                    .await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        let count = fx.store.count_active(session.id).await.unwrap();
        assert_eq!(count, 3);
    }
}
