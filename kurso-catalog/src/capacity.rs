use std::sync::Arc;

use uuid::Uuid;

use kurso_core::capacity::{CapacityCounts, CapacityDecision, CapacityReason, TierPeak};
use kurso_core::repository::{
    OfferingRepository, PriceTierRepository, RegistrationRepository, SessionRepository,
    StoreError,
};
use kurso_core::{Grouping, Offering};

/// What a capacity question is asked about: one session, or a whole series.
#[derive(Debug, Clone, Copy)]
pub enum CapacityTarget {
    Session(Uuid),
    Series(i64),
}

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("Offering not found: {0}")]
    OfferingNotFound(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Series not found: {0}")]
    SeriesNotFound(i64),

    #[error("Price tier not found: {0}")]
    TierNotFound(Uuid),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CapacityError {
    fn from(err: StoreError) -> Self {
        CapacityError::Store(err)
    }
}

/// Computes whether a session or series still has room, and why not if it
/// doesn't. Read-only; the authoritative re-check happens inside the store's
/// reservation primitive.
pub struct CapacityEvaluator {
    offerings: Arc<dyn OfferingRepository>,
    sessions: Arc<dyn SessionRepository>,
    tiers: Arc<dyn PriceTierRepository>,
    registrations: Arc<dyn RegistrationRepository>,
}

impl CapacityEvaluator {
    pub fn new(
        offerings: Arc<dyn OfferingRepository>,
        sessions: Arc<dyn SessionRepository>,
        tiers: Arc<dyn PriceTierRepository>,
        registrations: Arc<dyn RegistrationRepository>,
    ) -> Self {
        Self {
            offerings,
            sessions,
            tiers,
            registrations,
        }
    }

    /// Session-level check first; its failure reason takes precedence over
    /// the tier-level one. A request is granted only if both pass.
    pub async fn evaluate(
        &self,
        target: CapacityTarget,
        tier_id: Option<Uuid>,
    ) -> Result<CapacityDecision, CapacityError> {
        let (offering, registered, series_key) = self.resolve(target).await?;

        let mut counts = CapacityCounts {
            registered,
            capacity: offering.capacity,
            tier_registered: None,
            tier_capacity: None,
        };

        let tier = match tier_id {
            Some(id) => {
                let tier = self
                    .tiers
                    .get(id)
                    .await?
                    .filter(|t| t.offering_id == offering.id)
                    .ok_or(CapacityError::TierNotFound(id))?;
                let tier_registered = match (series_key, target) {
                    (Some(key), _) => {
                        self.registrations
                            .count_series_users_by_tier(key, tier.id)
                            .await?
                    }
                    (None, CapacityTarget::Session(session_id)) => {
                        self.registrations
                            .count_active_by_tier(session_id, tier.id)
                            .await?
                    }
                    // A series target without a key cannot resolve (caught
                    // above); keep the match total.
                    (None, CapacityTarget::Series(key)) => {
                        return Err(CapacityError::SeriesNotFound(key))
                    }
                };
                counts.tier_registered = Some(tier_registered);
                counts.tier_capacity = Some(tier.capacity);
                Some(tier)
            }
            None => None,
        };

        if registered >= i64::from(offering.capacity) {
            return Ok(CapacityDecision::refused(
                CapacityReason::SessionFull,
                counts,
            ));
        }

        if let Some(tier) = tier {
            let tier_registered = counts.tier_registered.unwrap_or(0);
            if tier_registered >= i64::from(tier.capacity) {
                return Ok(CapacityDecision::refused(CapacityReason::TierFull, counts));
            }
        }

        Ok(CapacityDecision::granted(counts))
    }

    /// Per-tier worst case across all of an offering's sessions, for sizing
    /// tier capacity when sessions are independent occurrences.
    pub async fn tier_peaks(&self, offering_id: Uuid) -> Result<Vec<TierPeak>, CapacityError> {
        self.offerings
            .get(offering_id)
            .await?
            .ok_or(CapacityError::OfferingNotFound(offering_id))?;
        Ok(self.registrations.tier_peaks(offering_id).await?)
    }

    /// Resolves the target to its offering, the session-level count, and the
    /// series key if counting crossed a series.
    async fn resolve(
        &self,
        target: CapacityTarget,
    ) -> Result<(Offering, i64, Option<i64>), CapacityError> {
        match target {
            CapacityTarget::Session(session_id) => {
                let session = self
                    .sessions
                    .get(session_id)
                    .await?
                    .ok_or(CapacityError::SessionNotFound(session_id))?;
                let offering = self
                    .offerings
                    .get(session.offering_id)
                    .await?
                    .ok_or(CapacityError::OfferingNotFound(session.offering_id))?;
                match session.grouping {
                    Grouping::Series(key) => {
                        let registered = self.registrations.count_series_users(key).await?;
                        Ok((offering, registered, Some(key)))
                    }
                    Grouping::Standalone => {
                        let registered = self.registrations.count_active(session_id).await?;
                        Ok((offering, registered, None))
                    }
                }
            }
            CapacityTarget::Series(series_key) => {
                let sessions = self.sessions.list_by_series(series_key).await?;
                let first = sessions
                    .first()
                    .ok_or(CapacityError::SeriesNotFound(series_key))?;
                let offering = self
                    .offerings
                    .get(first.offering_id)
                    .await?
                    .ok_or(CapacityError::OfferingNotFound(first.offering_id))?;
                let registered = self.registrations.count_series_users(series_key).await?;
                Ok((offering, registered, Some(series_key)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use kurso_core::repository::{
        OfferingRepository, PriceTierRepository, RegistrationRepository, SessionRepository,
    };
    use kurso_core::{
        Grouping, Offering, OfferingKind, PriceTier, RegistrationStatus, ReservationRequest,
        Session, SessionWindow,
    };
    use kurso_store::MemoryStore;

    fn evaluator(store: &Arc<MemoryStore>) -> CapacityEvaluator {
        CapacityEvaluator::new(store.clone(), store.clone(), store.clone(), store.clone())
    }

    async fn seed_session(
        store: &MemoryStore,
        offering: &Offering,
        grouping: Grouping,
        days: i64,
    ) -> Session {
        let start = Utc::now() + Duration::days(days);
        let window = SessionWindow {
            start_at: start,
            end_at: start + Duration::hours(2),
            local_start: start.naive_utc(),
            local_end: (start + Duration::hours(2)).naive_utc(),
        };
        let session = Session::new(offering.id, window, "Europe/Berlin", grouping);
        SessionRepository::create(store, &session).await.unwrap();
        session
    }

    async fn seed_registration(store: &MemoryStore, session: &Session, tier: Option<&PriceTier>) {
        let request = ReservationRequest {
            session_id: session.id,
            user_id: Uuid::new_v4(),
            tier_id: tier.map(|t| t.id),
            initial_status: RegistrationStatus::Passed,
            series_key: session.grouping.series_key(),
            session_capacity: i32::MAX,
            tier_capacity: tier.map(|_| i32::MAX),
            payment_reference: None,
        };
        store.reserve(&request).await.unwrap();
    }

    #[tokio::test]
    async fn session_full_takes_precedence_over_tier_full() {
        let store = Arc::new(MemoryStore::new());
        let offering = Offering::new("Life drawing", OfferingKind::Standard, 1);
        OfferingRepository::create(store.as_ref(), &offering)
            .await
            .unwrap();
        let session = seed_session(store.as_ref(), &offering, Grouping::Standalone, 3).await;

        let tier = PriceTier::new(offering.id, "Student", 2000, 1);
        PriceTierRepository::create(store.as_ref(), &tier)
            .await
            .unwrap();

        seed_registration(store.as_ref(), &session, Some(&tier)).await;

        // Both limits are reached; the session-level reason wins.
        let decision = evaluator(&store)
            .evaluate(CapacityTarget::Session(session.id), Some(tier.id))
            .await
            .unwrap();
        assert!(!decision.has_capacity);
        assert_eq!(decision.reason, Some(CapacityReason::SessionFull));
        assert_eq!(decision.counts.registered, 1);
        assert_eq!(decision.counts.tier_registered, Some(1));
    }

    #[tokio::test]
    async fn series_counting_is_per_user_not_per_row() {
        let store = Arc::new(MemoryStore::new());
        let offering = Offering::new("Weaving week", OfferingKind::Standard, 4);
        OfferingRepository::create(store.as_ref(), &offering)
            .await
            .unwrap();
        let a = seed_session(store.as_ref(), &offering, Grouping::Series(2), 1).await;
        let b = seed_session(store.as_ref(), &offering, Grouping::Series(2), 2).await;

        // One user on both sessions of the series: two rows, one slot.
        let user = Uuid::new_v4();
        for session in [&a, &b] {
            let request = ReservationRequest {
                session_id: session.id,
                user_id: user,
                tier_id: None,
                initial_status: RegistrationStatus::Passed,
                series_key: Some(2),
                session_capacity: offering.capacity,
                tier_capacity: None,
                payment_reference: None,
            };
            store.reserve(&request).await.unwrap();
        }

        let decision = evaluator(&store)
            .evaluate(CapacityTarget::Series(2), None)
            .await
            .unwrap();
        assert!(decision.has_capacity);
        assert_eq!(decision.counts.registered, 1);
    }

    #[tokio::test]
    async fn tier_peaks_report_worst_single_session() {
        let store = Arc::new(MemoryStore::new());
        let offering = Offering::new("Intro nights", OfferingKind::Standard, 20);
        OfferingRepository::create(store.as_ref(), &offering)
            .await
            .unwrap();
        let first = seed_session(store.as_ref(), &offering, Grouping::Standalone, 1).await;
        let second = seed_session(store.as_ref(), &offering, Grouping::Standalone, 2).await;

        let tier = PriceTier::new(offering.id, "Member", 1500, 10);
        PriceTierRepository::create(store.as_ref(), &tier)
            .await
            .unwrap();

        // 2 on the first night, 1 on the second: the peak is 2, not 3.
        seed_registration(store.as_ref(), &first, Some(&tier)).await;
        seed_registration(store.as_ref(), &first, Some(&tier)).await;
        seed_registration(store.as_ref(), &second, Some(&tier)).await;

        let peaks = evaluator(&store).tier_peaks(offering.id).await.unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].tier_id, tier.id);
        assert_eq!(peaks[0].peak, 2);
    }
}
