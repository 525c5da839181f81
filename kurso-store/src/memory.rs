//! In-memory store backing local development and the engine test suites.
//! Every trait method takes the single mutex once, which is exactly the
//! serialisation the reservation primitive needs.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use kurso_core::capacity::{CapacityCounts, CapacityReason, TierPeak};
use kurso_core::collab::UserDirectory;
use kurso_core::repository::{
    CancellationLogRepository, OfferingRepository, PriceTierRepository, RegistrationRepository,
    SessionRepository, StoreError,
};
use kurso_core::{
    CancellationProbe, CancellationRecord, Offering, PriceTier, Registration, ReservationOutcome,
    ReservationRequest, Session, SessionStatus, SessionWindow, TierState,
};
use kurso_shared::UserRef;

#[derive(Default)]
struct State {
    offerings: HashMap<Uuid, Offering>,
    sessions: HashMap<Uuid, Session>,
    tiers: HashMap<Uuid, PriceTier>,
    registrations: HashMap<Uuid, Registration>,
    cancellations: Vec<CancellationRecord>,
    users: HashMap<Uuid, UserRef>,
}

impl State {
    fn series_session_ids(&self, series_key: i64) -> HashSet<Uuid> {
        self.sessions
            .values()
            .filter(|s| s.grouping.series_key() == Some(series_key))
            .map(|s| s.id)
            .collect()
    }

    fn count_active(&self, session_id: Uuid) -> i64 {
        self.registrations
            .values()
            .filter(|r| r.session_id == session_id && r.status.is_active())
            .count() as i64
    }

    fn count_active_by_tier(&self, session_id: Uuid, tier_id: Uuid) -> i64 {
        self.registrations
            .values()
            .filter(|r| {
                r.session_id == session_id && r.status.is_active() && r.tier_id == Some(tier_id)
            })
            .count() as i64
    }

    fn series_users(&self, series_key: i64, tier_id: Option<Uuid>) -> i64 {
        let sessions = self.series_session_ids(series_key);
        let users: HashSet<Uuid> = self
            .registrations
            .values()
            .filter(|r| {
                sessions.contains(&r.session_id)
                    && r.status.is_active()
                    && tier_id.map_or(true, |t| r.tier_id == Some(t))
            })
            .map(|r| r.user_id)
            .collect();
        users.len() as i64
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seeds an account for the user directory.
    pub fn add_user(&self, user: UserRef) {
        self.state().users.insert(user.id, user);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OfferingRepository for MemoryStore {
    async fn create(&self, offering: &Offering) -> Result<(), StoreError> {
        self.state().offerings.insert(offering.id, offering.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Offering>, StoreError> {
        Ok(self.state().offerings.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Offering>, StoreError> {
        let mut offerings: Vec<Offering> = self.state().offerings.values().cloned().collect();
        offerings.sort_by_key(|o| o.created_at);
        Ok(offerings)
    }

    async fn update(&self, offering: &Offering) -> Result<(), StoreError> {
        self.state().offerings.insert(offering.id, offering.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state();
        state.offerings.remove(&id);
        let session_ids: HashSet<Uuid> = state
            .sessions
            .values()
            .filter(|s| s.offering_id == id)
            .map(|s| s.id)
            .collect();
        state.sessions.retain(|_, s| s.offering_id != id);
        state.tiers.retain(|_, t| t.offering_id != id);
        state
            .registrations
            .retain(|_, r| !session_ids.contains(&r.session_id));
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        self.state().sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.state().sessions.get(&id).cloned())
    }

    async fn list_by_offering(&self, offering_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .state()
            .sessions
            .values()
            .filter(|s| s.offering_id == offering_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_at);
        Ok(sessions)
    }

    async fn list_by_series(&self, series_key: i64) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .state()
            .sessions
            .values()
            .filter(|s| s.grouping.series_key() == Some(series_key))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_at);
        Ok(sessions)
    }

    async fn update_window(&self, id: Uuid, window: &SessionWindow) -> Result<(), StoreError> {
        let mut state = self.state();
        if let Some(session) = state.sessions.get_mut(&id) {
            session.start_at = window.start_at;
            session.end_at = window.end_at;
            session.local_start = window.local_start;
            session.local_end = window.local_end;
        }
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: SessionStatus) -> Result<(), StoreError> {
        if let Some(session) = self.state().sessions.get_mut(&id) {
            session.status = status;
        }
        Ok(())
    }

    async fn set_calendar_event(
        &self,
        id: Uuid,
        event_id: Option<&str>,
    ) -> Result<(), StoreError> {
        if let Some(session) = self.state().sessions.get_mut(&id) {
            session.calendar_event_id = event_id.map(str::to_owned);
        }
        Ok(())
    }

    async fn set_series_key_for_offering(
        &self,
        offering_id: Uuid,
        series_key: Option<i64>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state();
        let mut touched = 0;
        for session in state.sessions.values_mut() {
            if session.offering_id == offering_id {
                session.grouping = series_key.into();
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn next_series_key(&self) -> Result<i64, StoreError> {
        let state = self.state();
        let from_sessions = state
            .sessions
            .values()
            .filter_map(|s| s.grouping.series_key())
            .max()
            .unwrap_or(0);
        let from_offerings = state
            .offerings
            .values()
            .filter_map(|o| o.series_key)
            .max()
            .unwrap_or(0);
        Ok(from_sessions.max(from_offerings) + 1)
    }

    async fn next_offer_batch_key(&self) -> Result<i64, StoreError> {
        let max = self
            .state()
            .sessions
            .values()
            .filter_map(|s| s.offer_batch_key)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn mark_elapsed_past(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state();
        let mut changed = 0;
        for session in state.sessions.values_mut() {
            if session.status == SessionStatus::Active && session.start_at < now {
                session.status = SessionStatus::Past;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state();
        state.sessions.remove(&id);
        state.registrations.retain(|_, r| r.session_id != id);
        Ok(())
    }
}

#[async_trait]
impl PriceTierRepository for MemoryStore {
    async fn create(&self, tier: &PriceTier) -> Result<(), StoreError> {
        self.state().tiers.insert(tier.id, tier.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PriceTier>, StoreError> {
        Ok(self.state().tiers.get(&id).cloned())
    }

    async fn list_by_offering(&self, offering_id: Uuid) -> Result<Vec<PriceTier>, StoreError> {
        let mut tiers: Vec<PriceTier> = self
            .state()
            .tiers
            .values()
            .filter(|t| t.offering_id == offering_id)
            .cloned()
            .collect();
        tiers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tiers)
    }

    async fn update(&self, tier: &PriceTier) -> Result<(), StoreError> {
        self.state().tiers.insert(tier.id, tier.clone());
        Ok(())
    }

    async fn set_state(&self, id: Uuid, tier_state: TierState) -> Result<(), StoreError> {
        if let Some(tier) = self.state().tiers.get_mut(&id) {
            tier.state = tier_state;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.state().tiers.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl RegistrationRepository for MemoryStore {
    async fn find(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self
            .state()
            .registrations
            .values()
            .find(|r| r.session_id == session_id && r.user_id == user_id)
            .cloned())
    }

    async fn active_for_session(&self, session_id: Uuid) -> Result<Vec<Registration>, StoreError> {
        Ok(self
            .state()
            .registrations
            .values()
            .filter(|r| r.session_id == session_id && r.status.is_active())
            .cloned()
            .collect())
    }

    async fn active_for_series(&self, series_key: i64) -> Result<Vec<Registration>, StoreError> {
        let state = self.state();
        let sessions = state.series_session_ids(series_key);
        Ok(state
            .registrations
            .values()
            .filter(|r| sessions.contains(&r.session_id) && r.status.is_active())
            .cloned()
            .collect())
    }

    async fn active_for_tier(&self, tier_id: Uuid) -> Result<Vec<Registration>, StoreError> {
        Ok(self
            .state()
            .registrations
            .values()
            .filter(|r| r.tier_id == Some(tier_id) && r.status.is_active())
            .cloned()
            .collect())
    }

    async fn count_active(&self, session_id: Uuid) -> Result<i64, StoreError> {
        Ok(self.state().count_active(session_id))
    }

    async fn count_active_by_tier(
        &self,
        session_id: Uuid,
        tier_id: Uuid,
    ) -> Result<i64, StoreError> {
        Ok(self.state().count_active_by_tier(session_id, tier_id))
    }

    async fn count_series_users(&self, series_key: i64) -> Result<i64, StoreError> {
        Ok(self.state().series_users(series_key, None))
    }

    async fn count_series_users_by_tier(
        &self,
        series_key: i64,
        tier_id: Uuid,
    ) -> Result<i64, StoreError> {
        Ok(self.state().series_users(series_key, Some(tier_id)))
    }

    async fn tier_peaks(&self, offering_id: Uuid) -> Result<Vec<TierPeak>, StoreError> {
        let state = self.state();
        let session_ids: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|s| s.offering_id == offering_id)
            .map(|s| s.id)
            .collect();

        let mut peaks: HashMap<Uuid, i64> = HashMap::new();
        for session_id in &session_ids {
            let mut per_tier: HashMap<Uuid, i64> = HashMap::new();
            for reg in state.registrations.values() {
                if reg.session_id == *session_id && reg.status.is_active() {
                    if let Some(tier_id) = reg.tier_id {
                        *per_tier.entry(tier_id).or_insert(0) += 1;
                    }
                }
            }
            for (tier_id, count) in per_tier {
                let peak = peaks.entry(tier_id).or_insert(0);
                *peak = (*peak).max(count);
            }
        }

        let mut result: Vec<TierPeak> = peaks
            .into_iter()
            .map(|(tier_id, peak)| TierPeak { tier_id, peak })
            .collect();
        result.sort_by_key(|p| p.tier_id);
        Ok(result)
    }

    async fn session_has_any(&self, session_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .registrations
            .values()
            .any(|r| r.session_id == session_id))
    }

    async fn tier_has_any(&self, tier_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .state()
            .registrations
            .values()
            .any(|r| r.tier_id == Some(tier_id)))
    }

    async fn reserve(
        &self,
        request: &ReservationRequest,
    ) -> Result<ReservationOutcome, StoreError> {
        let mut state = self.state();

        let existing = state
            .registrations
            .values()
            .find(|r| r.session_id == request.session_id && r.user_id == request.user_id)
            .cloned();

        if let Some(reg) = &existing {
            if reg.status.is_active() {
                return Ok(ReservationOutcome::AlreadyActive(reg.clone()));
            }
        }

        let registered = match request.series_key {
            Some(key) => state.series_users(key, None),
            None => state.count_active(request.session_id),
        };

        let tier_registered = request.tier_id.map(|tier_id| match request.series_key {
            Some(key) => state.series_users(key, Some(tier_id)),
            None => state.count_active_by_tier(request.session_id, tier_id),
        });

        let counts = CapacityCounts {
            registered,
            capacity: request.session_capacity,
            tier_registered,
            tier_capacity: request.tier_capacity,
        };

        if registered >= i64::from(request.session_capacity) {
            return Ok(ReservationOutcome::Full {
                reason: CapacityReason::SessionFull,
                counts,
            });
        }
        if let (Some(taken), Some(limit)) = (tier_registered, request.tier_capacity) {
            if taken >= i64::from(limit) {
                return Ok(ReservationOutcome::Full {
                    reason: CapacityReason::TierFull,
                    counts,
                });
            }
        }

        match existing {
            Some(mut reg) => {
                reg.status = request.initial_status;
                reg.tier_id = request.tier_id;
                reg.registered_at = Utc::now();
                reg.payment_reference = request.payment_reference.clone();
                state.registrations.insert(reg.id, reg.clone());
                Ok(ReservationOutcome::Reactivated(reg))
            }
            None => {
                let reg = Registration {
                    id: Uuid::new_v4(),
                    session_id: request.session_id,
                    user_id: request.user_id,
                    tier_id: request.tier_id,
                    status: request.initial_status,
                    registered_at: Utc::now(),
                    payment_reference: request.payment_reference.clone(),
                };
                state.registrations.insert(reg.id, reg.clone());
                Ok(ReservationOutcome::Created(reg))
            }
        }
    }

    async fn cancel(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(reg) = self.state().registrations.get_mut(&id) {
            reg.status = kurso_core::RegistrationStatus::Cancelled;
        }
        Ok(())
    }
}

#[async_trait]
impl CancellationLogRepository for MemoryStore {
    async fn insert(&self, record: &CancellationRecord) -> Result<(), StoreError> {
        self.state().cancellations.push(record.clone());
        Ok(())
    }

    async fn find_equivalent(
        &self,
        probe: &CancellationProbe,
    ) -> Result<Option<CancellationRecord>, StoreError> {
        Ok(self
            .state()
            .cancellations
            .iter()
            .find(|record| probe.matches(record))
            .cloned())
    }

    async fn list_unresolved(&self) -> Result<Vec<CancellationRecord>, StoreError> {
        Ok(self
            .state()
            .cancellations
            .iter()
            .filter(|record| !record.resolved)
            .cloned()
            .collect())
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(record) = self.state().cancellations.iter_mut().find(|r| r.id == id) {
            record.resolved = true;
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRef>, StoreError> {
        Ok(self.state().users.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kurso_core::{Grouping, OfferingKind, RegistrationStatus};

    fn window(start_offset_hours: i64) -> SessionWindow {
        let start = Utc::now() + Duration::hours(start_offset_hours);
        SessionWindow {
            start_at: start,
            end_at: start + Duration::hours(2),
            local_start: start.naive_utc(),
            local_end: (start + Duration::hours(2)).naive_utc(),
        }
    }

    #[tokio::test]
    async fn reserve_respects_session_capacity() {
        let store = MemoryStore::new();
        let offering = Offering::new("Intro", OfferingKind::Standard, 1);
        OfferingRepository::create(&store, &offering).await.unwrap();
        let session = Session::new(offering.id, window(24), "Europe/Berlin", Grouping::Standalone);
        SessionRepository::create(&store, &session).await.unwrap();

        let request = |user: Uuid| ReservationRequest {
            session_id: session.id,
            user_id: user,
            tier_id: None,
            initial_status: RegistrationStatus::Passed,
            series_key: None,
            session_capacity: 1,
            tier_capacity: None,
            payment_reference: None,
        };

        let first = store.reserve(&request(Uuid::new_v4())).await.unwrap();
        assert!(matches!(first, ReservationOutcome::Created(_)));

        let second = store.reserve(&request(Uuid::new_v4())).await.unwrap();
        match second {
            ReservationOutcome::Full { reason, counts } => {
                assert_eq!(reason, CapacityReason::SessionFull);
                assert_eq!(counts.registered, 1);
            }
            other => panic!("expected Full, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reserve_reactivates_cancelled_row_in_place() {
        let store = MemoryStore::new();
        let offering = Offering::new("Intro", OfferingKind::Standard, 5);
        OfferingRepository::create(&store, &offering).await.unwrap();
        let session = Session::new(offering.id, window(24), "Europe/Berlin", Grouping::Standalone);
        SessionRepository::create(&store, &session).await.unwrap();

        let user = Uuid::new_v4();
        let request = ReservationRequest {
            session_id: session.id,
            user_id: user,
            tier_id: None,
            initial_status: RegistrationStatus::Passed,
            series_key: None,
            session_capacity: 5,
            tier_capacity: None,
            payment_reference: None,
        };

        let created = match store.reserve(&request).await.unwrap() {
            ReservationOutcome::Created(reg) => reg,
            other => panic!("expected Created, got {other:?}"),
        };
        RegistrationRepository::cancel(&store, created.id).await.unwrap();

        let reactivated = match store.reserve(&request).await.unwrap() {
            ReservationOutcome::Reactivated(reg) => reg,
            other => panic!("expected Reactivated, got {other:?}"),
        };
        assert_eq!(reactivated.id, created.id);

        let row_count = store
            .state()
            .registrations
            .values()
            .filter(|r| r.session_id == session.id && r.user_id == user)
            .count();
        assert_eq!(row_count, 1);
    }

    #[tokio::test]
    async fn mark_elapsed_past_skips_cancelled() {
        let store = MemoryStore::new();
        let offering = Offering::new("Intro", OfferingKind::Standard, 5);
        OfferingRepository::create(&store, &offering).await.unwrap();

        let elapsed = Session::new(offering.id, window(-3), "Europe/Berlin", Grouping::Standalone);
        let mut cancelled =
            Session::new(offering.id, window(-3), "Europe/Berlin", Grouping::Standalone);
        cancelled.status = SessionStatus::Cancelled;
        let upcoming = Session::new(offering.id, window(3), "Europe/Berlin", Grouping::Standalone);

        for s in [&elapsed, &cancelled, &upcoming] {
            SessionRepository::create(&store, s).await.unwrap();
        }

        let changed = store.mark_elapsed_past(Utc::now()).await.unwrap();
        assert_eq!(changed, 1);

        let elapsed = SessionRepository::get(&store, elapsed.id).await.unwrap().unwrap();
        assert_eq!(elapsed.status, SessionStatus::Past);
        let cancelled = SessionRepository::get(&store, cancelled.id).await.unwrap().unwrap();
        assert_eq!(cancelled.status, SessionStatus::Cancelled);
        let upcoming = SessionRepository::get(&store, upcoming.id).await.unwrap().unwrap();
        assert_eq!(upcoming.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn series_keys_are_minted_monotonically() {
        let store = MemoryStore::new();
        assert_eq!(store.next_series_key().await.unwrap(), 1);

        let mut offering = Offering::new("Workshop", OfferingKind::Standard, 5);
        offering.series_key = Some(7);
        OfferingRepository::create(&store, &offering).await.unwrap();
        assert_eq!(store.next_series_key().await.unwrap(), 8);

        let session = Session::new(offering.id, window(24), "Europe/Berlin", Grouping::Series(12));
        SessionRepository::create(&store, &session).await.unwrap();
        assert_eq!(store.next_series_key().await.unwrap(), 13);
    }
}
