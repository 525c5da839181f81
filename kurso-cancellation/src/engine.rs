use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use kurso_core::collab::{CalendarPublisher, CancellationNotifier, UserDirectory};
use kurso_core::repository::{
    CancellationLogRepository, OfferingRepository, PriceTierRepository, RegistrationRepository,
    SessionRepository, StoreError,
};
use kurso_core::{
    CancellationProbe, CancellationRecord, Offering, PriceTier, Registration, Session,
    SessionStatus, TierState,
};

#[derive(Debug, thiserror::Error)]
pub enum CancellationError {
    #[error("Offering not found: {0}")]
    OfferingNotFound(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Series not found: {0}")]
    SeriesNotFound(i64),

    #[error("Price tier not found: {0}")]
    TierNotFound(Uuid),

    #[error("nothing to cancel")]
    NothingToCancel,

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CancellationError {
    fn from(err: StoreError) -> Self {
        CancellationError::Store(err)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCancellation {
    pub session_id: Uuid,
    pub registrations_cancelled: usize,
    pub records_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesCancellation {
    pub series_key: i64,
    pub sessions_cancelled: usize,
    pub registrations_cancelled: usize,
    pub records_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierCancellation {
    pub tier_id: Uuid,
    pub registrations_cancelled: usize,
    pub records_created: usize,
}

/// Retires sessions, series, tiers and individual registrations, leaving an
/// auditable trail: exactly one cancellation record per (user, event), with
/// series events deduplicated across their sessions. Calendar and mail are
/// best-effort collaborators; their failures never abort a cancellation.
pub struct CancellationEngine {
    offerings: Arc<dyn OfferingRepository>,
    sessions: Arc<dyn SessionRepository>,
    tiers: Arc<dyn PriceTierRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    log: Arc<dyn CancellationLogRepository>,
    users: Arc<dyn UserDirectory>,
    calendar: Arc<dyn CalendarPublisher>,
    notifier: Arc<dyn CancellationNotifier>,
}

impl CancellationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        offerings: Arc<dyn OfferingRepository>,
        sessions: Arc<dyn SessionRepository>,
        tiers: Arc<dyn PriceTierRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        log: Arc<dyn CancellationLogRepository>,
        users: Arc<dyn UserDirectory>,
        calendar: Arc<dyn CalendarPublisher>,
        notifier: Arc<dyn CancellationNotifier>,
    ) -> Self {
        Self {
            offerings,
            sessions,
            tiers,
            registrations,
            log,
            users,
            calendar,
            notifier,
        }
    }

    /// Admin path for one session. Registrations on the session are flipped,
    /// audit records written (deduplicated per user across the series when
    /// the session belongs to one), the calendar entry dropped, the status
    /// set to cancelled, and every affected user notified once.
    pub async fn cancel_session(
        &self,
        session_id: Uuid,
        cancelled_by_admin: bool,
    ) -> Result<SessionCancellation, CancellationError> {
        let session = self.get_session(session_id).await?;
        let offering = self.get_offering(session.offering_id).await?;

        let affected = self.retire_session(&session, cancelled_by_admin).await?;

        // A series member's notification enumerates every date of the
        // series; a standalone session gets the single-session shape.
        match session.grouping.series_key() {
            Some(key) => {
                let series_sessions = self.sessions.list_by_series(key).await?;
                for (user_id, tier_id) in &affected.users {
                    self.notify_series(*user_id, *tier_id, &offering, &series_sessions)
                        .await;
                }
            }
            None => {
                for (user_id, tier_id) in &affected.users {
                    self.notify(*user_id, *tier_id, &offering, &session).await;
                }
            }
        }

        info!(
            session = %session_id,
            cancelled = affected.registrations_cancelled,
            records = affected.records_created,
            "session cancelled"
        );
        Ok(SessionCancellation {
            session_id,
            registrations_cancelled: affected.registrations_cancelled,
            records_created: affected.records_created,
        })
    }

    /// Admin path for a whole series: every session is retired, audit dedup
    /// converges to one record per user, and each user gets a single message
    /// enumerating all session dates.
    pub async fn cancel_series(
        &self,
        series_key: i64,
    ) -> Result<SeriesCancellation, CancellationError> {
        let sessions = self.sessions.list_by_series(series_key).await?;
        let first = sessions
            .first()
            .ok_or(CancellationError::SeriesNotFound(series_key))?;
        let offering = self.get_offering(first.offering_id).await?;

        let mut registrations_cancelled = 0;
        let mut records_created = 0;
        let mut affected_users: HashMap<Uuid, Option<Uuid>> = HashMap::new();

        for session in &sessions {
            let affected = self.retire_session(session, true).await?;
            registrations_cancelled += affected.registrations_cancelled;
            records_created += affected.records_created;
            for (user_id, tier_id) in affected.users {
                affected_users.entry(user_id).or_insert(tier_id);
            }
        }

        for (user_id, tier_id) in &affected_users {
            self.notify_series(*user_id, *tier_id, &offering, &sessions).await;
        }

        info!(
            series_key,
            sessions = sessions.len(),
            cancelled = registrations_cancelled,
            records = records_created,
            "series cancelled"
        );
        Ok(SeriesCancellation {
            series_key,
            sessions_cancelled: sessions.len(),
            registrations_cancelled,
            records_created,
        })
    }

    /// User-initiated cancellation of a single session registration.
    pub async fn cancel_registration(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), CancellationError> {
        let session = self.get_session(session_id).await?;
        self.get_offering(session.offering_id).await?;

        let registration = self
            .registrations
            .find(session_id, user_id)
            .await?
            .filter(|r| r.status.is_active())
            .ok_or(CancellationError::NothingToCancel)?;

        self.registrations.cancel(registration.id).await?;
        self.write_audit(&registration, &session, false).await?;

        info!(session = %session_id, user = %user_id, "registration cancelled by user");
        Ok(())
    }

    /// User-initiated cancellation across a whole series: all of the user's
    /// active registrations flip, and exactly one audit record is written,
    /// referencing the earliest affected session.
    pub async fn cancel_series_registration(
        &self,
        series_key: i64,
        user_id: Uuid,
    ) -> Result<(), CancellationError> {
        let sessions = self.sessions.list_by_series(series_key).await?;
        if sessions.is_empty() {
            return Err(CancellationError::SeriesNotFound(series_key));
        }
        self.get_offering(sessions[0].offering_id).await?;

        // Sessions come back in start order, so the first hit is the
        // representative.
        let mut cancelled: Vec<(Registration, &Session)> = Vec::new();
        for session in &sessions {
            if let Some(registration) = self
                .registrations
                .find(session.id, user_id)
                .await?
                .filter(|r| r.status.is_active())
            {
                self.registrations.cancel(registration.id).await?;
                cancelled.push((registration, session));
            }
        }

        let (representative_reg, representative_session) = cancelled
            .first()
            .ok_or(CancellationError::NothingToCancel)?;
        self.write_audit(representative_reg, representative_session, false)
            .await?;

        info!(series_key, user = %user_id, sessions = cancelled.len(), "series registration cancelled by user");
        Ok(())
    }

    /// Marks the tier cancelled and cascades over every non-cancelled
    /// registration referencing it, with the usual per-user audit dedup for
    /// series and the two notification shapes.
    pub async fn cancel_price_tier(
        &self,
        tier_id: Uuid,
    ) -> Result<TierCancellation, CancellationError> {
        let tier = self
            .tiers
            .get(tier_id)
            .await?
            .ok_or(CancellationError::TierNotFound(tier_id))?;
        let offering = self.get_offering(tier.offering_id).await?;

        self.tiers.set_state(tier_id, TierState::Cancelled).await?;

        let sessions: HashMap<Uuid, Session> = self
            .sessions
            .list_by_offering(offering.id)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let registrations = self.registrations.active_for_tier(tier_id).await?;
        let mut records_created = 0;
        let mut per_user: HashMap<Uuid, Vec<Registration>> = HashMap::new();

        for registration in registrations {
            let Some(session) = sessions.get(&registration.session_id) else {
                warn!(registration = %registration.id, "tier registration points at unknown session");
                continue;
            };
            self.registrations.cancel(registration.id).await?;
            if self.write_audit(&registration, session, true).await? {
                records_created += 1;
            }
            per_user
                .entry(registration.user_id)
                .or_default()
                .push(registration);
        }

        let mut registrations_cancelled = 0;
        for (user_id, regs) in &per_user {
            registrations_cancelled += regs.len();
            for registration in regs {
                let Some(session) = sessions.get(&registration.session_id) else {
                    continue;
                };
                match session.grouping.series_key() {
                    Some(key) => {
                        let series_sessions = self.sessions.list_by_series(key).await?;
                        self.notify_series(*user_id, Some(tier_id), &offering, &series_sessions)
                            .await;
                        // One series message covers all of this user's rows.
                        break;
                    }
                    None => {
                        self.notify(*user_id, Some(tier_id), &offering, session).await;
                    }
                }
            }
        }

        info!(
            tier = %tier_id,
            cancelled = registrations_cancelled,
            records = records_created,
            "price tier cancelled"
        );
        Ok(TierCancellation {
            tier_id,
            registrations_cancelled,
            records_created,
        })
    }

    /// Cancels everything on one session and writes audit rows. Returns the
    /// affected (user, tier) pairs for notification fan-out.
    async fn retire_session(
        &self,
        session: &Session,
        cancelled_by_admin: bool,
    ) -> Result<RetiredSession, CancellationError> {
        let registrations = self.registrations.active_for_session(session.id).await?;
        let mut records_created = 0;
        let mut users = Vec::new();

        for registration in &registrations {
            self.registrations.cancel(registration.id).await?;
            if self.write_audit(registration, session, cancelled_by_admin).await? {
                records_created += 1;
            }
            users.push((registration.user_id, registration.tier_id));
        }

        if let Some(event_id) = session.calendar_event_id.as_deref() {
            if let Err(err) = self.calendar.delete_event(event_id).await {
                warn!(session = %session.id, error = %err, "calendar delete failed");
            }
            self.sessions.set_calendar_event(session.id, None).await?;
        }
        self.sessions
            .set_status(session.id, SessionStatus::Cancelled)
            .await?;

        Ok(RetiredSession {
            registrations_cancelled: registrations.len(),
            records_created,
            users,
        })
    }

    /// The shared idempotency rule: skip insertion when an equivalent record
    /// already exists for this (user, offering, series-or-session, admin
    /// flag) combination. Returns whether a record was written.
    async fn write_audit(
        &self,
        registration: &Registration,
        session: &Session,
        cancelled_by_admin: bool,
    ) -> Result<bool, CancellationError> {
        let probe = CancellationProbe {
            user_id: registration.user_id,
            offering_id: session.offering_id,
            session_id: session.id,
            series_key: session.grouping.series_key(),
            cancelled_by_admin,
        };
        if self.log.find_equivalent(&probe).await?.is_some() {
            return Ok(false);
        }

        let record = CancellationRecord::for_registration(registration, session, cancelled_by_admin);
        self.log.insert(&record).await?;
        Ok(true)
    }

    async fn notify(
        &self,
        user_id: Uuid,
        tier_id: Option<Uuid>,
        offering: &Offering,
        session: &Session,
    ) {
        let Some(user) = self.lookup_user(user_id).await else {
            return;
        };
        let tier = self.lookup_tier(tier_id).await;
        if let Err(err) = self
            .notifier
            .send_session_cancellation(&user, offering, session, tier.as_ref())
            .await
        {
            warn!(user = %user_id, error = %err, "cancellation mail failed");
        }
    }

    async fn notify_series(
        &self,
        user_id: Uuid,
        tier_id: Option<Uuid>,
        offering: &Offering,
        sessions: &[Session],
    ) {
        let Some(user) = self.lookup_user(user_id).await else {
            return;
        };
        let tier = self.lookup_tier(tier_id).await;
        if let Err(err) = self
            .notifier
            .send_series_cancellation(&user, offering, sessions, tier.as_ref())
            .await
        {
            warn!(user = %user_id, error = %err, "series cancellation mail failed");
        }
    }

    async fn lookup_user(&self, user_id: Uuid) -> Option<kurso_shared::UserRef> {
        match self.users.get_user(user_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                warn!(user = %user_id, "no account for cancellation mail");
                None
            }
            Err(err) => {
                warn!(user = %user_id, error = %err, "user lookup failed");
                None
            }
        }
    }

    async fn lookup_tier(&self, tier_id: Option<Uuid>) -> Option<PriceTier> {
        let id = tier_id?;
        match self.tiers.get(id).await {
            Ok(tier) => tier,
            Err(err) => {
                warn!(tier = %id, error = %err, "tier lookup failed");
                None
            }
        }
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, CancellationError> {
        self.sessions
            .get(id)
            .await?
            .ok_or(CancellationError::SessionNotFound(id))
    }

    async fn get_offering(&self, id: Uuid) -> Result<Offering, CancellationError> {
        self.offerings
            .get(id)
            .await?
            .ok_or(CancellationError::OfferingNotFound(id))
    }
}

struct RetiredSession {
    registrations_cancelled: usize,
    records_created: usize,
    users: Vec<(Uuid, Option<Uuid>)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use kurso_core::repository::StoreError;
    use kurso_core::{Grouping, OfferingKind, SessionWindow};
    use kurso_shared::UserRef;
    use kurso_store::MemoryStore;
    use std::sync::Mutex;

    struct RecordingCalendar {
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CalendarPublisher for RecordingCalendar {
        async fn create_event(
            &self,
            _offering: &Offering,
            session: &Session,
        ) -> Result<String, StoreError> {
            Ok(format!("evt-{}", session.id))
        }

        async fn update_event(
            &self,
            _offering: &Offering,
            _session: &Session,
        ) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_event(&self, event_id: &str) -> Result<(), StoreError> {
            self.deleted.lock().unwrap().push(event_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        // (user, number of sessions mentioned)
        sent: Mutex<Vec<(Uuid, usize)>>,
    }

    #[async_trait]
    impl CancellationNotifier for RecordingNotifier {
        async fn send_session_cancellation(
            &self,
            user: &UserRef,
            _offering: &Offering,
            _session: &Session,
            _tier: Option<&PriceTier>,
        ) -> Result<(), StoreError> {
            self.sent.lock().unwrap().push((user.id, 1));
            Ok(())
        }

        async fn send_series_cancellation(
            &self,
            user: &UserRef,
            _offering: &Offering,
            sessions: &[Session],
            _tier: Option<&PriceTier>,
        ) -> Result<(), StoreError> {
            self.sent.lock().unwrap().push((user.id, sessions.len()));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        calendar: Arc<RecordingCalendar>,
        notifier: Arc<RecordingNotifier>,
        engine: CancellationEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let calendar = Arc::new(RecordingCalendar {
                deleted: Mutex::new(Vec::new()),
            });
            let notifier = Arc::new(RecordingNotifier::default());
            let engine = CancellationEngine::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                calendar.clone(),
                notifier.clone(),
            );
            Self {
                store,
                calendar,
                notifier,
                engine,
            }
        }

        async fn offering(&self, capacity: i32) -> Offering {
            let offering = Offering::new("Pottery evening", OfferingKind::Standard, capacity);
            OfferingRepository::create(self.store.as_ref(), &offering)
                .await
                .unwrap();
            offering
        }

        async fn session(&self, offering: &Offering, grouping: Grouping, days: i64) -> Session {
            let start = Utc::now() + Duration::days(days);
            let window = SessionWindow {
                start_at: start,
                end_at: start + Duration::hours(2),
                local_start: start.naive_utc(),
                local_end: (start + Duration::hours(2)).naive_utc(),
            };
            let mut session = Session::new(offering.id, window, "Europe/Berlin", grouping);
            session.calendar_event_id = Some(format!("evt-{}", session.id));
            SessionRepository::create(self.store.as_ref(), &session)
                .await
                .unwrap();
            session
        }

        async fn register(&self, session: &Session, offering: &Offering) -> Uuid {
            let user = Uuid::new_v4();
            self.register_user(session, offering, user).await;
            user
        }

        async fn register_user(&self, session: &Session, offering: &Offering, user: Uuid) {
            self.store
                .add_user(UserRef::new(user, "Attendee", "attendee@example.com"));
            let request = kurso_core::ReservationRequest {
                session_id: session.id,
                user_id: user,
                tier_id: None,
                initial_status: kurso_core::RegistrationStatus::Passed,
                series_key: session.grouping.series_key(),
                session_capacity: offering.capacity,
                tier_capacity: None,
                payment_reference: None,
            };
            let outcome = self.store.reserve(&request).await.unwrap();
            assert!(matches!(
                outcome,
                kurso_core::ReservationOutcome::Created(_)
                    | kurso_core::ReservationOutcome::Reactivated(_)
            ));
        }

        async fn records(&self) -> Vec<CancellationRecord> {
            self.store.list_unresolved().await.unwrap()
        }
    }

    #[tokio::test]
    async fn standalone_cancel_writes_one_record_per_registration() {
        let fx = Fixture::new();
        let offering = fx.offering(10).await;
        let session = fx.session(&offering, Grouping::Standalone, 7).await;

        for _ in 0..3 {
            fx.register(&session, &offering).await;
        }

        let result = fx.engine.cancel_session(session.id, true).await.unwrap();
        assert_eq!(result.registrations_cancelled, 3);
        assert_eq!(result.records_created, 3);

        let records = fx.records().await;
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.cancelled_by_admin));

        let session = SessionRepository::get(fx.store.as_ref(), session.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
        assert!(session.calendar_event_id.is_none());
        assert_eq!(fx.calendar.deleted.lock().unwrap().len(), 1);

        // One mail per affected user, single-session shape.
        let sent = fx.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(_, sessions)| *sessions == 1));
    }

    #[tokio::test]
    async fn series_cancel_deduplicates_audit_per_user() {
        let fx = Fixture::new();
        let offering = fx.offering(10).await;
        let a = fx.session(&offering, Grouping::Series(3), 1).await;
        let b = fx.session(&offering, Grouping::Series(3), 2).await;
        let c = fx.session(&offering, Grouping::Series(3), 3).await;

        let user = Uuid::new_v4();
        for session in [&a, &b, &c] {
            fx.register_user(session, &offering, user).await;
        }

        let result = fx.engine.cancel_series(3).await.unwrap();
        assert_eq!(result.sessions_cancelled, 3);
        assert_eq!(result.registrations_cancelled, 3);
        assert_eq!(result.records_created, 1);

        let records = fx.records().await;
        assert_eq!(records.len(), 1);
        // The earliest session wins as representative.
        assert_eq!(records[0].session_id, a.id);
        assert_eq!(records[0].series_key, Some(3));

        // One mail, enumerating all three dates.
        let sent = fx.notifier.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), &[(user, 3)]);
    }

    #[tokio::test]
    async fn repeated_session_cancel_is_idempotent() {
        let fx = Fixture::new();
        let offering = fx.offering(10).await;
        let session = fx.session(&offering, Grouping::Standalone, 7).await;
        fx.register(&session, &offering).await;

        let first = fx.engine.cancel_session(session.id, true).await.unwrap();
        assert_eq!(first.records_created, 1);

        let second = fx.engine.cancel_session(session.id, true).await.unwrap();
        assert_eq!(second.registrations_cancelled, 0);
        assert_eq!(second.records_created, 0);
        assert_eq!(fx.records().await.len(), 1);
    }

    #[tokio::test]
    async fn user_cancel_flips_row_and_writes_record() {
        let fx = Fixture::new();
        let offering = fx.offering(10).await;
        let session = fx.session(&offering, Grouping::Standalone, 7).await;
        let user = fx.register(&session, &offering).await;

        fx.engine
            .cancel_registration(session.id, user)
            .await
            .unwrap();

        let reg = fx.store.find(session.id, user).await.unwrap().unwrap();
        assert!(!reg.status.is_active());

        let records = fx.records().await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].cancelled_by_admin);

        // Nothing left to cancel the second time around.
        let err = fx
            .engine
            .cancel_registration(session.id, user)
            .await
            .unwrap_err();
        assert!(matches!(err, CancellationError::NothingToCancel));
    }

    #[tokio::test]
    async fn user_series_cancel_writes_single_record_for_earliest() {
        let fx = Fixture::new();
        let offering = fx.offering(10).await;
        let a = fx.session(&offering, Grouping::Series(4), 1).await;
        let b = fx.session(&offering, Grouping::Series(4), 2).await;

        let user = Uuid::new_v4();
        for session in [&a, &b] {
            fx.register_user(session, &offering, user).await;
        }

        fx.engine
            .cancel_series_registration(4, user)
            .await
            .unwrap();

        for session in [&a, &b] {
            let reg = fx.store.find(session.id, user).await.unwrap().unwrap();
            assert!(!reg.status.is_active());
        }

        let records = fx.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].session_id, a.id);
        assert!(!records[0].cancelled_by_admin);
    }

    #[tokio::test]
    async fn tier_cancel_cascades_over_registrations() {
        let fx = Fixture::new();
        let offering = fx.offering(10).await;
        let session = fx.session(&offering, Grouping::Standalone, 7).await;

        let mut tier = PriceTier::new(offering.id, "Early bird", 2500, 5);
        tier.state = TierState::Published;
        PriceTierRepository::create(fx.store.as_ref(), &tier)
            .await
            .unwrap();

        let user = Uuid::new_v4();
        fx.store
            .add_user(UserRef::new(user, "Attendee", "attendee@example.com"));
        let request = kurso_core::ReservationRequest {
            session_id: session.id,
            user_id: user,
            tier_id: Some(tier.id),
            initial_status: kurso_core::RegistrationStatus::Passed,
            series_key: None,
            session_capacity: offering.capacity,
            tier_capacity: Some(tier.capacity),
            payment_reference: None,
        };
        fx.store.reserve(&request).await.unwrap();

        let result = fx.engine.cancel_price_tier(tier.id).await.unwrap();
        assert_eq!(result.registrations_cancelled, 1);
        assert_eq!(result.records_created, 1);

        let tier = PriceTierRepository::get(fx.store.as_ref(), tier.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tier.state, TierState::Cancelled);

        let reg = fx.store.find(session.id, user).await.unwrap().unwrap();
        assert!(!reg.status.is_active());
    }
}
