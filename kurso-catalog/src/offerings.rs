use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use kurso_core::collab::CalendarPublisher;
use kurso_core::repository::{
    OfferingRepository, PriceTierRepository, RegistrationRepository, SessionRepository,
    StoreError,
};
use kurso_core::{Offering, OfferingKind, PriceTier, Session, SessionWindow};

#[derive(Debug, Clone, Deserialize)]
pub struct NewOffering {
    pub title: String,
    pub kind: OfferingKind,
    pub capacity: i32,
    #[serde(default)]
    pub tiered_pricing: bool,
    #[serde(default)]
    pub multi_day: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferingUpdate {
    pub title: Option<String>,
    pub capacity: Option<i32>,
    pub tiered_pricing: Option<bool>,
    pub multi_day: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Offering not found: {0}")]
    OfferingNotFound(Uuid),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Session has registrations and can only be cancelled: {0}")]
    SessionHasRegistrations(Uuid),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        CatalogError::Store(err)
    }
}

/// Administration of offerings and their sessions: creation, editing (with
/// the multi-day/series side effects), duplication, "offer again" batches,
/// and deletion. Calendar publishing is strictly best-effort.
pub struct OfferingManager {
    offerings: Arc<dyn OfferingRepository>,
    sessions: Arc<dyn SessionRepository>,
    tiers: Arc<dyn PriceTierRepository>,
    registrations: Arc<dyn RegistrationRepository>,
    calendar: Arc<dyn CalendarPublisher>,
}

impl OfferingManager {
    pub fn new(
        offerings: Arc<dyn OfferingRepository>,
        sessions: Arc<dyn SessionRepository>,
        tiers: Arc<dyn PriceTierRepository>,
        registrations: Arc<dyn RegistrationRepository>,
        calendar: Arc<dyn CalendarPublisher>,
    ) -> Self {
        Self {
            offerings,
            sessions,
            tiers,
            registrations,
            calendar,
        }
    }

    pub async fn create_offering(&self, new: NewOffering) -> Result<Offering, CatalogError> {
        let mut offering = Offering::new(new.title, new.kind, new.capacity);
        offering.tiered_pricing = new.tiered_pricing;
        offering.multi_day = new.multi_day;
        if new.multi_day {
            offering.series_key = Some(self.sessions.next_series_key().await?);
        }
        self.offerings.create(&offering).await?;
        Ok(offering)
    }

    pub async fn get_offering(&self, id: Uuid) -> Result<Offering, CatalogError> {
        self.offerings
            .get(id)
            .await?
            .ok_or(CatalogError::OfferingNotFound(id))
    }

    pub async fn list_offerings(&self) -> Result<Vec<Offering>, CatalogError> {
        Ok(self.offerings.list().await?)
    }

    /// Applies scalar edits, plus the series-key side effects of toggling
    /// `multi_day`: turning it on mints a fresh key (max existing + 1) and
    /// stamps all current sessions; turning it off clears the key from them.
    /// Audit history keeps its own copies of cleared keys.
    pub async fn update_offering(
        &self,
        id: Uuid,
        update: OfferingUpdate,
    ) -> Result<Offering, CatalogError> {
        let mut offering = self.get_offering(id).await?;

        if let Some(title) = update.title {
            offering.title = title;
        }
        if let Some(capacity) = update.capacity {
            offering.capacity = capacity;
        }
        if let Some(tiered) = update.tiered_pricing {
            offering.tiered_pricing = tiered;
        }

        match update.multi_day {
            Some(true) if offering.series_key.is_none() => {
                let key = self.sessions.next_series_key().await?;
                let stamped = self
                    .sessions
                    .set_series_key_for_offering(id, Some(key))
                    .await?;
                tracing::info!(offering = %id, series_key = key, sessions = stamped, "series key minted");
                offering.multi_day = true;
                offering.series_key = Some(key);
            }
            Some(true) => {
                offering.multi_day = true;
            }
            Some(false) => {
                if offering.series_key.take().is_some() {
                    self.sessions.set_series_key_for_offering(id, None).await?;
                }
                offering.multi_day = false;
            }
            None => {}
        }

        self.offerings.update(&offering).await?;
        Ok(offering)
    }

    /// Deletes the offering; its sessions go with it (store-level cascade).
    pub async fn delete_offering(&self, id: Uuid) -> Result<(), CatalogError> {
        self.get_offering(id).await?;
        for session in self.sessions.list_by_offering(id).await? {
            self.drop_calendar_event(&session).await;
        }
        self.offerings.delete(id).await?;
        Ok(())
    }

    /// Copies an offering together with its tiers and sessions. A duplicate
    /// of a multi-day offering gets a fresh series key, never the source's.
    pub async fn duplicate_offering(&self, id: Uuid) -> Result<Offering, CatalogError> {
        let source = self.get_offering(id).await?;

        let mut copy = Offering::new(source.title.clone(), source.kind, source.capacity);
        copy.tiered_pricing = source.tiered_pricing;
        copy.multi_day = source.multi_day;
        if source.multi_day {
            copy.series_key = Some(self.sessions.next_series_key().await?);
        }
        self.offerings.create(&copy).await?;

        for tier in self.tiers.list_by_offering(id).await? {
            let fresh = PriceTier::new(copy.id, tier.name, tier.price_cents, tier.capacity);
            self.tiers.create(&fresh).await?;
        }

        for session in self.sessions.list_by_offering(id).await? {
            let timezone = session.timezone.clone();
            self.create_session_inner(&copy, session.window(), &timezone, None)
                .await?;
        }

        Ok(copy)
    }

    /// New sessions inherit the offering's current series key so capacity and
    /// registration treat them as part of the same unit from creation.
    pub async fn add_session(
        &self,
        offering_id: Uuid,
        window: SessionWindow,
        timezone: &str,
    ) -> Result<Session, CatalogError> {
        let offering = self.get_offering(offering_id).await?;
        self.create_session_inner(&offering, window, timezone, None)
            .await
    }

    /// "Offer again": creates a batch of sessions stamped with a freshly
    /// minted offer-batch key so they stay recognisable as one announcement.
    pub async fn offer_again(
        &self,
        offering_id: Uuid,
        windows: Vec<SessionWindow>,
        timezone: &str,
    ) -> Result<Vec<Session>, CatalogError> {
        let offering = self.get_offering(offering_id).await?;
        let batch_key = self.sessions.next_offer_batch_key().await?;

        let mut created = Vec::with_capacity(windows.len());
        for window in windows {
            let session = self
                .create_session_inner(&offering, window, timezone, Some(batch_key))
                .await?;
            created.push(session);
        }
        Ok(created)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session, CatalogError> {
        self.sessions
            .get(id)
            .await?
            .ok_or(CatalogError::SessionNotFound(id))
    }

    pub async fn list_sessions(&self, offering_id: Uuid) -> Result<Vec<Session>, CatalogError> {
        self.get_offering(offering_id).await?;
        Ok(self.sessions.list_by_offering(offering_id).await?)
    }

    pub async fn update_session_window(
        &self,
        session_id: Uuid,
        window: SessionWindow,
    ) -> Result<Session, CatalogError> {
        let session = self.get_session(session_id).await?;
        let offering = self.get_offering(session.offering_id).await?;

        self.sessions.update_window(session_id, &window).await?;
        let updated = self.get_session(session_id).await?;

        if let Err(err) = self.calendar.update_event(&offering, &updated).await {
            warn!(session = %session_id, error = %err, "calendar update failed");
        }
        Ok(updated)
    }

    /// Hard-deletes a session that nothing ever registered for. Once
    /// registrations reference it, only the cancellation engine may retire
    /// it.
    pub async fn remove_session(&self, session_id: Uuid) -> Result<(), CatalogError> {
        let session = self.get_session(session_id).await?;
        if self.registrations.session_has_any(session_id).await? {
            return Err(CatalogError::SessionHasRegistrations(session_id));
        }
        self.drop_calendar_event(&session).await;
        self.sessions.delete(session_id).await?;
        Ok(())
    }

    async fn create_session_inner(
        &self,
        offering: &Offering,
        window: SessionWindow,
        timezone: &str,
        offer_batch_key: Option<i64>,
    ) -> Result<Session, CatalogError> {
        let mut session = Session::new(
            offering.id,
            window,
            timezone,
            offering.series_key.into(),
        );
        session.offer_batch_key = offer_batch_key;

        match self.calendar.create_event(offering, &session).await {
            Ok(event_id) => session.calendar_event_id = Some(event_id),
            Err(err) => warn!(session = %session.id, error = %err, "calendar publish failed"),
        }

        self.sessions.create(&session).await?;
        Ok(session)
    }

    async fn drop_calendar_event(&self, session: &Session) {
        if let Some(event_id) = session.calendar_event_id.as_deref() {
            if let Err(err) = self.calendar.delete_event(event_id).await {
                warn!(session = %session.id, error = %err, "calendar delete failed");
            }
        }
    }
}
