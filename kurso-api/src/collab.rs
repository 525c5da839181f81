//! Default collaborator adapters. Calendar publishing and mail delivery are
//! owned by other services; these adapters log what would go out so the
//! engines stay fully wired in every environment.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use kurso_core::collab::{CalendarPublisher, CancellationNotifier};
use kurso_core::repository::StoreError;
use kurso_core::{Offering, PriceTier, Session};
use kurso_shared::UserRef;

pub struct LoggingCalendarPublisher;

#[async_trait]
impl CalendarPublisher for LoggingCalendarPublisher {
    async fn create_event(
        &self,
        offering: &Offering,
        session: &Session,
    ) -> Result<String, StoreError> {
        let event_id = format!("cal-{}", Uuid::new_v4());
        info!(offering = %offering.title, session = %session.id, event = %event_id, "calendar event created");
        Ok(event_id)
    }

    async fn update_event(
        &self,
        offering: &Offering,
        session: &Session,
    ) -> Result<(), StoreError> {
        info!(offering = %offering.title, session = %session.id, "calendar event updated");
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), StoreError> {
        info!(event = %event_id, "calendar event deleted");
        Ok(())
    }
}

pub struct LoggingNotifier;

#[async_trait]
impl CancellationNotifier for LoggingNotifier {
    async fn send_session_cancellation(
        &self,
        user: &UserRef,
        offering: &Offering,
        session: &Session,
        tier: Option<&PriceTier>,
    ) -> Result<(), StoreError> {
        // `user.email` renders masked; the real address only goes to the
        // mailer.
        info!(
            user = %user.email,
            offering = %offering.title,
            session = %session.id,
            tier = tier.map(|t| t.name.as_str()).unwrap_or("-"),
            "cancellation mail queued"
        );
        Ok(())
    }

    async fn send_series_cancellation(
        &self,
        user: &UserRef,
        offering: &Offering,
        sessions: &[Session],
        tier: Option<&PriceTier>,
    ) -> Result<(), StoreError> {
        info!(
            user = %user.email,
            offering = %offering.title,
            sessions = sessions.len(),
            tier = tier.map(|t| t.name.as_str()).unwrap_or("-"),
            "series cancellation mail queued"
        );
        Ok(())
    }
}
