//! Collaborator interfaces the engines call out to. All of them are
//! best-effort from the engines' point of view: a failure is logged and the
//! core operation proceeds.

use async_trait::async_trait;
use kurso_shared::UserRef;
use uuid::Uuid;

use crate::offering::Offering;
use crate::repository::StoreError;
use crate::session::Session;
use crate::tier::PriceTier;

/// Publishes sessions to an external calendar.
#[async_trait]
pub trait CalendarPublisher: Send + Sync {
    /// Returns the external event id to store on the session.
    async fn create_event(
        &self,
        offering: &Offering,
        session: &Session,
    ) -> Result<String, StoreError>;

    async fn update_event(
        &self,
        offering: &Offering,
        session: &Session,
    ) -> Result<(), StoreError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), StoreError>;
}

/// Sends cancellation mail in its two shapes: one session, or one message
/// enumerating every date of a series.
#[async_trait]
pub trait CancellationNotifier: Send + Sync {
    async fn send_session_cancellation(
        &self,
        user: &UserRef,
        offering: &Offering,
        session: &Session,
        tier: Option<&PriceTier>,
    ) -> Result<(), StoreError>;

    async fn send_series_cancellation(
        &self,
        user: &UserRef,
        offering: &Offering,
        sessions: &[Session],
        tier: Option<&PriceTier>,
    ) -> Result<(), StoreError>;
}

/// Resolves user ids to the account details the notifier needs. Lives with
/// the out-of-scope auth layer; the engines only read from it.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRef>, StoreError>;
}
