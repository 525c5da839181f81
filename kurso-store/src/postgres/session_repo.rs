use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use kurso_core::repository::{SessionRepository, StoreError};
use kurso_core::{Session, SessionStatus, SessionWindow};

pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    offering_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    local_start: chrono::NaiveDateTime,
    local_end: chrono::NaiveDateTime,
    timezone: String,
    status: String,
    series_key: Option<i64>,
    offer_batch_key: Option<i64>,
    calendar_event_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            offering_id: row.offering_id,
            start_at: row.start_at,
            end_at: row.end_at,
            local_start: row.local_start,
            local_end: row.local_end,
            timezone: row.timezone,
            status: row.status.parse::<SessionStatus>().map_err(StoreError::from)?,
            grouping: row.series_key.into(),
            offer_batch_key: row.offer_batch_key,
            calendar_event_id: row.calendar_event_id,
            created_at: row.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, offering_id, start_at, end_at, local_start, local_end, timezone, status, series_key, offer_batch_key, calendar_event_id, created_at";

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, offering_id, start_at, end_at, local_start, local_end, timezone, status, series_key, offer_batch_key, calendar_event_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(session.id)
        .bind(session.offering_id)
        .bind(session.start_at)
        .bind(session.end_at)
        .bind(session.local_start)
        .bind(session.local_end)
        .bind(&session.timezone)
        .bind(session.status.as_str())
        .bind(session.grouping.series_key())
        .bind(session.offer_batch_key)
        .bind(&session.calendar_event_id)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Session::try_from).transpose()
    }

    async fn list_by_offering(&self, offering_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE offering_id = $1 ORDER BY start_at"
        ))
        .bind(offering_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Session::try_from).collect()
    }

    async fn list_by_series(&self, series_key: i64) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE series_key = $1 ORDER BY start_at"
        ))
        .bind(series_key)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Session::try_from).collect()
    }

    async fn update_window(&self, id: Uuid, window: &SessionWindow) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sessions SET start_at = $2, end_at = $3, local_start = $4, local_end = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(window.start_at)
        .bind(window.end_at)
        .bind(window.local_start)
        .bind(window.local_end)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: SessionStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_calendar_event(
        &self,
        id: Uuid,
        event_id: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET calendar_event_id = $2 WHERE id = $1")
            .bind(id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_series_key_for_offering(
        &self,
        offering_id: Uuid,
        series_key: Option<i64>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE sessions SET series_key = $2 WHERE offering_id = $1")
            .bind(offering_id)
            .bind(series_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn next_series_key(&self) -> Result<i64, StoreError> {
        // Keys can live on an offering before it has sessions, so take the
        // maximum over both tables.
        let max: i64 = sqlx::query_scalar(
            r#"
            SELECT GREATEST(
                (SELECT COALESCE(MAX(series_key), 0) FROM sessions),
                (SELECT COALESCE(MAX(series_key), 0) FROM offerings)
            )
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(max + 1)
    }

    async fn next_offer_batch_key(&self) -> Result<i64, StoreError> {
        let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(offer_batch_key), 0) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(max + 1)
    }

    async fn mark_elapsed_past(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE sessions SET status = 'past' WHERE status = 'active' AND start_at < $1")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
