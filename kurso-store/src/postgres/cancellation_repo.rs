use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use kurso_core::repository::{CancellationLogRepository, StoreError};
use kurso_core::{CancellationProbe, CancellationRecord};

pub struct PgCancellationLogRepository {
    pool: PgPool,
}

impl PgCancellationLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CancellationRow {
    id: Uuid,
    user_id: Uuid,
    offering_id: Uuid,
    session_id: Uuid,
    series_key: Option<i64>,
    tier_id: Option<Uuid>,
    registered_at: DateTime<Utc>,
    cancelled_at: DateTime<Utc>,
    payment_reference: Option<String>,
    cancelled_by_admin: bool,
    resolved: bool,
}

impl From<CancellationRow> for CancellationRecord {
    fn from(row: CancellationRow) -> Self {
        CancellationRecord {
            id: row.id,
            user_id: row.user_id,
            offering_id: row.offering_id,
            session_id: row.session_id,
            series_key: row.series_key,
            tier_id: row.tier_id,
            registered_at: row.registered_at,
            cancelled_at: row.cancelled_at,
            payment_reference: row.payment_reference,
            cancelled_by_admin: row.cancelled_by_admin,
            resolved: row.resolved,
        }
    }
}

const CANCELLATION_COLUMNS: &str = "id, user_id, offering_id, session_id, series_key, tier_id, registered_at, cancelled_at, payment_reference, cancelled_by_admin, resolved";

#[async_trait]
impl CancellationLogRepository for PgCancellationLogRepository {
    async fn insert(&self, record: &CancellationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cancellation_records (id, user_id, offering_id, session_id, series_key, tier_id, registered_at, cancelled_at, payment_reference, cancelled_by_admin, resolved)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(record.offering_id)
        .bind(record.session_id)
        .bind(record.series_key)
        .bind(record.tier_id)
        .bind(record.registered_at)
        .bind(record.cancelled_at)
        .bind(&record.payment_reference)
        .bind(record.cancelled_by_admin)
        .bind(record.resolved)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_equivalent(
        &self,
        probe: &CancellationProbe,
    ) -> Result<Option<CancellationRecord>, StoreError> {
        let row = match probe.series_key {
            Some(series_key) => {
                sqlx::query_as::<_, CancellationRow>(&format!(
                    r#"
                    SELECT {CANCELLATION_COLUMNS} FROM cancellation_records
                    WHERE user_id = $1 AND offering_id = $2 AND cancelled_by_admin = $3 AND series_key = $4
                    LIMIT 1
                    "#
                ))
                .bind(probe.user_id)
                .bind(probe.offering_id)
                .bind(probe.cancelled_by_admin)
                .bind(series_key)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, CancellationRow>(&format!(
                    r#"
                    SELECT {CANCELLATION_COLUMNS} FROM cancellation_records
                    WHERE user_id = $1 AND offering_id = $2 AND cancelled_by_admin = $3 AND session_id = $4
                    LIMIT 1
                    "#
                ))
                .bind(probe.user_id)
                .bind(probe.offering_id)
                .bind(probe.cancelled_by_admin)
                .bind(probe.session_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.map(CancellationRecord::from))
    }

    async fn list_unresolved(&self) -> Result<Vec<CancellationRecord>, StoreError> {
        let rows = sqlx::query_as::<_, CancellationRow>(&format!(
            "SELECT {CANCELLATION_COLUMNS} FROM cancellation_records WHERE resolved = FALSE ORDER BY cancelled_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CancellationRecord::from).collect())
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE cancellation_records SET resolved = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
