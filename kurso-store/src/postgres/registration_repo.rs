use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use kurso_core::capacity::{CapacityCounts, CapacityReason, TierPeak};
use kurso_core::repository::{RegistrationRepository, StoreError};
use kurso_core::{
    Registration, RegistrationStatus, ReservationOutcome, ReservationRequest,
};

pub struct PgRegistrationRepository {
    pool: PgPool,
}

impl PgRegistrationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RegistrationRow {
    id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    tier_id: Option<Uuid>,
    status: String,
    registered_at: DateTime<Utc>,
    payment_reference: Option<String>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = StoreError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Registration {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            tier_id: row.tier_id,
            status: row
                .status
                .parse::<RegistrationStatus>()
                .map_err(StoreError::from)?,
            registered_at: row.registered_at,
            payment_reference: row.payment_reference,
        })
    }
}

const REGISTRATION_COLUMNS: &str =
    "id, session_id, user_id, tier_id, status, registered_at, payment_reference";

/// Session-level count under the open transaction: rows for a standalone
/// session, distinct users across the series otherwise.
async fn count_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
    series_key: Option<i64>,
    tier_id: Option<Uuid>,
) -> Result<i64, StoreError> {
    let count: i64 = match (series_key, tier_id) {
        (Some(key), None) => {
            sqlx::query_scalar(
                r#"
                SELECT COUNT(DISTINCT r.user_id) FROM registrations r
                JOIN sessions s ON s.id = r.session_id
                WHERE s.series_key = $1 AND r.status <> 'cancelled'
                "#,
            )
            .bind(key)
            .fetch_one(&mut **tx)
            .await?
        }
        (Some(key), Some(tier)) => {
            sqlx::query_scalar(
                r#"
                SELECT COUNT(DISTINCT r.user_id) FROM registrations r
                JOIN sessions s ON s.id = r.session_id
                WHERE s.series_key = $1 AND r.tier_id = $2 AND r.status <> 'cancelled'
                "#,
            )
            .bind(key)
            .bind(tier)
            .fetch_one(&mut **tx)
            .await?
        }
        (None, None) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM registrations WHERE session_id = $1 AND status <> 'cancelled'",
            )
            .bind(session_id)
            .fetch_one(&mut **tx)
            .await?
        }
        (None, Some(tier)) => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM registrations WHERE session_id = $1 AND tier_id = $2 AND status <> 'cancelled'",
            )
            .bind(session_id)
            .bind(tier)
            .fetch_one(&mut **tx)
            .await?
        }
    };
    Ok(count)
}

#[async_trait]
impl RegistrationRepository for PgRegistrationRepository {
    async fn find(
        &self,
        session_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Registration>, StoreError> {
        let row = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE session_id = $1 AND user_id = $2"
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Registration::try_from).transpose()
    }

    async fn active_for_session(&self, session_id: Uuid) -> Result<Vec<Registration>, StoreError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE session_id = $1 AND status <> 'cancelled'"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Registration::try_from).collect()
    }

    async fn active_for_series(&self, series_key: i64) -> Result<Vec<Registration>, StoreError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(&format!(
            r#"
            SELECT r.id, r.session_id, r.user_id, r.tier_id, r.status, r.registered_at, r.payment_reference
            FROM registrations r
            JOIN sessions s ON s.id = r.session_id
            WHERE s.series_key = $1 AND r.status <> 'cancelled'
            ORDER BY s.start_at
            "#
        ))
        .bind(series_key)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Registration::try_from).collect()
    }

    async fn active_for_tier(&self, tier_id: Uuid) -> Result<Vec<Registration>, StoreError> {
        let rows = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE tier_id = $1 AND status <> 'cancelled'"
        ))
        .bind(tier_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Registration::try_from).collect()
    }

    async fn count_active(&self, session_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations WHERE session_id = $1 AND status <> 'cancelled'",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_active_by_tier(
        &self,
        session_id: Uuid,
        tier_id: Uuid,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registrations WHERE session_id = $1 AND tier_id = $2 AND status <> 'cancelled'",
        )
        .bind(session_id)
        .bind(tier_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_series_users(&self, series_key: i64) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT r.user_id) FROM registrations r
            JOIN sessions s ON s.id = r.session_id
            WHERE s.series_key = $1 AND r.status <> 'cancelled'
            "#,
        )
        .bind(series_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_series_users_by_tier(
        &self,
        series_key: i64,
        tier_id: Uuid,
    ) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT r.user_id) FROM registrations r
            JOIN sessions s ON s.id = r.session_id
            WHERE s.series_key = $1 AND r.tier_id = $2 AND r.status <> 'cancelled'
            "#,
        )
        .bind(series_key)
        .bind(tier_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn tier_peaks(&self, offering_id: Uuid) -> Result<Vec<TierPeak>, StoreError> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT tier_id, MAX(cnt) AS peak FROM (
                SELECT r.tier_id, r.session_id, COUNT(*) AS cnt
                FROM registrations r
                JOIN sessions s ON s.id = r.session_id
                WHERE s.offering_id = $1 AND r.tier_id IS NOT NULL AND r.status <> 'cancelled'
                GROUP BY r.tier_id, r.session_id
            ) per_session
            GROUP BY tier_id
            ORDER BY tier_id
            "#,
        )
        .bind(offering_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(tier_id, peak)| TierPeak { tier_id, peak })
            .collect())
    }

    async fn session_has_any(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM registrations WHERE session_id = $1)")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn tier_has_any(&self, tier_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM registrations WHERE tier_id = $1)")
                .bind(tier_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn reserve(
        &self,
        request: &ReservationRequest,
    ) -> Result<ReservationOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialise concurrent reservations per session (per series, for a
        // series member) so the capacity predicate and the write land in one
        // consistency snapshot. Series rows are locked in id order to keep
        // lock acquisition deadlock-free.
        match request.series_key {
            Some(key) => {
                sqlx::query("SELECT id FROM sessions WHERE series_key = $1 ORDER BY id FOR UPDATE")
                    .bind(key)
                    .fetch_all(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query("SELECT id FROM sessions WHERE id = $1 FOR UPDATE")
                    .bind(request.session_id)
                    .fetch_all(&mut *tx)
                    .await?;
            }
        }

        let existing = sqlx::query_as::<_, RegistrationRow>(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE session_id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(request.session_id)
        .bind(request.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Registration::try_from)
        .transpose()?;

        if let Some(reg) = &existing {
            if reg.status.is_active() {
                tx.commit().await?;
                return Ok(ReservationOutcome::AlreadyActive(reg.clone()));
            }
        }

        let registered =
            count_in_tx(&mut tx, request.session_id, request.series_key, None).await?;
        let tier_registered = match request.tier_id {
            Some(tier_id) => Some(
                count_in_tx(&mut tx, request.session_id, request.series_key, Some(tier_id))
                    .await?,
            ),
            None => None,
        };

        let counts = CapacityCounts {
            registered,
            capacity: request.session_capacity,
            tier_registered,
            tier_capacity: request.tier_capacity,
        };

        if registered >= i64::from(request.session_capacity) {
            tx.rollback().await?;
            return Ok(ReservationOutcome::Full {
                reason: CapacityReason::SessionFull,
                counts,
            });
        }
        if let (Some(taken), Some(limit)) = (tier_registered, request.tier_capacity) {
            if taken >= i64::from(limit) {
                tx.rollback().await?;
                return Ok(ReservationOutcome::Full {
                    reason: CapacityReason::TierFull,
                    counts,
                });
            }
        }

        let outcome = match existing {
            Some(mut reg) => {
                reg.status = request.initial_status;
                reg.tier_id = request.tier_id;
                reg.registered_at = Utc::now();
                reg.payment_reference = request.payment_reference.clone();

                sqlx::query(
                    "UPDATE registrations SET status = $2, tier_id = $3, registered_at = $4, payment_reference = $5 WHERE id = $1",
                )
                .bind(reg.id)
                .bind(reg.status.as_str())
                .bind(reg.tier_id)
                .bind(reg.registered_at)
                .bind(&reg.payment_reference)
                .execute(&mut *tx)
                .await?;

                ReservationOutcome::Reactivated(reg)
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

                sqlx::query(
                    r#"
                    INSERT INTO registrations (id, session_id, user_id, tier_id, status, registered_at, payment_reference)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(reg.id)
                .bind(reg.session_id)
                .bind(reg.user_id)
                .bind(reg.tier_id)
                .bind(reg.status.as_str())
                .bind(reg.registered_at)
                .bind(&reg.payment_reference)
                .execute(&mut *tx)
                .await?;

                ReservationOutcome::Created(reg)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn cancel(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE registrations SET status = 'cancelled' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
