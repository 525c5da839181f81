use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use kurso_core::repository::{OfferingRepository, StoreError};
use kurso_core::{Offering, OfferingKind};

pub struct PgOfferingRepository {
    pool: PgPool,
}

impl PgOfferingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OfferingRow {
    id: Uuid,
    title: String,
    kind: String,
    capacity: i32,
    tiered_pricing: bool,
    multi_day: bool,
    series_key: Option<i64>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<OfferingRow> for Offering {
    type Error = StoreError;

    fn try_from(row: OfferingRow) -> Result<Self, Self::Error> {
        Ok(Offering {
            id: row.id,
            title: row.title,
            kind: row.kind.parse::<OfferingKind>().map_err(StoreError::from)?,
            capacity: row.capacity,
            tiered_pricing: row.tiered_pricing,
            multi_day: row.multi_day,
            series_key: row.series_key,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, title, kind, capacity, tiered_pricing, multi_day, series_key, created_at";

#[async_trait]
impl OfferingRepository for PgOfferingRepository {
    async fn create(&self, offering: &Offering) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO offerings (id, title, kind, capacity, tiered_pricing, multi_day, series_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(offering.id)
        .bind(&offering.title)
        .bind(offering.kind.as_str())
        .bind(offering.capacity)
        .bind(offering.tiered_pricing)
        .bind(offering.multi_day)
        .bind(offering.series_key)
        .bind(offering.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Offering>, StoreError> {
        let row = sqlx::query_as::<_, OfferingRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM offerings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Offering::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Offering>, StoreError> {
        let rows = sqlx::query_as::<_, OfferingRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM offerings ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Offering::try_from).collect()
    }

    async fn update(&self, offering: &Offering) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE offerings
            SET title = $2, kind = $3, capacity = $4, tiered_pricing = $5, multi_day = $6, series_key = $7
            WHERE id = $1
            "#,
        )
        .bind(offering.id)
        .bind(&offering.title)
        .bind(offering.kind.as_str())
        .bind(offering.capacity)
        .bind(offering.tiered_pricing)
        .bind(offering.multi_day)
        .bind(offering.series_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        // Sessions, tiers and registrations go with it via ON DELETE CASCADE.
        sqlx::query("DELETE FROM offerings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
