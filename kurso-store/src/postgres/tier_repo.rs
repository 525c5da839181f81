use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use kurso_core::repository::{PriceTierRepository, StoreError};
use kurso_core::{PriceTier, TierState};

pub struct PgPriceTierRepository {
    pool: PgPool,
}

impl PgPriceTierRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TierRow {
    id: Uuid,
    offering_id: Uuid,
    name: String,
    price_cents: i64,
    capacity: i32,
    state: String,
}

impl TryFrom<TierRow> for PriceTier {
    type Error = StoreError;

    fn try_from(row: TierRow) -> Result<Self, Self::Error> {
        Ok(PriceTier {
            id: row.id,
            offering_id: row.offering_id,
            name: row.name,
            price_cents: row.price_cents,
            capacity: row.capacity,
            state: row.state.parse::<TierState>().map_err(StoreError::from)?,
        })
    }
}

#[async_trait]
impl PriceTierRepository for PgPriceTierRepository {
    async fn create(&self, tier: &PriceTier) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO price_tiers (id, offering_id, name, price_cents, capacity, state)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(tier.id)
        .bind(tier.offering_id)
        .bind(&tier.name)
        .bind(tier.price_cents)
        .bind(tier.capacity)
        .bind(tier.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PriceTier>, StoreError> {
        let row = sqlx::query_as::<_, TierRow>(
            "SELECT id, offering_id, name, price_cents, capacity, state FROM price_tiers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PriceTier::try_from).transpose()
    }

    async fn list_by_offering(&self, offering_id: Uuid) -> Result<Vec<PriceTier>, StoreError> {
        let rows = sqlx::query_as::<_, TierRow>(
            "SELECT id, offering_id, name, price_cents, capacity, state FROM price_tiers WHERE offering_id = $1 ORDER BY name",
        )
        .bind(offering_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PriceTier::try_from).collect()
    }

    async fn update(&self, tier: &PriceTier) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE price_tiers SET name = $2, price_cents = $3, capacity = $4, state = $5 WHERE id = $1",
        )
        .bind(tier.id)
        .bind(&tier.name)
        .bind(tier.price_cents)
        .bind(tier.capacity)
        .bind(tier.state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_state(&self, id: Uuid, state: TierState) -> Result<(), StoreError> {
        sqlx::query("UPDATE price_tiers SET state = $2 WHERE id = $1")
            .bind(id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM price_tiers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
