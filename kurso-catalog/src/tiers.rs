use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use kurso_core::repository::{OfferingRepository, PriceTierRepository, StoreError};
use kurso_core::{PriceTier, TierState};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierUpdate {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    pub capacity: Option<i32>,
}

#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("Offering not found: {0}")]
    OfferingNotFound(Uuid),

    #[error("Price tier not found: {0}")]
    TierNotFound(Uuid),

    #[error("Price tier has been registered against and can only be cancelled: {0}")]
    TierPublished(Uuid),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for TierError {
    fn from(err: StoreError) -> Self {
        TierError::Store(err)
    }
}

/// Price tier administration. Tiers are `Draft` until their first
/// registration publishes them; the state alone decides whether removal is a
/// hard delete or has to go through the cancellation engine.
pub struct TierManager {
    offerings: Arc<dyn OfferingRepository>,
    tiers: Arc<dyn PriceTierRepository>,
}

impl TierManager {
    pub fn new(
        offerings: Arc<dyn OfferingRepository>,
        tiers: Arc<dyn PriceTierRepository>,
    ) -> Self {
        Self { offerings, tiers }
    }

    pub async fn create_tier(
        &self,
        offering_id: Uuid,
        name: String,
        price_cents: i64,
        capacity: i32,
    ) -> Result<PriceTier, TierError> {
        self.offerings
            .get(offering_id)
            .await?
            .ok_or(TierError::OfferingNotFound(offering_id))?;

        let tier = PriceTier::new(offering_id, name, price_cents, capacity);
        self.tiers.create(&tier).await?;
        Ok(tier)
    }

    pub async fn get_tier(&self, id: Uuid) -> Result<PriceTier, TierError> {
        self.tiers
            .get(id)
            .await?
            .ok_or(TierError::TierNotFound(id))
    }

    pub async fn list_tiers(&self, offering_id: Uuid) -> Result<Vec<PriceTier>, TierError> {
        self.offerings
            .get(offering_id)
            .await?
            .ok_or(TierError::OfferingNotFound(offering_id))?;
        Ok(self.tiers.list_by_offering(offering_id).await?)
    }

    pub async fn update_tier(&self, id: Uuid, update: TierUpdate) -> Result<PriceTier, TierError> {
        let mut tier = self.get_tier(id).await?;
        if let Some(name) = update.name {
            tier.name = name;
        }
        if let Some(price) = update.price_cents {
            tier.price_cents = price;
        }
        if let Some(capacity) = update.capacity {
            tier.capacity = capacity;
        }
        self.tiers.update(&tier).await?;
        Ok(tier)
    }

    /// Draft tiers disappear; anything registered against must go through
    /// `CancellationEngine::cancel_price_tier` instead.
    pub async fn remove_tier(&self, id: Uuid) -> Result<(), TierError> {
        let tier = self.get_tier(id).await?;
        match tier.state {
            TierState::Draft => {
                self.tiers.delete(id).await?;
                Ok(())
            }
            TierState::Published | TierState::Cancelled => Err(TierError::TierPublished(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurso_core::repository::{OfferingRepository, PriceTierRepository};
    use kurso_core::{Offering, OfferingKind};
    use kurso_store::MemoryStore;
    use std::sync::Arc;

    async fn fixture() -> (Arc<MemoryStore>, TierManager, Offering) {
        let store = Arc::new(MemoryStore::new());
        let offering = Offering::new("Ceramics", OfferingKind::Standard, 12);
        OfferingRepository::create(store.as_ref(), &offering)
            .await
            .unwrap();
        let mgr = TierManager::new(store.clone(), store.clone());
        (store, mgr, offering)
    }

    #[tokio::test]
    async fn new_tiers_start_as_draft() {
        let (_store, mgr, offering) = fixture().await;
        let tier = mgr
            .create_tier(offering.id, "Member".to_string(), 3000, 4)
            .await
            .unwrap();
        assert_eq!(tier.state, TierState::Draft);
    }

    #[tokio::test]
    async fn draft_tier_is_hard_deleted() {
        let (store, mgr, offering) = fixture().await;
        let tier = mgr
            .create_tier(offering.id, "Member".to_string(), 3000, 4)
            .await
            .unwrap();

        mgr.remove_tier(tier.id).await.unwrap();
        assert!(PriceTierRepository::get(store.as_ref(), tier.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn published_tier_refuses_deletion() {
        let (store, mgr, offering) = fixture().await;
        let tier = mgr
            .create_tier(offering.id, "Member".to_string(), 3000, 4)
            .await
            .unwrap();
        store
            .set_state(tier.id, TierState::Published)
            .await
            .unwrap();

        let err = mgr.remove_tier(tier.id).await.unwrap_err();
        assert!(matches!(err, TierError::TierPublished(_)));
    }
}
