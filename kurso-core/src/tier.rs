use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tier lifecycle, decided at creation / first-registration time.
///
/// `Draft` tiers have never been registered against and may be hard-deleted;
/// the first registration promotes a tier to `Published`, after which it can
/// only be cancelled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TierState {
    Draft,
    Published,
    Cancelled,
}

impl TierState {
    pub fn is_bookable(&self) -> bool {
        !matches!(self, TierState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TierState::Draft => "draft",
            TierState::Published => "published",
            TierState::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TierState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TierState::Draft),
            "published" => Ok(TierState::Published),
            "cancelled" => Ok(TierState::Cancelled),
            other => Err(format!("unknown tier state: {other}")),
        }
    }
}

/// A price tier of an offering, carrying its own capacity sub-limit
/// independent of the offering's base capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTier {
    pub id: Uuid,
    pub offering_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub capacity: i32,
    pub state: TierState,
}

impl PriceTier {
    pub fn new(
        offering_id: Uuid,
        name: impl Into<String>,
        price_cents: i64,
        capacity: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            offering_id,
            name: name.into(),
            price_cents,
            capacity,
            state: TierState::Draft,
        }
    }
}
