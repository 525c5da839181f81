pub mod capacity;
pub mod offerings;
pub mod tiers;

pub use capacity::{CapacityError, CapacityEvaluator, CapacityTarget};
pub use offerings::{CatalogError, NewOffering, OfferingManager, OfferingUpdate};
pub use tiers::{TierError, TierManager, TierUpdate};
