use std::sync::Arc;

use kurso_cancellation::CancellationEngine;
use kurso_catalog::{CapacityEvaluator, OfferingManager, TierManager};
use kurso_core::repository::CancellationLogRepository;
use kurso_registration::RegistrationEngine;

#[derive(Clone)]
pub struct AppState {
    pub offerings: Arc<OfferingManager>,
    pub tiers: Arc<TierManager>,
    pub capacity: Arc<CapacityEvaluator>,
    pub registration: Arc<RegistrationEngine>,
    pub cancellation: Arc<CancellationEngine>,
    pub cancellation_log: Arc<dyn CancellationLogRepository>,
}
