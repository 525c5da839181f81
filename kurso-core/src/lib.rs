pub mod cancellation;
pub mod capacity;
pub mod collab;
pub mod offering;
pub mod registration;
pub mod repository;
pub mod session;
pub mod tier;

pub use cancellation::{CancellationProbe, CancellationRecord};
pub use capacity::{CapacityCounts, CapacityDecision, CapacityReason, TierPeak};
pub use offering::{Offering, OfferingKind};
pub use registration::{
    Registration, RegistrationStatus, ReservationOutcome, ReservationRequest,
};
pub use session::{Grouping, Session, SessionStatus, SessionWindow};
pub use tier::{PriceTier, TierState};
