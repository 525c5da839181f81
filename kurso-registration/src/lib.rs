pub mod engine;
pub mod models;

pub use engine::{RegistrationEngine, RegistrationError};
pub use models::{RegistrationOutcome, SeriesRegistration, SessionOutcome};
