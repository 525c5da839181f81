pub mod cancellation_repo;
pub mod offering_repo;
pub mod registration_repo;
pub mod session_repo;
pub mod tier_repo;
pub mod user_directory;

pub use cancellation_repo::PgCancellationLogRepository;
pub use offering_repo::PgOfferingRepository;
pub use registration_repo::PgRegistrationRepository;
pub use session_repo::PgSessionRepository;
pub use tier_repo::PgPriceTierRepository;
pub use user_directory::PgUserDirectory;
