pub mod models;
pub mod pii;

pub use models::user::UserRef;
pub use pii::Masked;
