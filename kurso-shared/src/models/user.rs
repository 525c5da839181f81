use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pii::Masked;

/// Minimal view of an account as the auth layer hands it to us. The engines
/// never manage users; they only need a display name and a mail target for
/// notification fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub email: Masked<String>,
}

impl UserRef {
    pub fn new(id: Uuid, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: Masked(email.into()),
        }
    }
}
