use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use kurso_core::collab::UserDirectory;
use kurso_core::repository::StoreError;
use kurso_shared::UserRef;

/// Read-only view of the account table the auth layer maintains.
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRef>, StoreError> {
        let row: Option<(Uuid, String, String)> =
            sqlx::query_as("SELECT id, name, email FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name, email)| UserRef::new(id, name, email)))
    }
}
