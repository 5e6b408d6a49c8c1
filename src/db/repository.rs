use async_trait::async_trait;
use uuid::Uuid;

use crate::db::models::Account;
use crate::error::StoreError;

/// Account persistence seam. The session protocol is written against this
/// trait so each identity domain (traveler, owner) can be wired to its own
/// backing collection without duplicating the protocol itself.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Overwrite the account's session pointer. `None` clears it (logout);
    /// `Some` pins a new refresh token (login/signup). Last writer wins;
    /// concurrent logins race on this field.
    async fn set_session_pointer(
        &self,
        id: Uuid,
        pointer: Option<&str>,
    ) -> Result<(), StoreError>;
}
