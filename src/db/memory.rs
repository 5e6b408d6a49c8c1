use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::Account;
use crate::db::repository::AccountRepository;
use crate::error::StoreError;

/// In-memory account store. Used by the test suites and useful for local
/// demos; the production deployments use [`PgAccountRepository`].
///
/// [`PgAccountRepository`]: crate::db::postgres::PgAccountRepository
#[derive(Default)]
pub struct MemoryAccountRepository {
    accounts: Arc<RwLock<HashMap<Uuid, Account>>>,
}

impl MemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(StoreError::Duplicate);
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn set_session_pointer(
        &self,
        id: Uuid,
        pointer: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.session_pointer = pointer.map(|p| p.to_string());
        Ok(())
    }
}
