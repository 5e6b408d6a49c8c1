use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::models::{Account, Role};
use crate::db::repository::AccountRepository;
use crate::error::StoreError;

/// Postgres-backed account store. One instance per identity domain, each
/// pointing at its own table (`travelers`, `owners`) over a shared pool.
///
/// Queries are built at runtime rather than with the sqlx compile-time
/// macros because the table name is a per-domain parameter.
pub struct PgAccountRepository {
    pool: Arc<PgPool>,
    table: String,
}

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    session_pointer: Option<String>,
    created_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Result<Account, StoreError> {
        let role = Role::from_str(&self.role)
            .map_err(|e| StoreError::Query(format!("corrupt role column: {}", e)))?;
        Ok(Account {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role,
            session_pointer: self.session_pointer,
            created_at: self.created_at,
        })
    }
}

impl PgAccountRepository {
    pub fn new(pool: Arc<PgPool>, table: &str) -> Self {
        Self {
            pool,
            table: table.to_string(),
        }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                session_pointer TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
            self.table
        );
        sqlx::query(&ddl).execute(self.pool.as_ref()).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, name, email, password_hash, role, session_pointer, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table
        );
        sqlx::query(&sql)
            .bind(account.id)
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.to_string())
            .bind(&account.session_pointer)
            .bind(account.created_at)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "SELECT id, name, email, password_hash, role, session_pointer, created_at \
             FROM {} WHERE id = $1",
            self.table
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "SELECT id, name, email, password_hash, role, session_pointer, created_at \
             FROM {} WHERE lower(email) = lower($1)",
            self.table
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn set_session_pointer(
        &self,
        id: Uuid,
        pointer: Option<&str>,
    ) -> Result<(), StoreError> {
        let sql = format!("UPDATE {} SET session_pointer = $1 WHERE id = $2", self.table);
        let result = sqlx::query(&sql)
            .bind(pointer)
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
