/// Account persistence (Postgres)
///
/// Delegated tokens are sealed with [`TokenCipher`] before they reach the
/// database and opened again when a row is loaded.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crypto_core::TokenCipher;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use super::AccountRepository;
use crate::error::Result;
use crate::models::{Account, DelegatedCredential, Role};

const ACCOUNT_COLUMNS: &str = r#"
    id, email, role,
    delegated_access_token, delegated_refresh_token, delegated_scope, delegated_expires_at,
    session_fingerprint, session_issued_at, created_at
"#;

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    role: String,
    delegated_access_token: Option<Vec<u8>>,
    delegated_refresh_token: Option<Vec<u8>>,
    delegated_scope: Option<String>,
    delegated_expires_at: Option<DateTime<Utc>>,
    session_fingerprint: Option<String>,
    session_issued_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
    cipher: Arc<TokenCipher>,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool, cipher: Arc<TokenCipher>) -> Self {
        Self { pool, cipher }
    }

    fn into_account(&self, row: AccountRow) -> Result<Account> {
        let delegated = match (row.delegated_access_token, row.delegated_expires_at) {
            (Some(sealed_access), Some(expires_at)) => Some(DelegatedCredential {
                access_token: self.cipher.open(&sealed_access)?,
                refresh_token: row
                    .delegated_refresh_token
                    .map(|sealed| self.cipher.open(&sealed))
                    .transpose()?,
                scope: row.delegated_scope,
                expires_at,
            }),
            _ => None,
        };

        Ok(Account {
            id: row.id,
            email: row.email,
            role: row.role.parse::<Role>()?,
            delegated,
            session_fingerprint: row.session_fingerprint,
            session_issued_at: row.session_issued_at,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| self.into_account(r)).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| self.into_account(r)).transpose()
    }

    async fn upsert(&self, email: &str, role: Role) -> Result<Account> {
        // ON CONFLICT touches only updated_at, so the original role survives
        let sql = format!(
            r#"
            INSERT INTO accounts (id, email, role, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;

        self.into_account(row)
    }

    async fn store_delegated_credential(
        &self,
        id: Uuid,
        credential: &DelegatedCredential,
    ) -> Result<()> {
        let sealed_access = self.cipher.seal(&credential.access_token)?;
        let sealed_refresh = credential
            .refresh_token
            .as_deref()
            .map(|token| self.cipher.seal(token))
            .transpose()?;

        sqlx::query(
            r#"
            UPDATE accounts
            SET delegated_access_token = $2,
                delegated_refresh_token = $3,
                delegated_scope = $4,
                delegated_expires_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(sealed_access)
        .bind(sealed_refresh)
        .bind(credential.scope.as_deref())
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_session(
        &self,
        id: Uuid,
        fingerprint: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET session_fingerprint = $2, session_issued_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(fingerprint)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rotate_session(
        &self,
        id: Uuid,
        expected: &str,
        fingerprint: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET session_fingerprint = $3, session_issued_at = $4, updated_at = NOW()
            WHERE id = $1 AND session_fingerprint = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(fingerprint)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn clear_session(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET session_fingerprint = NULL, session_issued_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
