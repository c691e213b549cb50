/// Workspace and delegation persistence (Postgres)
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::WorkspaceRepository;
use crate::error::Result;
use crate::models::{Delegation, DelegationStatus, Workspace};

#[derive(Debug, FromRow)]
struct WorkspaceRow {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Workspace {
            id: row.id,
            name: row.name,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct DelegationRow {
    id: Uuid,
    workspace_id: Uuid,
    email: String,
    status: String,
    created_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DelegationRow> for Delegation {
    type Error = crate::error::ReviewError;

    fn try_from(row: DelegationRow) -> Result<Self> {
        Ok(Delegation {
            id: row.id,
            workspace_id: row.workspace_id,
            email: row.email,
            status: row.status.parse::<DelegationStatus>()?,
            created_at: row.created_at,
            accepted_at: row.accepted_at,
        })
    }
}

#[derive(Clone)]
pub struct PgWorkspaceRepository {
    pool: PgPool,
}

impl PgWorkspaceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkspaceRepository for PgWorkspaceRepository {
    async fn create(&self, owner_id: Uuid, name: &str) -> Result<Workspace> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            INSERT INTO workspaces (id, name, owner_id, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, owner_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_owned(&self, owner_id: Uuid) -> Result<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            SELECT id, name, owner_id, created_at
            FROM workspaces
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_delegated(&self, email: &str) -> Result<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, WorkspaceRow>(
            r#"
            SELECT w.id, w.name, w.owner_id, w.created_at
            FROM workspaces w
            JOIN delegations d ON d.workspace_id = w.id
            WHERE d.email = $1
            ORDER BY w.created_at DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ensure_delegation(&self, workspace_id: Uuid, email: &str) -> Result<Delegation> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, DelegationRow>(
            r#"
            INSERT INTO delegations (id, workspace_id, email, status, created_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            ON CONFLICT (workspace_id, email) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, workspace_id, email, status, created_at, accepted_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_delegation(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Delegation>> {
        let row = sqlx::query_as::<_, DelegationRow>(
            r#"
            SELECT id, workspace_id, email, status, created_at, accepted_at
            FROM delegations
            WHERE workspace_id = $1 AND email = $2
            "#,
        )
        .bind(workspace_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn accept_delegation(
        &self,
        workspace_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Delegation>> {
        let row = sqlx::query_as::<_, DelegationRow>(
            r#"
            UPDATE delegations
            SET status = 'accepted', accepted_at = COALESCE(accepted_at, $3)
            WHERE workspace_id = $1 AND email = $2
            RETURNING id, workspace_id, email, status, created_at, accepted_at
            "#,
        )
        .bind(workspace_id)
        .bind(email)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }
}
