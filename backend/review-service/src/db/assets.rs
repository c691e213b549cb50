/// Asset persistence (Postgres)
///
/// The publish claim and the publish commit are both single conditional
/// `UPDATE`s, so concurrent publishers on the same asset are decided by the
/// database row lock rather than by application code.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{stale_transition, AssetRepository, PublishClaim};
use crate::error::{Result, ReviewError};
use crate::models::{
    Asset, AssetStatus, EditMetadata, FeedbackUpdate, NewAsset, PublishRecord, Visibility,
};

const ASSET_COLUMNS: &str = r#"
    id, workspace_id, uploaded_by, assigned_to,
    original_ref, edited_ref, edited_at,
    title, description, tags,
    status, feedback, feedback_at,
    platform_id, published_title, published_description, published_visibility,
    published_made_for_kids, published_at,
    publish_claimed_at, created_at, updated_at
"#;

#[derive(Debug, FromRow)]
struct AssetRow {
    id: Uuid,
    workspace_id: Uuid,
    uploaded_by: Uuid,
    assigned_to: Uuid,
    original_ref: String,
    edited_ref: Option<String>,
    edited_at: Option<DateTime<Utc>>,
    title: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    status: String,
    feedback: Option<String>,
    feedback_at: Option<DateTime<Utc>>,
    platform_id: Option<String>,
    published_title: Option<String>,
    published_description: Option<String>,
    published_visibility: Option<String>,
    published_made_for_kids: Option<bool>,
    published_at: Option<DateTime<Utc>>,
    publish_claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = ReviewError;

    fn try_from(row: AssetRow) -> Result<Self> {
        let publication = match (row.platform_id, row.published_at) {
            (Some(platform_id), Some(published_at)) => Some(PublishRecord {
                platform_id,
                title: row.published_title.unwrap_or_default(),
                description: row.published_description.unwrap_or_default(),
                visibility: row
                    .published_visibility
                    .as_deref()
                    .map(str::parse::<Visibility>)
                    .transpose()?
                    .unwrap_or_default(),
                made_for_kids: row.published_made_for_kids.unwrap_or(false),
                published_at,
            }),
            _ => None,
        };

        Ok(Asset {
            id: row.id,
            workspace_id: row.workspace_id,
            uploaded_by: row.uploaded_by,
            assigned_to: row.assigned_to,
            original_ref: row.original_ref,
            edited_ref: row.edited_ref,
            edited_at: row.edited_at,
            title: row.title,
            description: row.description,
            tags: row.tags,
            status: row.status.parse()?,
            feedback: row.feedback,
            feedback_at: row.feedback_at,
            publication,
            publish_claimed_at: row.publish_claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgAssetRepository {
    pool: PgPool,
}

impl PgAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The updated row, or the reason a conditional transition matched none
    async fn applied(&self, current: &Asset, row: Option<AssetRow>) -> Result<Asset> {
        match row {
            Some(row) => row.try_into(),
            None => {
                let found = self.find(current.id).await?;
                Err(stale_transition(current, found.as_ref()))
            }
        }
    }

    async fn list_where(&self, predicate: &str, key: Uuid) -> Result<Vec<Asset>> {
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE {predicate} ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl AssetRepository for PgAssetRepository {
    async fn insert(&self, new: NewAsset) -> Result<Asset> {
        let sql = format!(
            r#"
            INSERT INTO assets (
                id, workspace_id, uploaded_by, assigned_to, original_ref,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', NOW(), NOW())
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.workspace_id)
            .bind(new.uploaded_by)
            .bind(new.assigned_to)
            .bind(&new.original_ref)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn find(&self, id: Uuid) -> Result<Option<Asset>> {
        let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = $1");
        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Asset>> {
        self.list_where("workspace_id = $1", workspace_id).await
    }

    async fn list_assigned(&self, account_id: Uuid) -> Result<Vec<Asset>> {
        self.list_where("assigned_to = $1", account_id).await
    }

    async fn reference_in_use(&self, reference: &str) -> Result<bool> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM assets WHERE original_ref = $1 OR edited_ref = $1)",
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;

        Ok(in_use)
    }

    async fn record_edit(
        &self,
        current: &Asset,
        edited_ref: &str,
        metadata: &EditMetadata,
        status: AssetStatus,
        at: DateTime<Utc>,
    ) -> Result<Asset> {
        let sql = format!(
            r#"
            UPDATE assets
            SET edited_ref = $2,
                edited_at = $3,
                title = COALESCE($4, title),
                description = COALESCE($5, description),
                tags = $6,
                status = $7,
                updated_at = $3
            WHERE id = $1
              AND status = $8
              AND edited_ref IS NOT DISTINCT FROM $9
              AND platform_id IS NULL
              AND publish_claimed_at IS NULL
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(current.id)
            .bind(edited_ref)
            .bind(at)
            .bind(metadata.title.as_deref())
            .bind(metadata.description.as_deref())
            .bind(&metadata.tags)
            .bind(status.as_str())
            .bind(current.status.as_str())
            .bind(current.edited_ref.as_deref())
            .fetch_optional(&self.pool)
            .await?;

        self.applied(current, row).await
    }

    async fn record_decision(
        &self,
        current: &Asset,
        status: AssetStatus,
        feedback: Option<&FeedbackUpdate>,
        at: DateTime<Utc>,
    ) -> Result<Asset> {
        let sql = format!(
            r#"
            UPDATE assets
            SET status = $2,
                feedback = CASE WHEN $3 THEN $4 ELSE feedback END,
                feedback_at = CASE WHEN $3 THEN $5 ELSE feedback_at END,
                updated_at = $6
            WHERE id = $1
              AND status = $7
              AND platform_id IS NULL
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(current.id)
            .bind(status.as_str())
            .bind(feedback.is_some())
            .bind(feedback.and_then(|f| f.note.as_deref()))
            .bind(feedback.map(|f| f.recorded_at))
            .bind(at)
            .bind(current.status.as_str())
            .fetch_optional(&self.pool)
            .await?;

        self.applied(current, row).await
    }

    async fn claim_publish(&self, id: Uuid, at: DateTime<Utc>) -> Result<PublishClaim> {
        let sql = format!(
            r#"
            UPDATE assets
            SET publish_claimed_at = $2, updated_at = $2
            WHERE id = $1
              AND status = 'approved'
              AND platform_id IS NULL
              AND publish_claimed_at IS NULL
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let claimed = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = claimed {
            return Ok(PublishClaim::Claimed(row.try_into()?));
        }

        let current = self.find(id).await?;
        Ok(PublishClaim::classify(current.as_ref()))
    }

    async fn release_publish_claim(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE assets
            SET publish_claimed_at = NULL, updated_at = NOW()
            WHERE id = $1 AND platform_id IS NULL AND publish_claimed_at IS NOT NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_publish(&self, id: Uuid, record: &PublishRecord) -> Result<Asset> {
        let sql = format!(
            r#"
            UPDATE assets
            SET platform_id = $2,
                published_title = $3,
                published_description = $4,
                published_visibility = $5,
                published_made_for_kids = $6,
                published_at = $7,
                updated_at = $7
            WHERE id = $1 AND platform_id IS NULL
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, AssetRow>(&sql)
            .bind(id)
            .bind(&record.platform_id)
            .bind(&record.title)
            .bind(&record.description)
            .bind(record.visibility.as_str())
            .bind(record.made_for_kids)
            .bind(record.published_at)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.try_into(),
            None => match self.find(id).await? {
                Some(asset) => Err(ReviewError::AlreadyPublished(
                    asset.platform_id().unwrap_or_default().to_string(),
                )),
                None => Err(ReviewError::NotFound(format!("asset {id}"))),
            },
        }
    }

    async fn list_unreconciled(&self) -> Result<Vec<Asset>> {
        let sql = format!(
            r#"
            SELECT {ASSET_COLUMNS}
            FROM assets
            WHERE platform_id IS NULL AND publish_claimed_at IS NOT NULL
            ORDER BY publish_claimed_at ASC
            "#
        );

        let rows = sqlx::query_as::<_, AssetRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
