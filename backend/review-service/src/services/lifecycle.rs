//! Asset Lifecycle State Machine
//!
//! Every mutation follows the same order: load, authorize against the
//! owning workspace, run the transition table, then write. Publication is
//! gated by a claim on the asset row so at most one platform upload is ever
//! in flight for an asset.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;
use validator::Validate;

use super::asset_store::AssetStore;
use super::credentials::CredentialManager;
use super::publishing::{PublishFailure, PublishOptions, PublishingPipeline};
use crate::db::{AccountRepository, AssetRepository, PublishClaim, WorkspaceRepository};
use crate::error::{Result, ReviewError};
use crate::metrics;
use crate::models::{
    normalize_email, Account, Asset, AssetStatus, Decision, Delegation, EditMetadata,
    FeedbackUpdate, NewAsset, PublishRecord, ReviewEvent, Role, Workspace,
};

const MAX_WORKSPACE_NAME_LEN: usize = 120;
const MAX_FEEDBACK_LEN: usize = 5000;

pub struct ReviewWorkflow {
    accounts: Arc<dyn AccountRepository>,
    workspaces: Arc<dyn WorkspaceRepository>,
    assets: Arc<dyn AssetRepository>,
    store: Arc<dyn AssetStore>,
    credentials: Arc<CredentialManager>,
    pipeline: Arc<PublishingPipeline>,
    storage_timeout: Duration,
}

impl ReviewWorkflow {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        workspaces: Arc<dyn WorkspaceRepository>,
        assets: Arc<dyn AssetRepository>,
        store: Arc<dyn AssetStore>,
        credentials: Arc<CredentialManager>,
        pipeline: Arc<PublishingPipeline>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            workspaces,
            assets,
            store,
            credentials,
            pipeline,
            storage_timeout,
        }
    }

    // ========================================================================
    // Workspaces and delegations
    // ========================================================================

    pub async fn create_workspace(&self, acting: Uuid, name: &str) -> Result<Workspace> {
        let account = self.account(acting).await?;
        if account.role != Role::Producer {
            return Err(ReviewError::Forbidden("only producers can own workspaces".into()));
        }

        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_WORKSPACE_NAME_LEN {
            return Err(ReviewError::Validation(format!(
                "workspace name must be 1-{MAX_WORKSPACE_NAME_LEN} characters"
            )));
        }

        let workspace = self.workspaces.create(acting, name).await?;
        tracing::info!(workspace_id = %workspace.id, owner_id = %acting, "workspace created");
        Ok(workspace)
    }

    /// Owned workspaces for producers, delegated ones for delegates
    pub async fn list_workspaces(&self, acting: Uuid) -> Result<Vec<Workspace>> {
        let account = self.account(acting).await?;
        match account.role {
            Role::Producer => self.workspaces.list_owned(acting).await,
            Role::Delegate => self.workspaces.list_delegated(&account.email).await,
        }
    }

    pub async fn accept_delegation(&self, acting: Uuid, workspace_id: Uuid) -> Result<Delegation> {
        let account = self.account(acting).await?;
        self.workspace(workspace_id).await?;

        self.workspaces
            .accept_delegation(workspace_id, &account.email, Utc::now())
            .await?
            .ok_or_else(|| ReviewError::Forbidden("no delegation for this workspace".into()))
    }

    // ========================================================================
    // Review transitions
    // ========================================================================

    /// Create a pending asset in `workspace_id` assigned to an existing account
    pub async fn submit_original(
        &self,
        acting: Uuid,
        workspace_id: Uuid,
        delegate_email: &str,
        binary_ref: &str,
    ) -> Result<Asset> {
        let workspace = self.workspace(workspace_id).await?;
        ensure_owner(&workspace, acting)?;

        let binary_ref = binary_ref.trim();
        if binary_ref.is_empty() {
            return Err(ReviewError::Validation("binary reference is required".into()));
        }
        self.ensure_issued(binary_ref)?;

        let delegate_email = normalize_email(delegate_email);
        let delegate = self
            .accounts
            .find_by_email(&delegate_email)
            .await?
            .ok_or_else(|| ReviewError::DelegateNotFound(delegate_email.clone()))?;

        self.workspaces
            .ensure_delegation(workspace_id, &delegate_email)
            .await?;

        let asset = self
            .assets
            .insert(NewAsset {
                workspace_id,
                uploaded_by: acting,
                assigned_to: delegate.id,
                original_ref: binary_ref.to_string(),
            })
            .await?;

        metrics::record_transition(AssetStatus::Pending.as_str());
        tracing::info!(
            asset_id = %asset.id,
            workspace_id = %workspace_id,
            assigned_to = %delegate.id,
            "asset submitted for editing"
        );
        Ok(asset)
    }

    /// Attach an edited binary and move the asset to review
    ///
    /// Only the assigned delegate may submit, and only a binary this service
    /// stored that no asset already references. Re-submitting replaces the
    /// previous edit, whose binary is then removed from the Asset Store.
    pub async fn submit_edit(
        &self,
        acting: Uuid,
        asset_id: Uuid,
        edited_ref: &str,
        metadata: EditMetadata,
    ) -> Result<Asset> {
        let asset = self.asset(asset_id).await?;
        if asset.assigned_to != acting {
            return Err(ReviewError::Forbidden(
                "only the assigned delegate can submit an edit".into(),
            ));
        }

        let next = asset.status.apply(ReviewEvent::EditSubmitted)?;

        let edited_ref = edited_ref.trim();
        if edited_ref.is_empty() {
            return Err(ReviewError::Validation("edited binary reference is required".into()));
        }
        if edited_ref == asset.original_ref {
            return Err(ReviewError::Validation(
                "edited binary must differ from the original".into(),
            ));
        }
        self.ensure_issued(edited_ref)?;
        if asset.edited_ref.as_deref() != Some(edited_ref)
            && self.assets.reference_in_use(edited_ref).await?
        {
            return Err(ReviewError::Validation(
                "binary reference already belongs to an asset".into(),
            ));
        }

        let updated = self
            .assets
            .record_edit(&asset, edited_ref, &metadata, next, Utc::now())
            .await?;
        log_transition(&updated, asset.status);

        // First submission consumes a still-pending delegation
        let account = self.account(acting).await?;
        self.workspaces
            .accept_delegation(asset.workspace_id, &account.email, Utc::now())
            .await?;

        if let Some(previous) = asset
            .edited_ref
            .as_deref()
            .filter(|p| *p != edited_ref && *p != asset.original_ref)
        {
            self.discard_binary(asset_id, previous).await;
        }

        Ok(updated)
    }

    /// Producer verdict on a pending or review-ready asset
    pub async fn decide(
        &self,
        acting: Uuid,
        asset_id: Uuid,
        decision: Decision,
        feedback: Option<String>,
    ) -> Result<Asset> {
        let asset = self.asset(asset_id).await?;
        let workspace = self.workspace(asset.workspace_id).await?;
        ensure_owner(&workspace, acting)?;

        let next = asset.status.apply(decision.event())?;

        let feedback = match decision {
            Decision::RequestChanges => {
                let note = feedback
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty());
                if note.as_ref().is_some_and(|n| n.chars().count() > MAX_FEEDBACK_LEN) {
                    return Err(ReviewError::Validation(format!(
                        "feedback must be at most {MAX_FEEDBACK_LEN} characters"
                    )));
                }
                Some(FeedbackUpdate {
                    note,
                    recorded_at: Utc::now(),
                })
            }
            Decision::Approve => None,
        };

        let updated = self
            .assets
            .record_decision(&asset, next, feedback.as_ref(), Utc::now())
            .await?;
        log_transition(&updated, asset.status);
        Ok(updated)
    }

    // ========================================================================
    // Publication
    // ========================================================================

    /// Upload the approved asset to the platform under the producer's
    /// delegated credential and record the result
    pub async fn publish(
        &self,
        acting: Uuid,
        asset_id: Uuid,
        options: PublishOptions,
    ) -> Result<PublishRecord> {
        options.validate()?;

        let asset = self.asset(asset_id).await?;
        let workspace = self.workspace(asset.workspace_id).await?;
        ensure_owner(&workspace, acting)?;

        if let Some(platform_id) = asset.platform_id() {
            return Err(ReviewError::AlreadyPublished(platform_id.to_string()));
        }
        if asset.status != AssetStatus::Approved {
            return Err(ReviewError::not_approved(asset.status));
        }

        let credential = self.credentials.resolve_publishing_credential(acting).await?;

        let claimed = match self.assets.claim_publish(asset_id, Utc::now()).await? {
            PublishClaim::Claimed(asset) => asset,
            PublishClaim::AlreadyPublished(platform_id) => {
                return Err(ReviewError::AlreadyPublished(platform_id))
            }
            PublishClaim::InProgress => return Err(ReviewError::PublishInProgress),
            PublishClaim::NotApproved(status) => return Err(ReviewError::not_approved(status)),
            PublishClaim::NotFound => return Err(ReviewError::NotFound(format!("asset {asset_id}"))),
        };

        let metadata = options.resolve(&claimed);
        let started = Instant::now();

        let platform_id = match self
            .pipeline
            .publish_asset(&claimed, &credential, &metadata)
            .await
        {
            Ok(platform_id) => platform_id,
            Err(PublishFailure::NotPublished(err)) => {
                metrics::record_publish(publish_outcome(&err), started.elapsed());
                self.release_claim_after_failure(asset_id, &err).await;
                return Err(err);
            }
            Err(PublishFailure::OutcomeUnknown(err)) => {
                let outcome = match &err {
                    ReviewError::UpstreamTimeout(_) => "timeout",
                    _ => "unknown",
                };
                metrics::record_publish(outcome, started.elapsed());
                tracing::warn!(
                    asset_id = %asset_id,
                    error = %err,
                    "publish outcome unknown; claim held for reconciliation"
                );
                return Err(err);
            }
        };

        let record = PublishRecord {
            platform_id,
            title: metadata.title,
            description: metadata.description,
            visibility: metadata.visibility,
            made_for_kids: metadata.made_for_kids,
            published_at: Utc::now(),
        };

        if let Err(err) = self.assets.commit_publish(asset_id, &record).await {
            tracing::error!(
                asset_id = %asset_id,
                platform_id = %record.platform_id,
                error = %err,
                "platform accepted upload but commit failed; claim held for reconciliation"
            );
            metrics::record_publish("commit_failed", started.elapsed());
            return Err(err);
        }

        metrics::record_publish("published", started.elapsed());
        tracing::info!(
            asset_id = %asset_id,
            platform_id = %record.platform_id,
            visibility = record.visibility.as_str(),
            "asset published"
        );
        Ok(record)
    }

    /// Assets whose publish claim is held with no recorded identifier
    pub async fn unreconciled_publishes(&self) -> Result<Vec<Asset>> {
        self.assets.list_unreconciled().await
    }

    /// Operator action once an unreconciled asset is verified absent from
    /// the platform
    pub async fn release_publish_claim(&self, asset_id: Uuid) -> Result<bool> {
        let released = self.assets.release_publish_claim(asset_id).await?;
        if released {
            tracing::info!(asset_id = %asset_id, "publish claim released by operator");
        }
        Ok(released)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Visible to the workspace owner and the assigned delegate
    pub async fn get_asset(&self, acting: Uuid, asset_id: Uuid) -> Result<Asset> {
        let asset = self.asset(asset_id).await?;
        if asset.assigned_to == acting {
            return Ok(asset);
        }

        let workspace = self.workspace(asset.workspace_id).await?;
        ensure_owner(&workspace, acting)?;
        Ok(asset)
    }

    /// Owners see every asset; a delegate sees the ones assigned to them
    pub async fn list_workspace_assets(&self, acting: Uuid, workspace_id: Uuid) -> Result<Vec<Asset>> {
        let workspace = self.workspace(workspace_id).await?;
        let assets = self.assets.list_by_workspace(workspace_id).await?;
        if workspace.owner_id == acting {
            return Ok(assets);
        }

        let account = self.account(acting).await?;
        if self
            .workspaces
            .find_delegation(workspace_id, &account.email)
            .await?
            .is_none()
        {
            return Err(ReviewError::Forbidden("not a member of this workspace".into()));
        }

        Ok(assets.into_iter().filter(|a| a.assigned_to == acting).collect())
    }

    pub async fn list_assigned(&self, acting: Uuid) -> Result<Vec<Asset>> {
        self.assets.list_assigned(acting).await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn account(&self, id: Uuid) -> Result<Account> {
        self.accounts
            .find_by_id(id)
            .await?
            .ok_or(ReviewError::AccountNotFound)
    }

    async fn workspace(&self, id: Uuid) -> Result<Workspace> {
        self.workspaces
            .find(id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("workspace {id}")))
    }

    async fn asset(&self, id: Uuid) -> Result<Asset> {
        self.assets
            .find(id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(format!("asset {id}")))
    }

    async fn release_claim_after_failure(&self, asset_id: Uuid, cause: &ReviewError) {
        tracing::warn!(asset_id = %asset_id, error = %cause, "publish failed; releasing claim");
        if let Err(err) = self.assets.release_publish_claim(asset_id).await {
            tracing::error!(
                asset_id = %asset_id,
                error = %err,
                "failed to release publish claim"
            );
        }
    }

    fn ensure_issued(&self, reference: &str) -> Result<()> {
        if !self.store.owns(reference) {
            return Err(ReviewError::Validation(
                "binary reference was not issued by this service".into(),
            ));
        }
        Ok(())
    }

    /// Best-effort removal of a superseded binary. Skipped while any asset
    /// still references it.
    async fn discard_binary(&self, asset_id: Uuid, reference: &str) {
        match self.assets.reference_in_use(reference).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!(
                    asset_id = %asset_id,
                    reference,
                    "superseded edit still referenced; kept"
                );
                return;
            }
            Err(err) => {
                tracing::warn!(
                    asset_id = %asset_id,
                    reference,
                    error = %err,
                    "could not check superseded edit; kept"
                );
                return;
            }
        }

        match resilience::with_timeout(self.storage_timeout, self.store.delete(reference)).await {
            Ok(Ok(())) => {
                tracing::debug!(asset_id = %asset_id, reference, "superseded edit removed")
            }
            Ok(Err(err)) => tracing::warn!(
                asset_id = %asset_id,
                reference,
                error = %err,
                "failed to remove superseded edit"
            ),
            Err(elapsed) => tracing::warn!(
                asset_id = %asset_id,
                reference,
                error = %elapsed,
                "timed out removing superseded edit"
            ),
        }
    }
}

fn ensure_owner(workspace: &Workspace, acting: Uuid) -> Result<()> {
    if workspace.owner_id != acting {
        return Err(ReviewError::Forbidden(
            "only the workspace producer can do this".into(),
        ));
    }
    Ok(())
}

fn log_transition(asset: &Asset, from: AssetStatus) {
    metrics::record_transition(asset.status.as_str());
    tracing::info!(
        asset_id = %asset.id,
        from = from.as_str(),
        to = asset.status.as_str(),
        "asset transitioned"
    );
}

fn publish_outcome(err: &ReviewError) -> &'static str {
    match err {
        ReviewError::QuotaExceeded(_) => "quota",
        ReviewError::AssetUnavailable(_) => "asset_unavailable",
        ReviewError::UpstreamTimeout(_) => "timeout",
        _ => "failed",
    }
}
