/// Persistence layer
///
/// Each aggregate has a repository trait with a Postgres implementation and
/// an in-memory one (`memory::MemoryStore`) that honours the same atomicity
/// guarantees: session rotation, review transitions and publish claims are
/// single compare-and-swap operations in both.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, ReviewError};
use crate::models::{
    Account, Asset, AssetStatus, DelegatedCredential, Delegation, EditMetadata, FeedbackUpdate,
    NewAsset, PublishRecord, Role, Workspace,
};

pub mod accounts;
pub mod assets;
pub mod memory;
pub mod workspaces;

pub use accounts::PgAccountRepository;
pub use assets::PgAssetRepository;
pub use memory::MemoryStore;
pub use workspaces::PgWorkspaceRepository;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Create the account on first sight; an existing account keeps its role
    async fn upsert(&self, email: &str, role: Role) -> Result<Account>;

    /// Overwrite the delegated credential bundle
    async fn store_delegated_credential(
        &self,
        id: Uuid,
        credential: &DelegatedCredential,
    ) -> Result<()>;

    /// Unconditionally install a new session fingerprint
    async fn replace_session(
        &self,
        id: Uuid,
        fingerprint: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Install `fingerprint` only if the stored one still equals `expected`.
    /// Returns whether the swap happened.
    async fn rotate_session(
        &self,
        id: Uuid,
        expected: &str,
        fingerprint: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn clear_session(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    async fn create(&self, owner_id: Uuid, name: &str) -> Result<Workspace>;

    async fn find(&self, id: Uuid) -> Result<Option<Workspace>>;

    async fn list_owned(&self, owner_id: Uuid) -> Result<Vec<Workspace>>;

    /// Workspaces holding a delegation (pending or accepted) for `email`
    async fn list_delegated(&self, email: &str) -> Result<Vec<Workspace>>;

    /// Return the delegation for (workspace, email), creating it pending
    async fn ensure_delegation(&self, workspace_id: Uuid, email: &str) -> Result<Delegation>;

    async fn find_delegation(&self, workspace_id: Uuid, email: &str)
        -> Result<Option<Delegation>>;

    /// Mark accepted; `None` when no delegation exists. Accepting twice keeps
    /// the first acceptance time.
    async fn accept_delegation(
        &self,
        workspace_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Delegation>>;
}

/// Outcome of trying to take the publish claim on an asset
#[derive(Debug, Clone)]
pub enum PublishClaim {
    Claimed(Asset),
    AlreadyPublished(String),
    InProgress,
    NotApproved(AssetStatus),
    NotFound,
}

impl PublishClaim {
    /// Classify an asset the conditional claim did not match
    pub(crate) fn classify(asset: Option<&Asset>) -> Self {
        match asset {
            None => PublishClaim::NotFound,
            Some(asset) => match asset.platform_id() {
                Some(platform_id) => PublishClaim::AlreadyPublished(platform_id.to_string()),
                None if asset.publish_claimed_at.is_some() => PublishClaim::InProgress,
                None => PublishClaim::NotApproved(asset.status),
            },
        }
    }
}

/// Error for a conditional transition whose snapshot no longer matches
pub(crate) fn stale_transition(expected: &Asset, found: Option<&Asset>) -> ReviewError {
    match found {
        None => ReviewError::NotFound(format!("asset {}", expected.id)),
        Some(asset) if asset.is_published() => ReviewError::InvalidTransition(format!(
            "asset {} was published while the change was in flight",
            asset.id
        )),
        Some(asset) => ReviewError::InvalidTransition(format!(
            "asset {} changed concurrently (expected {}, now {})",
            asset.id, expected.status, asset.status
        )),
    }
}

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn insert(&self, new: NewAsset) -> Result<Asset>;

    async fn find(&self, id: Uuid) -> Result<Option<Asset>>;

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Asset>>;

    async fn list_assigned(&self, account_id: Uuid) -> Result<Vec<Asset>>;

    /// Whether any asset records `reference` as its original or its edit
    async fn reference_in_use(&self, reference: &str) -> Result<bool>;

    /// Store a new edit and move to `status`, provided the asset still has
    /// the status and edit of `current` and is neither claimed nor published.
    /// Otherwise fails with `InvalidTransition`.
    async fn record_edit(
        &self,
        current: &Asset,
        edited_ref: &str,
        metadata: &EditMetadata,
        status: AssetStatus,
        at: DateTime<Utc>,
    ) -> Result<Asset>;

    /// Move to `status`, provided the asset is still in `current.status` and
    /// unpublished. Otherwise fails with `InvalidTransition`.
    async fn record_decision(
        &self,
        current: &Asset,
        status: AssetStatus,
        feedback: Option<&FeedbackUpdate>,
        at: DateTime<Utc>,
    ) -> Result<Asset>;

    /// Set `publish_claimed_at` iff the asset is approved, unpublished and
    /// unclaimed
    async fn claim_publish(&self, id: Uuid, at: DateTime<Utc>) -> Result<PublishClaim>;

    /// Drop a held claim on an unpublished asset. Returns whether one was held.
    async fn release_publish_claim(&self, id: Uuid) -> Result<bool>;

    /// Record the publication; fails with `AlreadyPublished` if an identifier
    /// is already present
    async fn commit_publish(&self, id: Uuid, record: &PublishRecord) -> Result<Asset>;

    /// Assets with a held claim and no recorded identifier
    async fn list_unreconciled(&self) -> Result<Vec<Asset>>;
}
