//! In-memory repositories backed by [`DashMap`].
//!
//! Used by the test suite and by local runs without Postgres. The
//! compare-and-swap operations (`rotate_session`, `record_edit`,
//! `record_decision`, `claim_publish`, `commit_publish`) run under the shard
//! write lock of a single entry, so they have the same all-or-nothing
//! behaviour as the conditional `UPDATE`s in the Postgres repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    stale_transition, AccountRepository, AssetRepository, PublishClaim, WorkspaceRepository,
};
use crate::error::{Result, ReviewError};
use crate::models::{
    Account, Asset, AssetStatus, DelegatedCredential, Delegation, DelegationStatus, EditMetadata,
    FeedbackUpdate, NewAsset, PublishRecord, Role, Workspace,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<Uuid, Account>,
    emails: DashMap<String, Uuid>,
    workspaces: DashMap<Uuid, Workspace>,
    delegations: DashMap<(Uuid, String), Delegation>,
    assets: DashMap<Uuid, Asset>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete an account outright, as an operator purge would
    pub fn purge_account(&self, id: Uuid) {
        if let Some((_, account)) = self.accounts.remove(&id) {
            self.emails.remove(&account.email);
        }
    }

    /// Apply `mutate` under the entry lock iff the asset is unpublished and
    /// `still_current` holds
    fn transition_asset<P, F>(&self, current: &Asset, still_current: P, mutate: F) -> Result<Asset>
    where
        P: FnOnce(&Asset) -> bool,
        F: FnOnce(&mut Asset),
    {
        let Some(mut asset) = self.assets.get_mut(&current.id) else {
            return Err(stale_transition(current, None));
        };
        if asset.publication.is_some() || !still_current(&*asset) {
            return Err(stale_transition(current, Some(&*asset)));
        }
        mutate(&mut *asset);
        Ok(asset.clone())
    }

    fn update_account<F>(&self, id: Uuid, mutate: F)
    where
        F: FnOnce(&mut Account),
    {
        if let Some(mut account) = self.accounts.get_mut(&id) {
            mutate(&mut account);
        }
    }

    fn sorted_newest_first(mut assets: Vec<Asset>) -> Vec<Asset> {
        assets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        assets
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let id = match self.emails.get(email) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.find_by_id(id).await
    }

    async fn upsert(&self, email: &str, role: Role) -> Result<Account> {
        match self.emails.entry(email.to_string()) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                self.accounts
                    .get(&id)
                    .map(|a| a.clone())
                    .ok_or_else(|| ReviewError::Internal(format!("dangling email index for {id}")))
            }
            Entry::Vacant(vacant) => {
                let account = Account {
                    id: Uuid::new_v4(),
                    email: email.to_string(),
                    role,
                    delegated: None,
                    session_fingerprint: None,
                    session_issued_at: None,
                    created_at: Utc::now(),
                };
                self.accounts.insert(account.id, account.clone());
                vacant.insert(account.id);
                Ok(account)
            }
        }
    }

    async fn store_delegated_credential(
        &self,
        id: Uuid,
        credential: &DelegatedCredential,
    ) -> Result<()> {
        self.update_account(id, |account| account.delegated = Some(credential.clone()));
        Ok(())
    }

    async fn replace_session(
        &self,
        id: Uuid,
        fingerprint: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update_account(id, |account| {
            account.session_fingerprint = Some(fingerprint.to_string());
            account.session_issued_at = Some(issued_at);
        });
        Ok(())
    }

    async fn rotate_session(
        &self,
        id: Uuid,
        expected: &str,
        fingerprint: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut account) = self.accounts.get_mut(&id) else {
            return Ok(false);
        };

        if account.session_fingerprint.as_deref() != Some(expected) {
            return Ok(false);
        }

        account.session_fingerprint = Some(fingerprint.to_string());
        account.session_issued_at = Some(issued_at);
        Ok(true)
    }

    async fn clear_session(&self, id: Uuid) -> Result<()> {
        self.update_account(id, |account| {
            account.session_fingerprint = None;
            account.session_issued_at = None;
        });
        Ok(())
    }
}

#[async_trait]
impl WorkspaceRepository for MemoryStore {
    async fn create(&self, owner_id: Uuid, name: &str) -> Result<Workspace> {
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id,
            created_at: Utc::now(),
        };
        self.workspaces.insert(workspace.id, workspace.clone());
        Ok(workspace)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Workspace>> {
        Ok(self.workspaces.get(&id).map(|w| w.clone()))
    }

    async fn list_owned(&self, owner_id: Uuid) -> Result<Vec<Workspace>> {
        let mut owned: Vec<Workspace> = self
            .workspaces
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .map(|w| w.clone())
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn list_delegated(&self, email: &str) -> Result<Vec<Workspace>> {
        let workspace_ids: Vec<Uuid> = self
            .delegations
            .iter()
            .filter(|d| d.email == email)
            .map(|d| d.workspace_id)
            .collect();

        let mut delegated: Vec<Workspace> = workspace_ids
            .into_iter()
            .filter_map(|id| self.workspaces.get(&id).map(|w| w.clone()))
            .collect();
        delegated.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(delegated)
    }

    async fn ensure_delegation(&self, workspace_id: Uuid, email: &str) -> Result<Delegation> {
        let delegation = self
            .delegations
            .entry((workspace_id, email.to_string()))
            .or_insert_with(|| Delegation {
                id: Uuid::new_v4(),
                workspace_id,
                email: email.to_string(),
                status: DelegationStatus::Pending,
                created_at: Utc::now(),
                accepted_at: None,
            });
        Ok(delegation.clone())
    }

    async fn find_delegation(
        &self,
        workspace_id: Uuid,
        email: &str,
    ) -> Result<Option<Delegation>> {
        Ok(self
            .delegations
            .get(&(workspace_id, email.to_string()))
            .map(|d| d.clone()))
    }

    async fn accept_delegation(
        &self,
        workspace_id: Uuid,
        email: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Delegation>> {
        let Some(mut delegation) = self.delegations.get_mut(&(workspace_id, email.to_string()))
        else {
            return Ok(None);
        };

        delegation.status = DelegationStatus::Accepted;
        delegation.accepted_at.get_or_insert(at);
        Ok(Some(delegation.clone()))
    }
}

#[async_trait]
impl AssetRepository for MemoryStore {
    async fn insert(&self, new: NewAsset) -> Result<Asset> {
        let now = Utc::now();
        let asset = Asset {
            id: Uuid::new_v4(),
            workspace_id: new.workspace_id,
            uploaded_by: new.uploaded_by,
            assigned_to: new.assigned_to,
            original_ref: new.original_ref,
            edited_ref: None,
            edited_at: None,
            title: None,
            description: None,
            tags: Vec::new(),
            status: AssetStatus::Pending,
            feedback: None,
            feedback_at: None,
            publication: None,
            publish_claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Asset>> {
        Ok(self.assets.get(&id).map(|a| a.clone()))
    }

    async fn list_by_workspace(&self, workspace_id: Uuid) -> Result<Vec<Asset>> {
        let assets = self
            .assets
            .iter()
            .filter(|a| a.workspace_id == workspace_id)
            .map(|a| a.clone())
            .collect();
        Ok(Self::sorted_newest_first(assets))
    }

    async fn list_assigned(&self, account_id: Uuid) -> Result<Vec<Asset>> {
        let assets = self
            .assets
            .iter()
            .filter(|a| a.assigned_to == account_id)
            .map(|a| a.clone())
            .collect();
        Ok(Self::sorted_newest_first(assets))
    }

    async fn reference_in_use(&self, reference: &str) -> Result<bool> {
        Ok(self.assets.iter().any(|a| {
            a.original_ref == reference || a.edited_ref.as_deref() == Some(reference)
        }))
    }

    async fn record_edit(
        &self,
        current: &Asset,
        edited_ref: &str,
        metadata: &EditMetadata,
        status: AssetStatus,
        at: DateTime<Utc>,
    ) -> Result<Asset> {
        self.transition_asset(
            current,
            |asset| {
                asset.status == current.status
                    && asset.edited_ref == current.edited_ref
                    && asset.publish_claimed_at.is_none()
            },
            |asset| {
                asset.edited_ref = Some(edited_ref.to_string());
                asset.edited_at = Some(at);
                if let Some(title) = &metadata.title {
                    asset.title = Some(title.clone());
                }
                if let Some(description) = &metadata.description {
                    asset.description = Some(description.clone());
                }
                asset.tags = metadata.tags.clone();
                asset.status = status;
                asset.updated_at = at;
            },
        )
    }

    async fn record_decision(
        &self,
        current: &Asset,
        status: AssetStatus,
        feedback: Option<&FeedbackUpdate>,
        at: DateTime<Utc>,
    ) -> Result<Asset> {
        self.transition_asset(
            current,
            |asset| asset.status == current.status,
            |asset| {
                asset.status = status;
                if let Some(update) = feedback {
                    asset.feedback = update.note.clone();
                    asset.feedback_at = Some(update.recorded_at);
                }
                asset.updated_at = at;
            },
        )
    }

    async fn claim_publish(&self, id: Uuid, at: DateTime<Utc>) -> Result<PublishClaim> {
        let Some(mut asset) = self.assets.get_mut(&id) else {
            return Ok(PublishClaim::NotFound);
        };

        let claimable = asset.status == AssetStatus::Approved
            && asset.publication.is_none()
            && asset.publish_claimed_at.is_none();
        if !claimable {
            return Ok(PublishClaim::classify(Some(&*asset)));
        }

        asset.publish_claimed_at = Some(at);
        asset.updated_at = at;
        Ok(PublishClaim::Claimed(asset.clone()))
    }

    async fn release_publish_claim(&self, id: Uuid) -> Result<bool> {
        let Some(mut asset) = self.assets.get_mut(&id) else {
            return Ok(false);
        };

        if asset.publication.is_some() || asset.publish_claimed_at.is_none() {
            return Ok(false);
        }

        asset.publish_claimed_at = None;
        asset.updated_at = Utc::now();
        Ok(true)
    }

    async fn commit_publish(&self, id: Uuid, record: &PublishRecord) -> Result<Asset> {
        let mut asset = self
            .assets
            .get_mut(&id)
            .ok_or_else(|| ReviewError::NotFound(format!("asset {id}")))?;

        if let Some(existing) = asset.platform_id() {
            return Err(ReviewError::AlreadyPublished(existing.to_string()));
        }

        asset.publication = Some(record.clone());
        asset.updated_at = record.published_at;
        Ok(asset.clone())
    }

    async fn list_unreconciled(&self) -> Result<Vec<Asset>> {
        let mut pending: Vec<Asset> = self
            .assets
            .iter()
            .filter(|a| a.publication.is_none() && a.publish_claimed_at.is_some())
            .map(|a| a.clone())
            .collect();
        pending.sort_by_key(|a| a.publish_claimed_at);
        Ok(pending)
    }
}
