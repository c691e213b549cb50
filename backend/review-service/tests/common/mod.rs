//! Shared fixtures for review-service integration tests
//!
//! Everything runs in-process: the DashMap repositories, the in-memory asset
//! store, and call-counting fakes of the identity provider and the
//! publishing platform.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::StreamExt;
use resilience::RetryConfig;
use review_service::db::{AccountRepository, AssetRepository, MemoryStore, PublishClaim};
use review_service::error::Result as ReviewResult;
use review_service::models::{
    Account, Asset, AssetStatus, DelegatedCredential, Decision, EditMetadata, FeedbackUpdate,
    NewAsset, PublishRecord, Role, Workspace,
};
use review_service::services::{
    AssetStore, BinaryMetadata, ByteStream, ConsentOutcome, CredentialManager, CredentialSettings,
    IdentityAssertion, IdentityProvider, IdentityProviderError, MemoryAssetStore, PlatformError,
    PlatformMetadata, PublishingPipeline, PublishingPlatform, ReviewWorkflow, TokenPair,
};
use review_service::{AppState, HttpSettings};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

pub fn fresh_credential(access: &str, refresh: Option<&str>) -> DelegatedCredential {
    DelegatedCredential {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        scope: Some(UPLOAD_SCOPE.to_string()),
        expires_at: Utc::now() + ChronoDuration::hours(1),
    }
}

// ============================================================================
// Identity provider
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBehavior {
    Succeed,
    Reject,
    Network,
}

/// `complete_consent` treats the authorization code as the signed-in email
pub struct FakeIdentityProvider {
    pub refresh_calls: AtomicUsize,
    refresh_behavior: Mutex<RefreshBehavior>,
    refresh_delay: Mutex<Duration>,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            refresh_behavior: Mutex::new(RefreshBehavior::Succeed),
            refresh_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_refresh(&self, behavior: RefreshBehavior) {
        *self.refresh_behavior.lock().unwrap() = behavior;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    fn begin_consent(&self, role: Role, state: &str) -> String {
        format!("https://consent.test/authorize?role={role}&state={state}")
    }

    async fn complete_consent(
        &self,
        code: &str,
        role: Role,
    ) -> Result<ConsentOutcome, IdentityProviderError> {
        if code == "bad-code" {
            return Err(IdentityProviderError::Exchange("invalid_grant".into()));
        }
        let delegated = match role {
            Role::Producer => Some(fresh_credential("consent-access", Some("consent-refresh"))),
            Role::Delegate => None,
        };
        Ok(ConsentOutcome {
            email: code.to_string(),
            delegated,
        })
    }

    async fn refresh_delegated(
        &self,
        _refresh_token: &str,
    ) -> Result<DelegatedCredential, IdentityProviderError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match *self.refresh_behavior.lock().unwrap() {
            RefreshBehavior::Succeed => {
                let mut renewed = fresh_credential(&format!("refreshed-access-{call}"), None);
                renewed.scope = None;
                Ok(renewed)
            }
            RefreshBehavior::Reject => {
                Err(IdentityProviderError::RefreshRejected("invalid_grant".into()))
            }
            RefreshBehavior::Network => {
                Err(IdentityProviderError::Network("connection reset".into()))
            }
        }
    }
}

// ============================================================================
// Publishing platform
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformBehavior {
    Succeed(String),
    Quota,
    Reject,
    /// Never answers; the pipeline's publish timeout fires
    Hang,
    /// Takes the bytes, then the response is lost
    Ambiguous,
}

#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub metadata: PlatformMetadata,
    pub bytes: usize,
    pub access_token: String,
}

pub struct FakePlatform {
    pub insert_calls: AtomicUsize,
    behavior: Mutex<PlatformBehavior>,
    delay: Mutex<Duration>,
    received: Mutex<Vec<ReceivedUpload>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            insert_calls: AtomicUsize::new(0),
            behavior: Mutex::new(PlatformBehavior::Succeed("yt123".into())),
            delay: Mutex::new(Duration::ZERO),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: PlatformBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn insert_count(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<ReceivedUpload> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishingPlatform for FakePlatform {
    async fn insert(
        &self,
        mut binary: ByteStream,
        metadata: &PlatformMetadata,
        credential: &DelegatedCredential,
    ) -> Result<String, PlatformError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);

        let mut bytes = 0;
        while let Some(chunk) = binary.next().await {
            let chunk = chunk.map_err(|e| PlatformError::Other(e.to_string()))?;
            bytes += chunk.len();
        }

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            PlatformBehavior::Succeed(id) => {
                self.received.lock().unwrap().push(ReceivedUpload {
                    metadata: metadata.clone(),
                    bytes,
                    access_token: credential.access_token.clone(),
                });
                Ok(id)
            }
            PlatformBehavior::Quota => Err(PlatformError::Quota("quotaExceeded".into())),
            PlatformBehavior::Reject => Err(PlatformError::Other("invalid video".into())),
            PlatformBehavior::Ambiguous => {
                Err(PlatformError::Ambiguous("upload ended with HTTP 502".into()))
            }
            PlatformBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(PlatformError::Other("unreachable".into()))
            }
        }
    }
}

// ============================================================================
// Asset repository with slow reads
// ============================================================================

/// Returns each `find` snapshot only after `stall`, so the caller acts on
/// state other tasks may already have changed
pub struct StalledReads {
    inner: Arc<MemoryStore>,
    stall: Duration,
}

impl StalledReads {
    pub fn new(inner: Arc<MemoryStore>, stall: Duration) -> Self {
        Self { inner, stall }
    }
}

#[async_trait]
impl AssetRepository for StalledReads {
    async fn insert(&self, new: NewAsset) -> ReviewResult<Asset> {
        self.inner.insert(new).await
    }

    async fn find(&self, id: uuid::Uuid) -> ReviewResult<Option<Asset>> {
        let snapshot = AssetRepository::find(&*self.inner, id).await;
        tokio::time::sleep(self.stall).await;
        snapshot
    }

    async fn list_by_workspace(&self, workspace_id: uuid::Uuid) -> ReviewResult<Vec<Asset>> {
        self.inner.list_by_workspace(workspace_id).await
    }

    async fn list_assigned(&self, account_id: uuid::Uuid) -> ReviewResult<Vec<Asset>> {
        self.inner.list_assigned(account_id).await
    }

    async fn reference_in_use(&self, reference: &str) -> ReviewResult<bool> {
        self.inner.reference_in_use(reference).await
    }

    async fn record_edit(
        &self,
        current: &Asset,
        edited_ref: &str,
        metadata: &EditMetadata,
        status: AssetStatus,
        at: DateTime<Utc>,
    ) -> ReviewResult<Asset> {
        self.inner
            .record_edit(current, edited_ref, metadata, status, at)
            .await
    }

    async fn record_decision(
        &self,
        current: &Asset,
        status: AssetStatus,
        feedback: Option<&FeedbackUpdate>,
        at: DateTime<Utc>,
    ) -> ReviewResult<Asset> {
        self.inner.record_decision(current, status, feedback, at).await
    }

    async fn claim_publish(&self, id: uuid::Uuid, at: DateTime<Utc>) -> ReviewResult<PublishClaim> {
        self.inner.claim_publish(id, at).await
    }

    async fn release_publish_claim(&self, id: uuid::Uuid) -> ReviewResult<bool> {
        self.inner.release_publish_claim(id).await
    }

    async fn commit_publish(
        &self,
        id: uuid::Uuid,
        record: &PublishRecord,
    ) -> ReviewResult<Asset> {
        self.inner.commit_publish(id, record).await
    }

    async fn list_unreconciled(&self) -> ReviewResult<Vec<Asset>> {
        self.inner.list_unreconciled().await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// An approved asset ready to publish
pub struct Scenario {
    pub producer: Account,
    pub delegate: Account,
    pub workspace: Workspace,
    pub asset: Asset,
}

pub struct Harness {
    pub repo: Arc<MemoryStore>,
    pub binaries: Arc<MemoryAssetStore>,
    pub identity: Arc<FakeIdentityProvider>,
    pub platform: Arc<FakePlatform>,
    pub credentials: Arc<CredentialManager>,
    pub workflow: Arc<ReviewWorkflow>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_publish_timeout(Duration::from_secs(5))
    }

    pub fn with_publish_timeout(publish_timeout: Duration) -> Self {
        let repo = Arc::new(MemoryStore::new());
        let binaries = Arc::new(MemoryAssetStore::new());
        let identity = Arc::new(FakeIdentityProvider::new());
        let platform = Arc::new(FakePlatform::new());
        let storage_timeout = Duration::from_secs(2);

        let credentials = Arc::new(CredentialManager::new(
            repo.clone(),
            identity.clone(),
            Arc::new(crypto_core::test_utils::test_issuer()),
            CredentialSettings {
                access_ttl: ChronoDuration::minutes(15),
                session_ttl: ChronoDuration::days(7),
                identity_timeout: Duration::from_secs(2),
                refresh_retry: RetryConfig {
                    max_retries: 2,
                    initial_backoff: Duration::from_millis(1),
                    max_backoff: Duration::from_millis(5),
                    backoff_multiplier: 2.0,
                    jitter: false,
                },
            },
        ));

        let pipeline = Arc::new(PublishingPipeline::new(
            binaries.clone(),
            platform.clone(),
            storage_timeout,
            publish_timeout,
        ));
        let workflow = Arc::new(ReviewWorkflow::new(
            repo.clone(),
            repo.clone(),
            repo.clone(),
            binaries.clone(),
            credentials.clone(),
            pipeline,
            storage_timeout,
        ));

        Self {
            repo,
            binaries,
            identity,
            platform,
            credentials,
            workflow,
        }
    }

    /// A second workflow over the same accounts, workspaces and binaries,
    /// reading assets through `assets` and publishing to `platform`
    pub fn workflow_with(
        &self,
        assets: Arc<dyn AssetRepository>,
        platform: Arc<dyn PublishingPlatform>,
    ) -> ReviewWorkflow {
        let storage_timeout = Duration::from_secs(2);
        let pipeline = Arc::new(PublishingPipeline::new(
            self.binaries.clone(),
            platform,
            storage_timeout,
            Duration::from_secs(5),
        ));
        ReviewWorkflow::new(
            self.repo.clone(),
            self.repo.clone(),
            assets,
            self.binaries.clone(),
            self.credentials.clone(),
            pipeline,
            storage_timeout,
        )
    }

    pub fn app_state(&self, max_upload_bytes: usize) -> AppState {
        AppState {
            credentials: self.credentials.clone(),
            workflow: self.workflow.clone(),
            store: self.binaries.clone(),
            http: HttpSettings {
                secure_cookies: false,
                frontend_url: "http://localhost:3000".into(),
                max_upload_bytes,
                storage_timeout: Duration::from_secs(2),
            },
        }
    }

    pub async fn sign_in(
        &self,
        email: &str,
        role: Role,
        delegated: Option<DelegatedCredential>,
    ) -> (Account, TokenPair) {
        self.credentials
            .authenticate(IdentityAssertion {
                email: email.to_string(),
                role,
                delegated,
            })
            .await
            .unwrap()
    }

    /// A producer holding a fresh delegated credential
    pub async fn producer(&self, email: &str) -> Account {
        let credential = fresh_credential("delegated-access", Some("delegated-refresh"));
        self.sign_in(email, Role::Producer, Some(credential)).await.0
    }

    pub async fn delegate(&self, email: &str) -> Account {
        self.sign_in(email, Role::Delegate, None).await.0
    }

    /// Backdate the stored delegated credential past its expiry
    pub async fn expire_delegated(&self, account_id: uuid::Uuid) {
        let account = self.repo.find_by_id(account_id).await.unwrap().unwrap();
        let mut credential = account.delegated.expect("account holds a delegated credential");
        credential.expires_at = Utc::now() - ChronoDuration::minutes(5);
        self.repo
            .store_delegated_credential(account_id, &credential)
            .await
            .unwrap();
    }

    pub async fn put_binary(&self, size: usize) -> String {
        self.binaries
            .put(
                Bytes::from(vec![1u8; size]),
                &BinaryMetadata {
                    content_type: "video/mp4".into(),
                    file_name: Some("clip.mp4".into()),
                },
            )
            .await
            .unwrap()
    }

    /// Producer, delegate, workspace and an asset already approved with
    /// delegate-supplied metadata
    pub async fn approved_asset(&self) -> Scenario {
        let producer = self.producer("producer@cutroom.test").await;
        let delegate = self.delegate("editor@cutroom.test").await;
        let workspace = self
            .workflow
            .create_workspace(producer.id, "Channel")
            .await
            .unwrap();

        let raw = self.put_binary(4096).await;
        let asset = self
            .workflow
            .submit_original(producer.id, workspace.id, &delegate.email, &raw)
            .await
            .unwrap();

        let edited = self.put_binary(2048).await;
        self.workflow
            .submit_edit(
                delegate.id,
                asset.id,
                &edited,
                EditMetadata {
                    title: Some("Episode 1".into()),
                    description: Some("The first cut".into()),
                    tags: vec!["vlog".into()],
                },
            )
            .await
            .unwrap();

        let asset = self
            .workflow
            .decide(producer.id, asset.id, Decision::Approve, None)
            .await
            .unwrap();

        Scenario {
            producer,
            delegate,
            workspace,
            asset,
        }
    }
}
