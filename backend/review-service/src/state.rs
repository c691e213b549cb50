use anyhow::{Context, Result};
use crypto_core::{TokenCipher, TokenIssuer};
use resilience::RetryConfig;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, StorageBackend};
use crate::db::{
    AccountRepository, AssetRepository, PgAccountRepository, PgAssetRepository,
    PgWorkspaceRepository, WorkspaceRepository,
};
use crate::services::{
    AssetStore, CredentialManager, CredentialSettings, GoogleIdentityProvider, MemoryAssetStore,
    PublishingPipeline, ReviewWorkflow, S3AssetStore, YouTubePlatform,
};

/// Shared handles passed to every handler through `web::Data`
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<CredentialManager>,
    pub workflow: Arc<ReviewWorkflow>,
    pub store: Arc<dyn AssetStore>,
    pub http: HttpSettings,
}

/// The slice of configuration the HTTP layer needs
#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub secure_cookies: bool,
    pub frontend_url: String,
    pub max_upload_bytes: usize,
    pub storage_timeout: Duration,
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secure_cookies: config.secure_cookies(),
            frontend_url: config.app.frontend_url.clone(),
            max_upload_bytes: config.storage.max_upload_bytes,
            storage_timeout: config.timeouts.storage(),
        }
    }
}

impl AppState {
    /// Wire the Postgres repositories and the production collaborators
    pub async fn build(config: &Config, pool: PgPool) -> Result<Self> {
        let cipher = TokenCipher::from_base64_key(&config.auth.token_encryption_key)
            .context("Invalid TOKEN_ENCRYPTION_KEY")?;
        let issuer = TokenIssuer::from_pem(
            &config.auth.jwt_private_key_pem,
            &config.auth.jwt_public_key_pem,
        )
        .context("Invalid JWT key pair")?;

        let accounts: Arc<dyn AccountRepository> =
            Arc::new(PgAccountRepository::new(pool.clone(), Arc::new(cipher)));
        let workspaces: Arc<dyn WorkspaceRepository> =
            Arc::new(PgWorkspaceRepository::new(pool.clone()));
        let assets: Arc<dyn AssetRepository> = Arc::new(PgAssetRepository::new(pool));

        let store: Arc<dyn AssetStore> = match config.storage.backend {
            StorageBackend::S3 => Arc::new(S3AssetStore::from_config(&config.storage.s3).await),
            StorageBackend::Memory => {
                tracing::warn!("using the in-memory asset store; binaries are lost on restart");
                Arc::new(MemoryAssetStore::new())
            }
        };

        let identity = Arc::new(GoogleIdentityProvider::new(
            config.google.client_id.clone(),
            config.google.client_secret.clone(),
            config.google.redirect_uri.clone(),
        ));
        let platform = Arc::new(YouTubePlatform::new(config.publishing.upload_base.clone()));

        let credentials = Arc::new(CredentialManager::new(
            accounts.clone(),
            identity,
            Arc::new(issuer),
            CredentialSettings {
                access_ttl: chrono::Duration::seconds(config.auth.access_token_ttl_secs),
                session_ttl: chrono::Duration::seconds(config.auth.session_token_ttl_secs),
                identity_timeout: config.timeouts.identity(),
                refresh_retry: RetryConfig::default(),
            },
        ));

        let pipeline = Arc::new(PublishingPipeline::new(
            store.clone(),
            platform,
            config.timeouts.storage(),
            config.timeouts.publish(),
        ));
        let workflow = Arc::new(ReviewWorkflow::new(
            accounts,
            workspaces,
            assets,
            store.clone(),
            credentials.clone(),
            pipeline,
            config.timeouts.storage(),
        ));

        Ok(Self {
            credentials,
            workflow,
            store,
            http: HttpSettings::from_config(config),
        })
    }
}
