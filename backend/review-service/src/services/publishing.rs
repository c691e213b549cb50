//! Publishing Pipeline
//!
//! Moves an approved asset's bytes from the Asset Store to the Publishing
//! Platform. The pipeline never writes state; the orchestrating `publish`
//! transition commits (or releases) based on how it fails.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use super::asset_store::{AssetStore, AssetStoreError};
use super::platform::{PlatformError, PlatformMetadata, PublishingPlatform};
use crate::error::ReviewError;
use crate::models::{Asset, DelegatedCredential, Visibility};

pub const DEFAULT_TITLE: &str = "Untitled Video";
pub const DEFAULT_DESCRIPTION: &str = "Uploaded via Cutroom";
pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;

/// Caller-supplied overrides for publish metadata
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PublishOptions {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub visibility: Option<Visibility>,
    /// Audience flag: whether the video is made for kids
    pub made_for_kids: Option<bool>,
}

impl PublishOptions {
    /// Fill every field: caller override, then the delegate's metadata,
    /// then the defaults. Text is cut to the platform's character limits.
    pub fn resolve(&self, asset: &Asset) -> PlatformMetadata {
        fn pick(
            explicit: &Option<String>,
            fallback: &Option<String>,
            default: &str,
            max_chars: usize,
        ) -> String {
            let value = [explicit, fallback]
                .into_iter()
                .filter_map(|value| value.as_deref().map(str::trim))
                .find(|value| !value.is_empty())
                .unwrap_or(default);
            match value.char_indices().nth(max_chars) {
                Some((end, _)) => value[..end].trim_end().to_string(),
                None => value.to_string(),
            }
        }

        PlatformMetadata {
            title: pick(&self.title, &asset.title, DEFAULT_TITLE, MAX_TITLE_CHARS),
            description: pick(
                &self.description,
                &asset.description,
                DEFAULT_DESCRIPTION,
                MAX_DESCRIPTION_CHARS,
            ),
            tags: self.tags.clone().unwrap_or_else(|| asset.tags.clone()),
            visibility: self.visibility.unwrap_or_default(),
            made_for_kids: self.made_for_kids.unwrap_or(false),
        }
    }
}

/// How a failed run left the platform
#[derive(Debug)]
pub enum PublishFailure {
    /// Definitely nothing was created on the platform
    NotPublished(ReviewError),
    /// The platform may or may not have accepted the upload
    OutcomeUnknown(ReviewError),
}

pub struct PublishingPipeline {
    store: Arc<dyn AssetStore>,
    platform: Arc<dyn PublishingPlatform>,
    storage_timeout: Duration,
    publish_timeout: Duration,
}

impl PublishingPipeline {
    pub fn new(
        store: Arc<dyn AssetStore>,
        platform: Arc<dyn PublishingPlatform>,
        storage_timeout: Duration,
        publish_timeout: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            storage_timeout,
            publish_timeout,
        }
    }

    /// Stream the asset's preferred binary to the platform and return the
    /// identifier it assigned
    pub async fn publish_asset(
        &self,
        asset: &Asset,
        credential: &DelegatedCredential,
        metadata: &PlatformMetadata,
    ) -> Result<String, PublishFailure> {
        let source = asset.source_ref();

        let binary = resilience::with_timeout(self.storage_timeout, self.store.get_stream(source))
            .await
            .map_err(|e| PublishFailure::NotPublished(e.into()))?
            .map_err(|e| match e {
                AssetStoreError::NotFound(reference) => PublishFailure::NotPublished(
                    ReviewError::AssetUnavailable(format!("{reference} no longer resolves")),
                ),
                other => PublishFailure::NotPublished(ReviewError::AssetUnavailable(other.to_string())),
            })?;

        tracing::info!(asset_id = %asset.id, source, title = %metadata.title, "streaming asset to platform");

        match resilience::with_timeout(
            self.publish_timeout,
            self.platform.insert(binary, metadata, credential),
        )
        .await
        {
            Ok(Ok(platform_id)) => Ok(platform_id),
            Ok(Err(PlatformError::Quota(reason))) => {
                Err(PublishFailure::NotPublished(ReviewError::QuotaExceeded(reason)))
            }
            Ok(Err(PlatformError::Other(reason))) => {
                Err(PublishFailure::NotPublished(ReviewError::PublishFailed(reason)))
            }
            Ok(Err(PlatformError::Ambiguous(reason))) => Err(PublishFailure::OutcomeUnknown(
                ReviewError::PublishOutcomeUnknown(reason),
            )),
            Err(elapsed) => Err(PublishFailure::OutcomeUnknown(elapsed.into())),
        }
    }
}
