/// Publishing Platform collaborator
///
/// Accepts a byte stream plus metadata under a delegated credential and
/// returns the platform-assigned identifier. Failures are split into quota
/// rejections, which clear up with time, definite rejections, and failures
/// after the bytes went out, where the video may exist anyway.
use async_trait::async_trait;
use reqwest::{header, Body, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::asset_store::ByteStream;
use crate::models::{DelegatedCredential, Visibility};

/// Reasons the platform uses for rate and quota rejections
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "uploadLimitExceeded",
    "dailyLimitExceeded",
];

/// "People & Blogs", the platform's default category
const DEFAULT_CATEGORY_ID: &str = "22";

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Quota or rate limit reached: {0}")]
    Quota(String),

    #[error("Platform rejected the upload: {0}")]
    Other(String),

    /// The upload was sent but its outcome could not be read
    #[error("Upload outcome unknown: {0}")]
    Ambiguous(String),
}

/// Metadata submitted with the binary
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub made_for_kids: bool,
}

#[async_trait]
pub trait PublishingPlatform: Send + Sync {
    async fn insert(
        &self,
        binary: ByteStream,
        metadata: &PlatformMetadata,
        credential: &DelegatedCredential,
    ) -> Result<String, PlatformError>;
}

// ============================================================================
// YouTube
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource<'a> {
    snippet: Snippet<'a>,
    status: VideoStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snippet<'a> {
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    category_id: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus {
    privacy_status: &'static str,
    self_declared_made_for_kids: bool,
}

#[derive(Debug, Deserialize)]
struct InsertedVideo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

/// Resumable upload against the YouTube Data API
#[derive(Clone)]
pub struct YouTubePlatform {
    http_client: Client,
    upload_base: String,
}

impl YouTubePlatform {
    pub fn new(upload_base: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Turn a non-success response into a classified error
    async fn classify(response: Response) -> PlatformError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_rejection(status, &body)
    }

    async fn open_session(
        &self,
        metadata: &PlatformMetadata,
        credential: &DelegatedCredential,
    ) -> Result<String, PlatformError> {
        let resource = VideoResource {
            snippet: Snippet {
                title: &metadata.title,
                description: &metadata.description,
                tags: &metadata.tags,
                category_id: DEFAULT_CATEGORY_ID,
            },
            status: VideoStatus {
                privacy_status: metadata.visibility.as_str(),
                self_declared_made_for_kids: metadata.made_for_kids,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/upload/youtube/v3/videos", self.upload_base))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&credential.access_token)
            .header("X-Upload-Content-Type", "video/*")
            .json(&resource)
            .send()
            .await
            .map_err(|e| PlatformError::Other(format!("session request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::classify(response).await);
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Other("upload session has no Location header".into()))
    }
}

#[async_trait]
impl PublishingPlatform for YouTubePlatform {
    async fn insert(
        &self,
        binary: ByteStream,
        metadata: &PlatformMetadata,
        credential: &DelegatedCredential,
    ) -> Result<String, PlatformError> {
        let session_url = self.open_session(metadata, credential).await?;

        let response = self
            .http_client
            .put(&session_url)
            .bearer_auth(&credential.access_token)
            .header(header::CONTENT_TYPE, "video/*")
            .body(Body::wrap_stream(binary))
            .send()
            .await
            .map_err(|e| PlatformError::Ambiguous(format!("upload interrupted: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PlatformError::Ambiguous(format!("upload response unreadable: {e}")))?;

        let platform_id = parse_upload_response(status, &body)?;
        tracing::debug!(platform_id = %platform_id, "platform accepted upload");
        Ok(platform_id)
    }
}

/// Read the final upload response. Only an explicit 4xx rejection proves no
/// video was created; a server error or an unreadable success leaves the
/// outcome open.
pub fn parse_upload_response(status: StatusCode, body: &str) -> Result<String, PlatformError> {
    if status.is_success() {
        return serde_json::from_str::<InsertedVideo>(body)
            .map(|inserted| inserted.id)
            .map_err(|e| PlatformError::Ambiguous(format!("unexpected upload response: {e}")));
    }
    if status.is_client_error() {
        return Err(classify_rejection(status, body));
    }
    Err(PlatformError::Ambiguous(format!("upload ended with HTTP {status}")))
}

/// Quota if the status is 429, or a 403 whose reasons name a quota/rate limit
pub fn classify_rejection(status: StatusCode, body: &str) -> PlatformError {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {status}"));

    let quota_reason = parsed.as_ref().and_then(|e| {
        e.error
            .errors
            .iter()
            .find(|item| QUOTA_REASONS.contains(&item.reason.as_str()))
            .map(|item| item.reason.clone())
    });

    match (status, quota_reason) {
        (StatusCode::TOO_MANY_REQUESTS, reason) => {
            PlatformError::Quota(reason.unwrap_or(message))
        }
        (StatusCode::FORBIDDEN, Some(reason)) => PlatformError::Quota(reason),
        _ => PlatformError::Other(message),
    }
}
