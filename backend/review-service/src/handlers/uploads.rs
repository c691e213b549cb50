/// Binary upload endpoints
///
/// Both return an Asset Store reference that the review endpoints accept as
/// `binary_ref` / `edited_ref`.
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use bytes::BytesMut;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ReviewError};
use crate::middleware::AccountId;
use crate::services::{AssetStoreError, BinaryMetadata};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub reference: String,
    pub size: usize,
    pub content_type: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PresignRequest {
    #[validate(length(min = 1, max = 255))]
    pub content_type: String,
    #[validate(length(max = 255))]
    pub file_name: Option<String>,
}

fn is_video(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .strip_prefix("video/")
        .is_some_and(|subtype| !subtype.is_empty())
}

fn store_error(err: AssetStoreError) -> ReviewError {
    match err {
        AssetStoreError::Unsupported(what) => {
            ReviewError::Validation(format!("{what} are not available on this deployment"))
        }
        other => ReviewError::UpstreamUnavailable(other.to_string()),
    }
}

/// Stream the first `video/*` part of a multipart body into the Asset Store
pub async fn upload_binary(
    state: web::Data<AppState>,
    account_id: AccountId,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let limit = state.http.max_upload_bytes;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ReviewError::Validation(format!("malformed upload: {e}")))?;

        let content_type = match field.content_type() {
            Some(mime) => mime.essence_str().to_string(),
            None => continue,
        };
        if !is_video(&content_type) {
            return Err(ReviewError::UnsupportedFormat(format!(
                "expected a video/* part, got {content_type}"
            )));
        }
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk =
                chunk.map_err(|e| ReviewError::Validation(format!("error reading upload: {e}")))?;
            if buffer.len() + chunk.len() > limit {
                return Err(ReviewError::PayloadTooLarge(limit));
            }
            buffer.extend_from_slice(&chunk);
        }

        let size = buffer.len();
        if size == 0 {
            return Err(ReviewError::Validation("upload is empty".to_string()));
        }

        let metadata = BinaryMetadata {
            content_type: content_type.clone(),
            file_name,
        };
        let reference = resilience::with_timeout(
            state.http.storage_timeout,
            state.store.put(buffer.freeze(), &metadata),
        )
        .await?
        .map_err(store_error)?;

        tracing::info!(account_id = %account_id.0, reference = %reference, size, "binary uploaded");
        return Ok(HttpResponse::Created().json(UploadResponse {
            reference,
            size,
            content_type,
        }));
    }

    Err(ReviewError::Validation("no video part in upload".to_string()))
}

/// Presigned URL for uploading a large binary straight to the Asset Store
pub async fn presigned_upload(
    state: web::Data<AppState>,
    account_id: AccountId,
    req: web::Json<PresignRequest>,
) -> Result<HttpResponse> {
    req.validate()?;
    if !is_video(&req.content_type) {
        return Err(ReviewError::UnsupportedFormat(format!(
            "expected video/*, got {}",
            req.content_type
        )));
    }

    let metadata = BinaryMetadata {
        content_type: req.content_type.trim().to_ascii_lowercase(),
        file_name: req.file_name.clone(),
    };
    let presigned = state
        .store
        .presign_upload(&metadata)
        .await
        .map_err(store_error)?;

    tracing::info!(account_id = %account_id.0, reference = %presigned.reference, "presigned upload issued");
    Ok(HttpResponse::Ok().json(presigned))
}
