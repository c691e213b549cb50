/// Asset Store collaborator
///
/// Holds the raw and edited binaries. The service only ever keeps the opaque
/// reference returned by [`AssetStore::put`]; byte lifetime belongs to the
/// store.
use async_trait::async_trait;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::S3Config;

/// Presigned upload URLs expire after 15 minutes
const PRESIGNED_URL_EXPIRY_SECS: u64 = 900;

/// Chunk size used when the in-memory store replays a binary
const MEMORY_CHUNK_SIZE: usize = 64 * 1024;

const S3_SCHEME: &str = "s3://";
const MEMORY_SCHEME: &str = "memory://";

pub type ByteStream = BoxStream<'static, Result<Bytes, AssetStoreError>>;

#[derive(Debug, Error)]
pub enum AssetStoreError {
    /// The reference no longer resolves to a stored binary
    #[error("Binary not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),
}

/// Descriptive metadata stored with a binary
#[derive(Debug, Clone)]
pub struct BinaryMetadata {
    pub content_type: String,
    pub file_name: Option<String>,
}

impl BinaryMetadata {
    fn extension(&self) -> &str {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(char::is_alphanumeric))
            .unwrap_or("bin")
    }
}

/// A URL the client can `PUT` the binary to directly
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUpload {
    pub reference: String,
    pub upload_url: String,
    pub expires_in: u64,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn put(&self, binary: Bytes, metadata: &BinaryMetadata) -> Result<String, AssetStoreError>;

    async fn get_stream(&self, reference: &str) -> Result<ByteStream, AssetStoreError>;

    async fn delete(&self, reference: &str) -> Result<(), AssetStoreError>;

    /// Whether `reference` could have been issued by this store. Anything
    /// else is refused before it is recorded or deleted.
    fn owns(&self, reference: &str) -> bool;

    async fn presign_upload(
        &self,
        _metadata: &BinaryMetadata,
    ) -> Result<PresignedUpload, AssetStoreError> {
        Err(AssetStoreError::Unsupported("presigned uploads"))
    }
}

// ============================================================================
// S3
// ============================================================================

#[derive(Clone)]
pub struct S3AssetStore {
    client: Client,
    bucket: String,
    key_prefix: String,
}

impl S3AssetStore {
    pub fn new(client: Client, bucket: String, key_prefix: String) -> Self {
        Self {
            client,
            bucket,
            key_prefix: key_prefix.trim_matches('/').to_string(),
        }
    }

    /// Build the store from configuration, falling back to the default AWS
    /// credential chain when no static keys are given
    pub async fn from_config(config: &S3Config) -> Self {
        use aws_sdk_s3::config::{Credentials, Region};

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "review_service_s3",
            );
            loader = loader.credentials_provider(credentials);
        }

        // S3-compatible storage such as MinIO
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let shared = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();

        Self::new(
            Client::from_conf(s3_config),
            config.bucket.clone(),
            config.key_prefix.clone(),
        )
    }

    fn new_key(&self, metadata: &BinaryMetadata) -> String {
        let object = format!("{}.{}", Uuid::new_v4(), metadata.extension());
        if self.key_prefix.is_empty() {
            object
        } else {
            format!("{}/{}", self.key_prefix, object)
        }
    }

    fn reference_for(&self, key: &str) -> String {
        format!("{S3_SCHEME}{}/{key}", self.bucket)
    }

    fn parse_reference<'a>(&self, reference: &'a str) -> Result<&'a str, AssetStoreError> {
        object_key(&self.bucket, &self.key_prefix, reference)
            .ok_or_else(|| AssetStoreError::NotFound(reference.to_string()))
    }
}

/// Key of an `s3://bucket/key` reference, only when it names `bucket` and
/// sits under `prefix`
fn object_key<'a>(bucket: &str, prefix: &str, reference: &'a str) -> Option<&'a str> {
    let (ref_bucket, key) = reference.strip_prefix(S3_SCHEME)?.split_once('/')?;
    if ref_bucket != bucket || key.is_empty() || key.split('/').any(|part| part == "..") {
        return None;
    }
    if prefix.is_empty() {
        return Some(key);
    }
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|object| !object.is_empty())
        .map(|_| key)
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn put(&self, binary: Bytes, metadata: &BinaryMetadata) -> Result<String, AssetStoreError> {
        let key = self.new_key(metadata);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&metadata.content_type)
            .body(S3ByteStream::from(binary))
            .send()
            .await
            .map_err(|e| AssetStoreError::Backend(format!("put_object failed: {e}")))?;

        Ok(self.reference_for(&key))
    }

    async fn get_stream(&self, reference: &str) -> Result<ByteStream, AssetStoreError> {
        let key = self.parse_reference(reference)?;

        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.into_service_error() {
                GetObjectError::NoSuchKey(_) => AssetStoreError::NotFound(reference.to_string()),
                other => AssetStoreError::Backend(format!("get_object failed: {other}")),
            })?;

        let chunks = stream::try_unfold(output.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(AssetStoreError::Backend(format!("read failed: {e}"))),
            }
        });

        Ok(chunks.boxed())
    }

    async fn delete(&self, reference: &str) -> Result<(), AssetStoreError> {
        let key = self.parse_reference(reference)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AssetStoreError::Backend(format!("delete_object failed: {e}")))?;

        Ok(())
    }

    fn owns(&self, reference: &str) -> bool {
        self.parse_reference(reference).is_ok()
    }

    async fn presign_upload(
        &self,
        metadata: &BinaryMetadata,
    ) -> Result<PresignedUpload, AssetStoreError> {
        let key = self.new_key(metadata);
        let presigning_config =
            PresigningConfig::expires_in(Duration::from_secs(PRESIGNED_URL_EXPIRY_SECS))
                .map_err(|e| AssetStoreError::Backend(format!("presigning config: {e}")))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(&metadata.content_type)
            .presigned(presigning_config)
            .await
            .map_err(|e| AssetStoreError::Backend(format!("presign failed: {e}")))?;

        Ok(PresignedUpload {
            reference: self.reference_for(&key),
            upload_url: presigned.uri().to_string(),
            expires_in: PRESIGNED_URL_EXPIRY_SECS,
        })
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    objects: DashMap<String, Bytes>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.objects.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, binary: Bytes, _metadata: &BinaryMetadata) -> Result<String, AssetStoreError> {
        let reference = format!("{MEMORY_SCHEME}{}", Uuid::new_v4());
        self.objects.insert(reference.clone(), binary);
        Ok(reference)
    }

    async fn get_stream(&self, reference: &str) -> Result<ByteStream, AssetStoreError> {
        let binary = self
            .objects
            .get(reference)
            .map(|b| b.clone())
            .ok_or_else(|| AssetStoreError::NotFound(reference.to_string()))?;

        let chunks: Vec<Result<Bytes, AssetStoreError>> = binary
            .chunks(MEMORY_CHUNK_SIZE)
            .map(|chunk| Ok(binary.slice_ref(chunk)))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }

    async fn delete(&self, reference: &str) -> Result<(), AssetStoreError> {
        self.objects.remove(reference);
        Ok(())
    }

    fn owns(&self, reference: &str) -> bool {
        reference
            .strip_prefix(MEMORY_SCHEME)
            .is_some_and(|id| Uuid::parse_str(id).is_ok())
    }
}
