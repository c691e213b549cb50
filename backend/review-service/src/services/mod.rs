/// Business logic layer for review-service
///
/// - `credentials`: sign-in, session rotation, delegated credential refresh
/// - `lifecycle`: the asset review state machine and publish orchestration
/// - `publishing`: moving approved bytes from the Asset Store to the platform
/// - `asset_store`, `identity_provider`, `platform`: collaborator adapters
pub mod asset_store;
pub mod credentials;
pub mod identity_provider;
pub mod lifecycle;
pub mod platform;
pub mod publishing;

pub use asset_store::{
    AssetStore, AssetStoreError, BinaryMetadata, ByteStream, MemoryAssetStore, PresignedUpload,
    S3AssetStore,
};
pub use credentials::{
    CredentialManager, CredentialSettings, IdentityAssertion, TokenPair, TokenPairResponse,
};
pub use identity_provider::{
    ConsentOutcome, GoogleIdentityProvider, IdentityProvider, IdentityProviderError,
};
pub use lifecycle::ReviewWorkflow;
pub use platform::{PlatformError, PlatformMetadata, PublishingPlatform, YouTubePlatform};
pub use publishing::{PublishFailure, PublishOptions, PublishingPipeline};
