/// Data models for review-service
pub mod account;
pub mod asset;
pub mod workspace;

pub use account::{Account, AccountView, DelegatedCredential, Role};
pub use asset::{
    Asset, AssetStatus, Decision, EditMetadata, FeedbackUpdate, NewAsset, PublishRecord,
    ReviewEvent, TransitionRejected, Visibility,
};
pub use workspace::{Delegation, DelegationStatus, Workspace};

/// Error returned when a stored enum column holds an unknown value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Lowercase and trim an email so lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
