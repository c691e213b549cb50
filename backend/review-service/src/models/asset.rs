use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

// ============================================================================
// Review status
// ============================================================================

/// Review status of an asset
///
/// Publication is not a status: it is recorded separately on
/// [`Asset::publication`] and only ever happens from `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Pending,
    ReviewReady,
    ChangesRequested,
    Approved,
}

/// Inputs that drive the review state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewEvent {
    EditSubmitted,
    Approved,
    ChangesRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event:?} to an asset in {from} status")]
pub struct TransitionRejected {
    pub from: AssetStatus,
    pub event: ReviewEvent,
}

impl AssetStatus {
    pub const ALL: [AssetStatus; 4] = [
        AssetStatus::Pending,
        AssetStatus::ReviewReady,
        AssetStatus::ChangesRequested,
        AssetStatus::Approved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Pending => "pending",
            AssetStatus::ReviewReady => "review_ready",
            AssetStatus::ChangesRequested => "changes_requested",
            AssetStatus::Approved => "approved",
        }
    }

    /// The complete transition table
    ///
    /// | from \ event        | EditSubmitted | Approved | ChangesRequested  |
    /// |---------------------|---------------|----------|-------------------|
    /// | `pending`           | review_ready  | approved | changes_requested |
    /// | `review_ready`      | review_ready  | approved | changes_requested |
    /// | `changes_requested` | review_ready  | -        | -                 |
    /// | `approved`          | -             | -        | -                 |
    pub fn apply(self, event: ReviewEvent) -> Result<AssetStatus, TransitionRejected> {
        use AssetStatus::*;

        match (self, event) {
            (Pending | ReviewReady | ChangesRequested, ReviewEvent::EditSubmitted) => {
                Ok(ReviewReady)
            }
            (Pending | ReviewReady, ReviewEvent::Approved) => Ok(Approved),
            (Pending | ReviewReady, ReviewEvent::ChangesRequested) => Ok(ChangesRequested),
            (from, event) => Err(TransitionRejected { from, event }),
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AssetStatus::Pending),
            "review_ready" => Ok(AssetStatus::ReviewReady),
            "changes_requested" => Ok(AssetStatus::ChangesRequested),
            "approved" => Ok(AssetStatus::Approved),
            _ => Err(ParseEnumError::new("asset status", s)),
        }
    }
}

/// A producer's verdict on a submitted asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    RequestChanges,
}

impl Decision {
    pub fn event(&self) -> ReviewEvent {
        match self {
            Decision::Approve => ReviewEvent::Approved,
            Decision::RequestChanges => ReviewEvent::ChangesRequested,
        }
    }
}

// ============================================================================
// Publication
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "unlisted" => Ok(Visibility::Unlisted),
            "private" => Ok(Visibility::Private),
            _ => Err(ParseEnumError::new("visibility", s)),
        }
    }
}

/// What was actually sent to the platform, recorded in one write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub platform_id: String,
    pub title: String,
    pub description: String,
    pub visibility: Visibility,
    pub made_for_kids: bool,
    pub published_at: DateTime<Utc>,
}

// ============================================================================
// Asset
// ============================================================================

/// Title/description/tags supplied alongside an edited binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Feedback overwrite applied together with a decision
#[derive(Debug, Clone)]
pub struct FeedbackUpdate {
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAsset {
    pub workspace_id: Uuid,
    pub uploaded_by: Uuid,
    pub assigned_to: Uuid,
    pub original_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub uploaded_by: Uuid,
    pub assigned_to: Uuid,
    pub original_ref: String,
    pub edited_ref: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub status: AssetStatus,
    pub feedback: Option<String>,
    pub feedback_at: Option<DateTime<Utc>>,
    pub publication: Option<PublishRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn is_published(&self) -> bool {
        self.publication.is_some()
    }

    pub fn platform_id(&self) -> Option<&str> {
        self.publication.as_ref().map(|p| p.platform_id.as_str())
    }

    /// Binary to publish: the edited cut when one exists
    pub fn source_ref(&self) -> &str {
        self.edited_ref.as_deref().unwrap_or(&self.original_ref)
    }
}
