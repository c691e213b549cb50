//! Shared JSON error envelope for the review backend.
//!
//! Every HTTP error body has the same shape so clients can branch on
//! `error_type` (coarse routing) and `code` (precise, stable identifier).

use serde::{Deserialize, Serialize};

/// Unified API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP reason phrase, e.g. "Conflict"
    pub error: String,

    /// Human-readable explanation
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Coarse category, one of [`error_types`]
    pub error_type: String,

    /// Stable machine-readable code, one of [`error_codes`]
    pub code: String,

    /// Structured extra data the client can act on (e.g. the recorded
    /// platform identifier for an already-published asset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

pub mod error_codes {
    // Authentication
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const SESSION_REVOKED: &str = "SESSION_REVOKED";
    pub const ACCOUNT_NOT_FOUND: &str = "ACCOUNT_NOT_FOUND";

    // Authorization
    pub const FORBIDDEN: &str = "FORBIDDEN";

    // Review workflow
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const DELEGATE_NOT_FOUND: &str = "DELEGATE_NOT_FOUND";
    pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";

    // Publishing
    pub const ALREADY_PUBLISHED: &str = "ALREADY_PUBLISHED";
    pub const PUBLISH_IN_PROGRESS: &str = "PUBLISH_IN_PROGRESS";
    pub const NOT_DELEGATED: &str = "NOT_DELEGATED";
    pub const DELEGATION_EXPIRED: &str = "DELEGATION_EXPIRED";
    pub const ASSET_UNAVAILABLE: &str = "ASSET_UNAVAILABLE";
    pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";
    pub const PUBLISH_FAILED: &str = "PUBLISH_FAILED";
    pub const PUBLISH_OUTCOME_UNKNOWN: &str = "PUBLISH_OUTCOME_UNKNOWN";
    pub const UPSTREAM_TIMEOUT: &str = "UPSTREAM_TIMEOUT";
    pub const UPSTREAM_UNAVAILABLE: &str = "UPSTREAM_UNAVAILABLE";

    // Uploads
    pub const UPLOAD_TOO_LARGE: &str = "UPLOAD_TOO_LARGE";
    pub const UNSUPPORTED_FORMAT: &str = "UNSUPPORTED_FORMAT";

    // Database/System
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const PRECONDITION_ERROR: &str = "precondition_error";
    pub const RATE_LIMIT_ERROR: &str = "rate_limit_error";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const SERVER_ERROR: &str = "server_error";
}
