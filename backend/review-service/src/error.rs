/// Error types for review-service
///
/// Every failure a caller can observe maps to one variant here, and every
/// variant renders as an `error_types::ErrorResponse` with a stable code.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};
use thiserror::Error;

use crate::models::{AssetStatus, ParseEnumError, TransitionRejected};

/// Result type for review-service operations
pub type Result<T> = std::result::Result<T, ReviewError>;

/// Seconds a client is asked to wait after a platform quota rejection
const QUOTA_RETRY_AFTER_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Access or session credential missing, malformed or expired
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// A cryptographically valid session token that is no longer the active one
    #[error("Session revoked: sign in again")]
    SessionRevoked,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No account exists for delegate {0}")]
    DelegateNotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Carries the identifier recorded by the earlier publish
    #[error("Asset already published as {0}")]
    AlreadyPublished(String),

    #[error("A publish attempt for this asset is already in flight")]
    PublishInProgress,

    #[error("No delegated publishing credential on file")]
    NotDelegated,

    #[error("Delegated publishing credential expired: {0}")]
    DelegationExpired(String),

    #[error("Asset binary unavailable: {0}")]
    AssetUnavailable(String),

    #[error("Publishing quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// The platform may hold the video; the publish claim stays until an
    /// operator reconciles it
    #[error("Publish outcome unknown: {0}")]
    PublishOutcomeUnknown(String),

    #[error("Upstream call timed out: {0}")]
    UpstreamTimeout(String),

    /// A collaborator could not be reached; safe to retry later
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Upload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReviewError {
    fn parts(&self) -> (&'static str, &'static str) {
        match self {
            ReviewError::Unauthenticated(_) => (kinds::AUTHENTICATION_ERROR, error_codes::UNAUTHENTICATED),
            ReviewError::SessionRevoked => (kinds::AUTHENTICATION_ERROR, error_codes::SESSION_REVOKED),
            ReviewError::AccountNotFound => (kinds::AUTHENTICATION_ERROR, error_codes::ACCOUNT_NOT_FOUND),
            ReviewError::Forbidden(_) => (kinds::AUTHORIZATION_ERROR, error_codes::FORBIDDEN),
            ReviewError::NotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::NOT_FOUND),
            ReviewError::DelegateNotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::DELEGATE_NOT_FOUND),
            ReviewError::InvalidTransition(_) => (kinds::CONFLICT_ERROR, error_codes::INVALID_TRANSITION),
            ReviewError::AlreadyPublished(_) => (kinds::CONFLICT_ERROR, error_codes::ALREADY_PUBLISHED),
            ReviewError::PublishInProgress => (kinds::CONFLICT_ERROR, error_codes::PUBLISH_IN_PROGRESS),
            ReviewError::NotDelegated => (kinds::PRECONDITION_ERROR, error_codes::NOT_DELEGATED),
            ReviewError::DelegationExpired(_) => (kinds::PRECONDITION_ERROR, error_codes::DELEGATION_EXPIRED),
            ReviewError::AssetUnavailable(_) => (kinds::UPSTREAM_ERROR, error_codes::ASSET_UNAVAILABLE),
            ReviewError::QuotaExceeded(_) => (kinds::RATE_LIMIT_ERROR, error_codes::QUOTA_EXCEEDED),
            ReviewError::PublishFailed(_) => (kinds::UPSTREAM_ERROR, error_codes::PUBLISH_FAILED),
            ReviewError::PublishOutcomeUnknown(_) => {
                (kinds::UPSTREAM_ERROR, error_codes::PUBLISH_OUTCOME_UNKNOWN)
            }
            ReviewError::UpstreamTimeout(_) => (kinds::UPSTREAM_ERROR, error_codes::UPSTREAM_TIMEOUT),
            ReviewError::UpstreamUnavailable(_) => (kinds::UPSTREAM_ERROR, error_codes::UPSTREAM_UNAVAILABLE),
            ReviewError::Validation(_) => (kinds::VALIDATION_ERROR, error_codes::VALIDATION_ERROR),
            ReviewError::PayloadTooLarge(_) => (kinds::VALIDATION_ERROR, error_codes::UPLOAD_TOO_LARGE),
            ReviewError::UnsupportedFormat(_) => (kinds::VALIDATION_ERROR, error_codes::UNSUPPORTED_FORMAT),
            ReviewError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
            ReviewError::Internal(_) => (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR),
        }
    }

    /// Message shown to clients; server-side details stay in the logs
    fn public_message(&self) -> String {
        match self {
            ReviewError::Database(_) | ReviewError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn invalid_transition(rejected: TransitionRejected) -> Self {
        ReviewError::InvalidTransition(rejected.to_string())
    }

    pub fn not_approved(status: AssetStatus) -> Self {
        ReviewError::InvalidTransition(format!(
            "asset must be approved before publishing (current status: {status})"
        ))
    }
}

impl ResponseError for ReviewError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReviewError::Unauthenticated(_)
            | ReviewError::SessionRevoked
            | ReviewError::AccountNotFound => StatusCode::UNAUTHORIZED,
            ReviewError::Forbidden(_) => StatusCode::FORBIDDEN,
            ReviewError::NotFound(_) | ReviewError::DelegateNotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::InvalidTransition(_)
            | ReviewError::AlreadyPublished(_)
            | ReviewError::PublishInProgress => StatusCode::CONFLICT,
            ReviewError::NotDelegated | ReviewError::DelegationExpired(_) => {
                StatusCode::PRECONDITION_FAILED
            }
            ReviewError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            ReviewError::AssetUnavailable(_)
            | ReviewError::PublishFailed(_)
            | ReviewError::PublishOutcomeUnknown(_) => StatusCode::BAD_GATEWAY,
            ReviewError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ReviewError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ReviewError::Validation(_) | ReviewError::UnsupportedFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            ReviewError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ReviewError::Database(_) | ReviewError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (error_type, code) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }

        let mut response = ErrorResponse::new(
            status.canonical_reason().unwrap_or("Error"),
            &self.public_message(),
            status.as_u16(),
            error_type,
            code,
        );
        if let ReviewError::AlreadyPublished(platform_id) = self {
            response = response.with_details(serde_json::json!({ "platform_id": platform_id }));
        }

        let mut builder = HttpResponse::build(status);
        if matches!(self, ReviewError::QuotaExceeded(_)) {
            builder.insert_header(("Retry-After", QUOTA_RETRY_AFTER_SECS.to_string()));
        }
        builder.json(response)
    }
}

impl From<sqlx::Error> for ReviewError {
    fn from(err: sqlx::Error) -> Self {
        ReviewError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ReviewError {
    fn from(err: validator::ValidationErrors) -> Self {
        ReviewError::Validation(err.to_string())
    }
}

impl From<crypto_core::JwtError> for ReviewError {
    fn from(err: crypto_core::JwtError) -> Self {
        match err {
            crypto_core::JwtError::Key(msg) | crypto_core::JwtError::Signing(msg) => {
                ReviewError::Internal(msg)
            }
            other => ReviewError::Unauthenticated(other.to_string()),
        }
    }
}

impl From<crypto_core::TokenCipherError> for ReviewError {
    fn from(err: crypto_core::TokenCipherError) -> Self {
        ReviewError::Internal(err.to_string())
    }
}

impl From<resilience::TimeoutError> for ReviewError {
    fn from(err: resilience::TimeoutError) -> Self {
        ReviewError::UpstreamTimeout(err.to_string())
    }
}

impl From<ParseEnumError> for ReviewError {
    fn from(err: ParseEnumError) -> Self {
        ReviewError::Database(err.to_string())
    }
}

impl From<TransitionRejected> for ReviewError {
    fn from(rejected: TransitionRejected) -> Self {
        ReviewError::invalid_transition(rejected)
    }
}
