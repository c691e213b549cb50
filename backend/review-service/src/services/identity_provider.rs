//! Identity Provider collaborator
//!
//! The OAuth consent flow that yields a verified email and, for producers, a
//! refreshable delegated credential for the publishing platform.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use resilience::TimeoutError;
use serde::Deserialize;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{DelegatedCredential, Role};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const IDENTITY_SCOPES: &str = "openid email";
const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";

/// How long a consent `state` stays redeemable
const STATE_TTL: std::time::Duration = std::time::Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum IdentityProviderError {
    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Code exchange failed: {0}")]
    Exchange(String),

    #[error("Failed to fetch user info: {0}")]
    UserInfo(String),

    /// The provider refused the refresh token; only a new consent fixes this
    #[error("Refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl IdentityProviderError {
    /// Whether repeating the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IdentityProviderError::Network(_) | IdentityProviderError::Timeout(_)
        )
    }
}

/// What a completed consent hands back
#[derive(Debug, Clone)]
pub struct ConsentOutcome {
    pub email: String,
    pub delegated: Option<DelegatedCredential>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL the browser is redirected to for consent
    fn begin_consent(&self, role: Role, state: &str) -> String;

    async fn complete_consent(
        &self,
        code: &str,
        role: Role,
    ) -> Result<ConsentOutcome, IdentityProviderError>;

    /// Exchange a refresh token for a new access token. The returned
    /// credential's `refresh_token` is `None` when the provider kept the old one.
    async fn refresh_delegated(
        &self,
        refresh_token: &str,
    ) -> Result<DelegatedCredential, IdentityProviderError>;
}

// ============================================================================
// OAuth state
// ============================================================================

/// One-time consent `state` tokens bound to the role they were issued for
#[derive(Debug, Default)]
pub struct OAuthStateStore {
    states: DashMap<String, (Role, Instant)>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, role: Role) -> String {
        self.states.retain(|_, (_, issued)| issued.elapsed() < STATE_TTL);

        let state = Uuid::new_v4().simple().to_string();
        self.states.insert(state.clone(), (role, Instant::now()));
        state
    }

    /// Redeem a state; a state can be redeemed once
    pub fn consume(&self, state: &str) -> Result<Role, IdentityProviderError> {
        match self.states.remove(state) {
            Some((_, (role, issued))) if issued.elapsed() < STATE_TTL => Ok(role),
            _ => Err(IdentityProviderError::InvalidState),
        }
    }
}

// ============================================================================
// Google
// ============================================================================

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    email: String,
    #[serde(default)]
    email_verified: bool,
}

impl GoogleTokenResponse {
    fn into_credential(self) -> DelegatedCredential {
        DelegatedCredential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            scope: self.scope,
            expires_at: Utc::now() + Duration::seconds(self.expires_in.max(0)),
        }
    }
}

#[derive(Clone)]
pub struct GoogleIdentityProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    http_client: Client,
}

impl GoogleIdentityProvider {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            http_client: Client::new(),
        }
    }

    fn scopes_for(role: Role) -> String {
        match role {
            Role::Producer => format!("{IDENTITY_SCOPES} {UPLOAD_SCOPE}"),
            Role::Delegate => IDENTITY_SCOPES.to_string(),
        }
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<GoogleTokenResponse, (StatusCode, String)> {
        let response = self
            .http_client
            .post(GOOGLE_TOKEN_URL)
            .form(form)
            .send()
            .await
            .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<GoogleTokenError>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {description}", e.error),
                    None => e.error,
                })
                .unwrap_or(body);
            return Err((status, reason));
        }

        response
            .json::<GoogleTokenResponse>()
            .await
            .map_err(|e| (StatusCode::BAD_GATEWAY, format!("JSON parse error: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn begin_consent(&self, role: Role, state: &str) -> String {
        let mut url = format!(
            "{GOOGLE_AUTH_URL}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&Self::scopes_for(role)),
            urlencoding::encode(state),
        );
        if role == Role::Producer {
            // Offline access is what yields a refresh token
            url.push_str("&access_type=offline&prompt=consent&include_granted_scopes=true");
        }
        url
    }

    async fn complete_consent(
        &self,
        code: &str,
        role: Role,
    ) -> Result<ConsentOutcome, IdentityProviderError> {
        let tokens = self
            .token_request(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await
            .map_err(|(status, reason)| {
                if status.is_server_error() {
                    IdentityProviderError::Network(reason)
                } else {
                    IdentityProviderError::Exchange(reason)
                }
            })?;

        let user_info = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(&tokens.access_token)
            .send()
            .await
            .map_err(|e| IdentityProviderError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| IdentityProviderError::UserInfo(e.to_string()))?
            .json::<GoogleUserInfo>()
            .await
            .map_err(|e| IdentityProviderError::UserInfo(format!("JSON parse error: {e}")))?;

        if !user_info.email_verified {
            return Err(IdentityProviderError::UserInfo(
                "email address is not verified".to_string(),
            ));
        }

        let delegated = match role {
            Role::Producer => Some(tokens.into_credential()),
            Role::Delegate => None,
        };

        Ok(ConsentOutcome {
            email: user_info.email,
            delegated,
        })
    }

    async fn refresh_delegated(
        &self,
        refresh_token: &str,
    ) -> Result<DelegatedCredential, IdentityProviderError> {
        let tokens = self
            .token_request(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await
            .map_err(|(status, reason)| {
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    IdentityProviderError::Network(reason)
                } else {
                    IdentityProviderError::RefreshRejected(reason)
                }
            })?;

        Ok(tokens.into_credential())
    }
}
