//! Credential Manager
//!
//! Issues, verifies and rotates the access/session token pair, and keeps the
//! producer's delegated publishing credential usable.
//!
//! ## Session rotation
//!
//! Each account has at most one live session token. Only its SHA-256
//! fingerprint is persisted. [`CredentialManager::rotate`] swaps the stored
//! fingerprint with a conditional write keyed on the presented one, so of two
//! concurrent rotations with the same token exactly one wins and the other
//! sees [`ReviewError::SessionRevoked`]. A token that has already been
//! rotated away can never be replayed.
//!
//! ## Delegated refresh
//!
//! Refreshes are serialized per account: the second caller waits for the
//! first, re-reads the stored bundle and finds it fresh.

use chrono::{DateTime, Duration, Utc};
use crypto_core::{hash::sha256_hex, IssuedToken, TokenIssuer, TokenKind};
use dashmap::DashMap;
use resilience::{with_retry, with_timeout_result, RetryConfig};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::identity_provider::{IdentityProvider, IdentityProviderError, OAuthStateStore};
use crate::db::AccountRepository;
use crate::error::{Result, ReviewError};
use crate::metrics;
use crate::models::{normalize_email, Account, DelegatedCredential, Role};

/// Lifetimes and call bounds for the credential manager
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub access_ttl: Duration,
    pub session_ttl: Duration,
    pub identity_timeout: std::time::Duration,
    pub refresh_retry: RetryConfig,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            session_ttl: Duration::days(7),
            identity_timeout: std::time::Duration::from_secs(10),
            refresh_retry: RetryConfig::default(),
        }
    }
}

/// A verified identity handed back by the consent flow
#[derive(Debug, Clone)]
pub struct IdentityAssertion {
    pub email: String,
    pub role: Role,
    pub delegated: Option<DelegatedCredential>,
}

/// Freshly issued access and session tokens
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub session: IssuedToken,
}

/// Body returned to clients alongside the cookies
#[derive(Debug, Clone, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub session_expires_at: DateTime<Utc>,
}

impl From<&TokenPair> for TokenPairResponse {
    fn from(pair: &TokenPair) -> Self {
        Self {
            access_token: pair.access.token.clone(),
            token_type: "Bearer",
            expires_in: pair.access.expires_in(),
            session_expires_at: pair.session.expires_at,
        }
    }
}

pub struct CredentialManager {
    accounts: Arc<dyn AccountRepository>,
    identity: Arc<dyn IdentityProvider>,
    issuer: Arc<TokenIssuer>,
    states: OAuthStateStore,
    refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    settings: CredentialSettings,
}

impl CredentialManager {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        identity: Arc<dyn IdentityProvider>,
        issuer: Arc<TokenIssuer>,
        settings: CredentialSettings,
    ) -> Self {
        Self {
            accounts,
            identity,
            issuer,
            states: OAuthStateStore::new(),
            refresh_locks: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &CredentialSettings {
        &self.settings
    }

    // ========================================================================
    // Sign-in
    // ========================================================================

    /// Start the consent flow for `role`; returns the redirect URL
    pub fn begin_consent(&self, role: Role) -> String {
        let state = self.states.issue(role);
        self.identity.begin_consent(role, &state)
    }

    /// Finish the consent flow and sign the account in
    pub async fn complete_consent(&self, code: &str, state: &str) -> Result<(Account, TokenPair)> {
        let role = self
            .states
            .consume(state)
            .map_err(|_| ReviewError::Unauthenticated("invalid or expired sign-in state".into()))?;

        let outcome = with_timeout_result(
            self.settings.identity_timeout,
            self.identity.complete_consent(code, role),
        )
        .await
        .map_err(consent_error)?;

        self.authenticate(IdentityAssertion {
            email: outcome.email,
            role,
            delegated: outcome.delegated,
        })
        .await
    }

    /// Upsert the account and start a fresh session, replacing any prior one
    pub async fn authenticate(&self, assertion: IdentityAssertion) -> Result<(Account, TokenPair)> {
        let email = normalize_email(&assertion.email);
        if email.is_empty() {
            return Err(ReviewError::Unauthenticated("identity has no email".into()));
        }

        let mut account = self.accounts.upsert(&email, assertion.role).await?;
        if account.role != assertion.role {
            tracing::info!(
                account_id = %account.id,
                stored_role = %account.role,
                asserted_role = %assertion.role,
                "sign-in with a different role; keeping the role fixed at creation"
            );
        }

        if let Some(mut bundle) = assertion.delegated {
            if assertion.role == Role::Producer && account.role == Role::Producer {
                if bundle.refresh_token.is_none() {
                    bundle.refresh_token = account
                        .delegated
                        .as_ref()
                        .and_then(|previous| previous.refresh_token.clone());
                }
                self.accounts
                    .store_delegated_credential(account.id, &bundle)
                    .await?;
                account.delegated = Some(bundle);
            }
        }

        let pair = self.issue_pair(&account)?;
        let fingerprint = sha256_hex(pair.session.token.as_bytes());
        self.accounts
            .replace_session(account.id, &fingerprint, pair.session.issued_at)
            .await?;
        account.session_fingerprint = Some(fingerprint);
        account.session_issued_at = Some(pair.session.issued_at);

        tracing::info!(account_id = %account.id, role = %account.role, "account signed in");
        Ok((account, pair))
    }

    // ========================================================================
    // Access and session tokens
    // ========================================================================

    /// Resolve an access token to the account it was issued for
    pub async fn verify_access(&self, token: Option<&str>) -> Result<Uuid> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ReviewError::Unauthenticated("missing access token".into()))?;

        let claims = self.issuer.validate(token, TokenKind::Access)?;
        let account_id = claims.subject()?;

        match self.accounts.find_by_id(account_id).await? {
            Some(_) => Ok(account_id),
            None => Err(ReviewError::AccountNotFound),
        }
    }

    /// Exchange the current session token for a new pair
    pub async fn rotate(&self, token: Option<&str>) -> Result<(Account, TokenPair)> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ReviewError::Unauthenticated("missing session token".into()))?;

        let claims = self.issuer.validate(token, TokenKind::Session).map_err(|e| {
            metrics::record_session_rotation("invalid");
            ReviewError::from(e)
        })?;
        let account_id = claims.subject()?;

        let mut account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .ok_or(ReviewError::AccountNotFound)?;

        let presented = sha256_hex(token.as_bytes());
        if account.session_fingerprint.as_deref() != Some(presented.as_str()) {
            return Err(self.stale_session(account_id));
        }

        let pair = self.issue_pair(&account)?;
        let fingerprint = sha256_hex(pair.session.token.as_bytes());
        let swapped = self
            .accounts
            .rotate_session(account_id, &presented, &fingerprint, pair.session.issued_at)
            .await?;

        if !swapped {
            // Lost the race against a concurrent rotation or logout
            return Err(self.stale_session(account_id));
        }

        metrics::record_session_rotation("rotated");
        account.session_fingerprint = Some(fingerprint);
        account.session_issued_at = Some(pair.session.issued_at);
        Ok((account, pair))
    }

    /// The account behind a verified access token
    pub async fn account(&self, account_id: Uuid) -> Result<Account> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(ReviewError::AccountNotFound)
    }

    /// Clear the stored session; idempotent
    pub async fn invalidate(&self, account_id: Uuid) -> Result<()> {
        self.accounts.clear_session(account_id).await?;
        tracing::info!(account_id = %account_id, "session invalidated");
        Ok(())
    }

    fn stale_session(&self, account_id: Uuid) -> ReviewError {
        tracing::warn!(
            account_id = %account_id,
            "stale session token presented; possible replay"
        );
        metrics::record_session_rotation("revoked");
        ReviewError::SessionRevoked
    }

    fn issue_pair(&self, account: &Account) -> Result<TokenPair> {
        let role = account.role.as_str();
        let access = self.issuer.issue(
            TokenKind::Access,
            account.id,
            &account.email,
            role,
            self.settings.access_ttl,
        )?;
        let session = self.issuer.issue(
            TokenKind::Session,
            account.id,
            &account.email,
            role,
            self.settings.session_ttl,
        )?;

        Ok(TokenPair { access, session })
    }

    // ========================================================================
    // Delegated credential
    // ========================================================================

    /// A delegated credential valid for at least the expiry skew, refreshing
    /// the stored one if it has lapsed
    pub async fn resolve_publishing_credential(&self, account_id: Uuid) -> Result<DelegatedCredential> {
        let bundle = self.stored_bundle(account_id).await?;
        if !bundle.is_expired() {
            return Ok(bundle);
        }

        let lock = self
            .refresh_locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;
        let outcome = self.refresh_delegated(account_id).await;
        drop(guard);

        // The map and this task hold the only references once nobody waits
        self.refresh_locks
            .remove_if(&account_id, |_, held| Arc::strong_count(held) <= 2);
        outcome
    }

    /// Number of accounts with a delegated refresh in flight or queued
    pub fn refresh_locks_held(&self) -> usize {
        self.refresh_locks.len()
    }

    /// Refresh the stored bundle; the caller holds the account's refresh lock
    async fn refresh_delegated(&self, account_id: Uuid) -> Result<DelegatedCredential> {
        // Another request may have refreshed while we waited
        let bundle = self.stored_bundle(account_id).await?;
        if !bundle.is_expired() {
            return Ok(bundle);
        }

        let refresh_token = bundle.refresh_token.clone().ok_or_else(|| {
            metrics::record_delegated_refresh("missing_refresh_token");
            ReviewError::DelegationExpired("no refresh token on file; sign in again".into())
        })?;

        let refreshed = with_retry(
            &self.settings.refresh_retry,
            IdentityProviderError::is_transient,
            || {
                with_timeout_result(
                    self.settings.identity_timeout,
                    self.identity.refresh_delegated(&refresh_token),
                )
            },
        )
        .await;

        let mut renewed = match refreshed {
            Ok(renewed) => renewed,
            Err(err) => {
                let err = err.into_inner();
                tracing::warn!(
                    account_id = %account_id,
                    error = %err,
                    "delegated credential refresh failed"
                );
                metrics::record_delegated_refresh("failed");
                return Err(ReviewError::DelegationExpired(err.to_string()));
            }
        };

        if renewed.refresh_token.is_none() {
            renewed.refresh_token = Some(refresh_token);
        }
        if renewed.scope.is_none() {
            renewed.scope = bundle.scope.clone();
        }

        self.accounts
            .store_delegated_credential(account_id, &renewed)
            .await?;
        metrics::record_delegated_refresh("refreshed");
        tracing::info!(
            account_id = %account_id,
            expires_at = %renewed.expires_at,
            "delegated credential refreshed"
        );

        Ok(renewed)
    }

    async fn stored_bundle(&self, account_id: Uuid) -> Result<DelegatedCredential> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or(ReviewError::AccountNotFound)?
            .delegated
            .ok_or(ReviewError::NotDelegated)
    }
}

fn consent_error(err: IdentityProviderError) -> ReviewError {
    match err {
        IdentityProviderError::Timeout(elapsed) => ReviewError::from(elapsed),
        IdentityProviderError::Network(msg) => ReviewError::UpstreamUnavailable(msg),
        other => ReviewError::Unauthenticated(other.to_string()),
    }
}
