use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

/// Delegated credentials are treated as expired this long before their
/// recorded expiry, so a token never lapses mid-upload.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Account role, fixed when the account is first created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Producer,
    Delegate,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Delegate => "delegate",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    /// Also accepts the `creator`/`editor` names used by older sign-in links.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "producer" | "creator" => Ok(Role::Producer),
            "delegate" | "editor" => Ok(Role::Delegate),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

/// Refreshable third-party credential that lets the service publish on a
/// producer's behalf
#[derive(Clone, PartialEq, Eq)]
pub struct DelegatedCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl DelegatedCredential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for DelegatedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedCredential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub delegated: Option<DelegatedCredential>,
    /// SHA-256 hex of the single active session token
    pub session_fingerprint: Option<String>,
    pub session_issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Public projection returned by `GET /api/v1/me`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub has_delegated_credential: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
            has_delegated_credential: account.delegated.is_some(),
            created_at: account.created_at,
        }
    }
}
