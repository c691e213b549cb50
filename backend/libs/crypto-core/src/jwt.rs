/// RS256 token issuing and validation for the review service
///
/// Two token kinds share one key pair and are told apart by the `token_type`
/// claim:
///
/// - **access**: short-lived, presented on every request
/// - **session**: long-lived, presented only to mint a new token pair
///
/// ## Security Design
///
/// - **RS256 ONLY**: no symmetric algorithms, so a leaked validation key cannot mint tokens
/// - **No hardcoded keys**: keys are parsed from PEM strings supplied by configuration
/// - **Unique `jti`**: two tokens issued in the same second never compare equal,
///   which the session rotation relies on
///
/// ## Usage
///
/// ```rust,no_run
/// use crypto_core::jwt::{TokenIssuer, TokenKind};
/// use uuid::Uuid;
///
/// # fn main() -> Result<(), crypto_core::jwt::JwtError> {
/// let private_key = std::env::var("JWT_PRIVATE_KEY_PEM").unwrap_or_default();
/// let public_key = std::env::var("JWT_PUBLIC_KEY_PEM").unwrap_or_default();
/// let issuer = TokenIssuer::from_pem(&private_key, &public_key)?;
///
/// let issued = issuer.issue(
///     TokenKind::Access,
///     Uuid::new_v4(),
///     "producer@example.com",
///     "producer",
///     chrono::Duration::minutes(15),
/// )?;
/// let claims = issuer.validate(&issued.token, TokenKind::Access)?;
/// assert_eq!(claims.email, "producer@example.com");
/// # Ok(())
/// # }
/// ```
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// JWT algorithm - MUST stay RS256
const JWT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Clock skew tolerated when checking `exp`
const VALIDATION_LEEWAY_SECS: u64 = 30;

// ============================================================================
// Data Structures
// ============================================================================

/// Which of the two credentials a token represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Session,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Session => "session",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by both token kinds
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (account ID as UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type: "access" or "session"
    pub token_type: String,
    /// Email address of the account
    pub email: String,
    /// Role fixed at account creation
    pub role: String,
    /// Unique token identifier
    pub jti: String,
}

impl Claims {
    /// Parse the subject back into an account id
    pub fn subject(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub)
            .map_err(|e| JwtError::Invalid(format!("subject is not a UUID: {e}")))
    }
}

/// A freshly signed token together with its timing metadata
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Remaining lifetime in whole seconds, as reported to clients
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to parse RSA key: {0}")]
    Key(String),
    #[error("Failed to sign token: {0}")]
    Signing(String),
    #[error("Token expired")]
    Expired,
    #[error("Token validation failed: {0}")]
    Invalid(String),
    #[error("Expected a {expected} token, got {found}")]
    WrongKind { expected: TokenKind, found: String },
}

// ============================================================================
// Issuer
// ============================================================================

/// Holds the parsed key pair; cheap to share behind an `Arc`
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenIssuer {
    /// Parse an RSA key pair from PEM strings
    ///
    /// ## Errors
    ///
    /// Returns [`JwtError::Key`] if either PEM is malformed or not an RSA key.
    pub fn from_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self, JwtError> {
        let encoding = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("public key: {e}")))?;

        Ok(Self { encoding, decoding })
    }

    /// Sign a new token of the given kind
    ///
    /// `ttl` may be negative, which produces an already-expired token.
    pub fn issue(
        &self,
        kind: TokenKind,
        account_id: Uuid,
        email: &str,
        role: &str,
        ttl: Duration,
    ) -> Result<IssuedToken, JwtError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: account_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            token_type: kind.as_str().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            jti: jti.clone(),
        };

        let token = encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding)
            .map_err(|e| JwtError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti,
            issued_at,
            expires_at,
        })
    }

    /// Verify signature, expiry and token kind
    ///
    /// ## Errors
    ///
    /// - [`JwtError::Expired`] once `exp` (plus leeway) has passed
    /// - [`JwtError::WrongKind`] when a session token is presented as access or vice versa
    /// - [`JwtError::Invalid`] for anything else: bad signature, malformed token
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = VALIDATION_LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            }
        })?;

        if data.claims.token_type != expected.as_str() {
            return Err(JwtError::WrongKind {
                expected,
                found: data.claims.token_type,
            });
        }

        Ok(data.claims)
    }
}

// ============================================================================
// Tests
// ============================================================================
