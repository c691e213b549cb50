//! Configuration management for review-service
//!
//! Loads settings from environment variables (and a `.env` file in debug
//! builds). Secrets have no defaults: a missing one fails startup.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub google: GoogleConfig,
    pub storage: StorageConfig,
    pub publishing: PublishingConfig,
    pub timeouts: TimeoutSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
    /// Where the browser lands after sign-in
    pub frontend_url: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    pub jwt_private_key_pem: String,
    pub jwt_public_key_pem: String,
    pub access_token_ttl_secs: i64,
    pub session_token_ttl_secs: i64,
    pub cookie_secure: bool,
    /// Base64 AES-256 key for delegated tokens at rest
    pub token_encryption_key: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "memory" => Ok(StorageBackend::Memory),
            other => bail!("unknown asset store backend '{other}' (expected s3 or memory)"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3: S3Config,
    pub max_upload_bytes: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
    pub key_prefix: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PublishingConfig {
    pub upload_base: String,
}

/// Bounds on every collaborator call, in seconds
#[derive(Clone, Debug, Deserialize)]
pub struct TimeoutSettings {
    pub identity_secs: u64,
    pub storage_secs: u64,
    pub publish_secs: u64,
}

impl TimeoutSettings {
    pub fn identity(&self) -> Duration {
        Duration::from_secs(self.identity_secs)
    }

    pub fn storage(&self) -> Duration {
        Duration::from_secs(self.storage_secs)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_secs(self.publish_secs)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
        }

        let port = parse_or("REVIEW_SERVICE_PORT", 8080u16)?;

        Ok(Config {
            app: AppConfig {
                host: env::var("REVIEW_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            auth: AuthConfig {
                jwt_private_key_pem: pem_var("JWT_PRIVATE_KEY_PEM")?,
                jwt_public_key_pem: pem_var("JWT_PUBLIC_KEY_PEM")?,
                access_token_ttl_secs: parse_or("ACCESS_TOKEN_TTL_SECS", 900)?,
                session_token_ttl_secs: parse_or("SESSION_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
                cookie_secure: parse_or("COOKIE_SECURE", false)?,
                token_encryption_key: env::var("TOKEN_ENCRYPTION_KEY")
                    .context("TOKEN_ENCRYPTION_KEY must be set")?,
            },
            google: GoogleConfig {
                client_id: env::var("GOOGLE_CLIENT_ID").context("GOOGLE_CLIENT_ID must be set")?,
                client_secret: env::var("GOOGLE_CLIENT_SECRET")
                    .context("GOOGLE_CLIENT_SECRET must be set")?,
                redirect_uri: env::var("GOOGLE_REDIRECT_URI").unwrap_or_else(|_| {
                    format!("http://localhost:{port}/api/v1/auth/oauth2callback")
                }),
            },
            storage: StorageConfig {
                backend: parse_or("ASSET_STORE_BACKEND", StorageBackend::S3)?,
                s3: S3Config {
                    bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "cutroom-assets".to_string()),
                    region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                    access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                    secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
                    endpoint: env::var("S3_ENDPOINT").ok().filter(|e| !e.is_empty()),
                    key_prefix: env::var("S3_KEY_PREFIX").unwrap_or_else(|_| "assets".to_string()),
                },
                max_upload_bytes: parse_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            },
            publishing: PublishingConfig {
                upload_base: env::var("PUBLISHING_UPLOAD_BASE")
                    .unwrap_or_else(|_| "https://www.googleapis.com".to_string()),
            },
            timeouts: TimeoutSettings {
                identity_secs: parse_or("IDENTITY_TIMEOUT_SECS", 10)?,
                storage_secs: parse_or("STORAGE_TIMEOUT_SECS", 30)?,
                publish_secs: parse_or("PUBLISH_TIMEOUT_SECS", 600)?,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.env.eq_ignore_ascii_case("production")
    }

    /// Cookies carry `Secure` in production or when forced on
    pub fn secure_cookies(&self) -> bool {
        self.auth.cookie_secure || self.is_production()
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {key}: {e}")),
        _ => Ok(default),
    }
}

/// PEM keys are often passed with literal `\n` sequences
fn pem_var(key: &str) -> Result<String> {
    let raw = env::var(key).with_context(|| format!("{key} must be set"))?;
    Ok(raw.replace("\\n", "\n"))
}
