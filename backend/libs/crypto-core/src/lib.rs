//! Cryptographic building blocks shared by the review backend.
//!
//! - `jwt`: RS256 access/session token issuing and validation
//! - `hash`: SHA-256 fingerprints for credentials stored at rest
//! - `token_cipher`: AES-256-GCM sealing of delegated third-party tokens

pub mod hash;
pub mod jwt;
pub mod token_cipher;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use jwt::{Claims, IssuedToken, JwtError, TokenIssuer, TokenKind};
pub use token_cipher::{TokenCipher, TokenCipherError};
