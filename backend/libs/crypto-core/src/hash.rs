use sha2::{Digest, Sha256};

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hex-encoded SHA256, the form credentials are fingerprinted in at rest
pub fn sha256_hex(input: &[u8]) -> String {
    hex::encode(sha256(input))
}
