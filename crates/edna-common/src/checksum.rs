//! Checksum utilities for archived survey files

use sha2::{Digest, Sha256};

/// Compute the SHA-256 checksum of an in-memory byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
