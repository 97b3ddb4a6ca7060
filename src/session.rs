//! Session identifier and input-hash helpers (§6.3)
//!
//! `session_id` is a caller-provided opaque string; the engine never
//! generates one itself. `input_hash` lets the checkpoint store decide
//! whether an in-progress checkpoint is resumable against the *same* input,
//! without the engine reading the CSV file itself.

use sha2::{Digest, Sha256};

/// SHA-256 of the input CSV bytes, lower-hex encoded.
///
/// Callers (and tests) should use this helper rather than hashing the bytes
/// themselves, so the checkpoint store's `input_hash` column is always
/// comparable across runs.
pub fn hash_input(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
