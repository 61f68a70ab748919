//! Error-log deduplication.
//!
//! Holds the SHA-256 of the last error-log body that was alerted on. Any
//! byte change produces a new hash and re-alerts; an identical body never
//! does. State is in-memory only and starts empty on every process start.

use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Single-slot fingerprint of the last alerted error log.
#[derive(Debug, Default)]
pub struct ErrorLogFingerprint {
    last: Mutex<Option<String>>,
}

impl ErrorLogFingerprint {
    /// Create an empty fingerprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `body` and report whether it differs from the stored one.
    ///
    /// Check and update happen under one lock, so two concurrent callers
    /// with the same new body get exactly one `true`.
    pub fn observe(&self, body: &[u8]) -> bool {
        let hash = content_hash(body);
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_deref() == Some(hash.as_str()) {
            return false;
        }
        *last = Some(hash);
        true
    }

    /// Currently stored hash, if any.
    pub fn current(&self) -> Option<String> {
        match self.last.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Hex-encoded SHA-256 of `body`.
pub fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Whether `body` contains `marker` as a contiguous byte sequence.
pub fn contains_marker(body: &[u8], marker: &[u8]) -> bool {
    if marker.is_empty() {
        return true;
    }
    body.windows(marker.len()).any(|window| window == marker)
}
