// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! ETag utilities for efficient progress polling.
//!
//! ETags hash the stable response fields so clients polling every second get
//! 304s while nothing changes. serde_json's default map keeps keys sorted,
//! which makes the serialized form stable across renders.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Generate a quoted ETag from JSON data.
pub fn generate_etag(data: &Value) -> String {
    let serialized = serde_json::to_string(data).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("\"{}\"", hex)
}

/// Check whether the client's `If-None-Match` matches the current ETag.
pub fn check_etag(request_etag: Option<&str>, current_etag: &str) -> bool {
    match request_etag {
        Some(header) => header == current_etag,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_etag_is_stable_for_equal_data() {
        let a = json!({"status": "crawling", "progress": 10});
        let b = json!({"progress": 10, "status": "crawling"});
        // Key order does not affect the hash.
        assert_eq!(generate_etag(&a), generate_etag(&b));
    }

    #[test]
    fn test_etag_changes_with_data() {
        let a = json!({"progress": 10});
        let b = json!({"progress": 11});
        assert_ne!(generate_etag(&a), generate_etag(&b));
    }

    #[test]
    fn test_etag_is_quoted() {
        let etag = generate_etag(&json!({}));
        assert!(etag.starts_with('"') && etag.ends_with('"'));
    }

    #[test]
    fn test_check_etag() {
        let current = generate_etag(&json!({"x": 1}));
        assert!(check_etag(Some(current.as_str()), &current));
        assert!(!check_etag(Some("\"other\""), &current));
        assert!(!check_etag(None, &current));
    }
}
