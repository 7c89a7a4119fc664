//! Utils Module

use sha2::{Digest, Sha256};

/// Stable 64-bit digest of a string. Used for novelty signatures and task
/// fingerprints, which must survive process restarts (the standard library
/// hasher is randomly seeded per process).
pub fn stable_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Truncate to `max_len` bytes on a UTF-8 boundary, appending an ellipsis.
pub fn truncate_text(content: &str, max_len: usize) -> String {
    if content.len() <= max_len {
        return content.to_string();
    }
    let target = max_len.saturating_sub(3);
    let mut end = target.min(content.len());
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &content[..end])
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_deterministic() {
        assert_eq!(stable_hash("solve for x"), stable_hash("solve for x"));
        assert_ne!(stable_hash("solve for x"), stable_hash("solve for y"));
    }

    #[test]
    fn truncate_respects_utf8_boundaries() {
        let text = "héllo wörld, this is a long line";
        let short = truncate_text(text, 10);
        assert!(short.ends_with("..."));
        assert!(short.len() <= 10);
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_text("short", 32), "short");
    }
}
