//! ETag generation and `If-None-Match` validation.

use md5::{Digest, Md5};

/// Strong ETag: quoted 32-hex-digit MD5 of the body.
pub fn strong(body: &[u8]) -> String {
    let digest = Md5::digest(body);
    format!("\"{}\"", hex::encode(digest))
}

/// Weak ETag: same digest, `W/`-prefixed per RFC 7232 §2.3 to signal the
/// comparison is semantic rather than byte-for-byte.
pub fn weak(body: &[u8]) -> String {
    format!("W/{}", strong(body))
}

/// Validates an `If-None-Match` header value against a freshly computed
/// ETag. `*` matches any existing resource; otherwise compares against each
/// comma-separated entry, ignoring the weak-indicator prefix per RFC 7232's
/// "semantic" comparison rule for conditional GETs.
pub fn matches_if_none_match(if_none_match: &str, etag: &str) -> bool {
    let candidate = strip_weak_prefix(etag);
    if_none_match.trim() == "*"
        || if_none_match
            .split(',')
            .map(str::trim)
            .any(|tag| strip_weak_prefix(tag) == candidate)
}

fn strip_weak_prefix(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_etag_is_quoted_hex() {
        let tag = strong(b"hello");
        assert!(tag.starts_with('"') && tag.ends_with('"'));
        assert_eq!(tag.len(), 34); // 2 quotes + 32 hex chars
    }

    #[test]
    fn weak_etag_is_prefixed() {
        let tag = weak(b"hello");
        assert!(tag.starts_with("W/\""));
    }

    #[test]
    fn wildcard_matches_anything() {
        assert!(matches_if_none_match("*", &strong(b"x")));
    }

    #[test]
    fn list_match_ignores_weak_prefix() {
        let etag = strong(b"hello");
        let header = format!("\"deadbeef\", W/{etag}");
        assert!(matches_if_none_match(&header, &etag));
    }

    #[test]
    fn non_matching_list_fails() {
        let etag = strong(b"hello");
        assert!(!matches_if_none_match("\"other\"", &etag));
    }
}
