//! Best-effort encoding detection for file content.
//!
//! BOM sniffing first, then ASCII/UTF-8 validation. Deliberately small; the
//! result is a hint for callers, never authoritative.

/// Guess the charset of raw file content. `None` when unrecognized.
pub fn guess_charset(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Some("UTF-8");
    }
    if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        return Some("UTF-32BE");
    }
    if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        return Some("UTF-32LE");
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some("UTF-16BE");
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some("UTF-16LE");
    }
    if bytes.is_ascii() {
        return Some("US-ASCII");
    }
    if std::str::from_utf8(bytes).is_ok() {
        return Some("UTF-8");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_detection() {
        assert_eq!(guess_charset(&[0xEF, 0xBB, 0xBF, b'a']), Some("UTF-8"));
        assert_eq!(guess_charset(&[0xFE, 0xFF, 0x00, 0x61]), Some("UTF-16BE"));
        assert_eq!(guess_charset(&[0xFF, 0xFE, 0x61, 0x00]), Some("UTF-16LE"));
        assert_eq!(
            guess_charset(&[0xFF, 0xFE, 0x00, 0x00, 0x61, 0x00, 0x00, 0x00]),
            Some("UTF-32LE")
        );
    }

    #[test]
    fn test_ascii_and_utf8() {
        assert_eq!(guess_charset(b"plain text\n"), Some("US-ASCII"));
        assert_eq!(guess_charset("héllo".as_bytes()), Some("UTF-8"));
        assert_eq!(guess_charset(b""), Some("US-ASCII"));
    }

    #[test]
    fn test_unrecognized_binary() {
        assert_eq!(guess_charset(&[0x00, 0xFF, 0xFE, 0x80, 0x80]), None);
    }
}
