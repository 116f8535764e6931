//! Text normalization applied to extracted content before chunking.

/// Normalize raw extracted text for indexing.
///
/// Strips NUL bytes, collapses all whitespace runs (including newlines and
/// tabs) to single spaces, and trims the ends. Indexed content never contains
/// control characters or layout artifacts from the extraction step.
pub fn normalize_text(raw: &str) -> String {
    let cleaned = raw.replace('\0', " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_runs() {
        assert_eq!(normalize_text("a  b\t\tc\n\nd"), "a b c d");
    }

    #[test]
    fn test_trims_ends() {
        assert_eq!(normalize_text("  hello world  "), "hello world");
    }

    #[test]
    fn test_strips_nul_bytes() {
        assert_eq!(normalize_text("a\0b"), "a b");
        assert_eq!(normalize_text("a\0\0b"), "a b");
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   \n\t  "), "");
        assert_eq!(normalize_text("\0"), "");
    }

    #[test]
    fn test_preserves_unicode_content() {
        assert_eq!(normalize_text("héllo   wörld"), "héllo wörld");
    }
}
