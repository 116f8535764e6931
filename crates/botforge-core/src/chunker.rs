//! Sliding-window text chunking for knowledge-source ingestion.
//!
//! Splits normalized text into fixed-size character windows with a trailing
//! overlap carried into the next chunk, so sentences straddling a boundary
//! remain searchable in at least one chunk.

/// Split `text` into chunks of at most `max_chars` characters, where each
/// chunk after the first repeats the last `overlap` characters of its
/// predecessor.
///
/// Boundaries are counted in characters, never bytes, so multi-byte input
/// cannot be split mid-codepoint. Leading and trailing whitespace is trimmed
/// before splitting. Rules:
///
/// - empty (or whitespace-only) input produces no chunks
/// - `max_chars == 0` disables splitting and yields the whole text
/// - `overlap` is clamped to `max_chars - 1` so the window always advances
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![trimmed.to_string()];
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= max_chars {
        return vec![trimmed.to_string()];
    }

    let overlap = overlap.min(max_chars - 1);
    let step = max_chars - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_nothing() {
        assert!(chunk_text("", 900, 120).is_empty());
        assert!(chunk_text("   \n\t ", 900, 120).is_empty());
    }

    #[test]
    fn test_short_input_is_single_chunk() {
        let chunks = chunk_text("hello world", 900, 120);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_input_is_trimmed_before_splitting() {
        let chunks = chunk_text("  hello  ", 900, 120);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn test_zero_max_chars_disables_splitting() {
        let text = "x".repeat(5000);
        let chunks = chunk_text(&text, 0, 120);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 5000);
    }

    #[test]
    fn test_every_chunk_within_limit() {
        let text = "word ".repeat(600);
        let chunks = chunk_text(&text, 900, 120);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 900);
        }
    }

    #[test]
    fn test_chunk_count_matches_window_arithmetic() {
        // len 2000, max 900, overlap 120, step 780:
        // windows start at 0, 780, 1560 -> 3 chunks
        let text = "a".repeat(2000);
        let chunks = chunk_text(&text, 900, 120);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 900);
        assert_eq!(chunks[1].len(), 900);
        assert_eq!(chunks[2].len(), 2000 - 1560);
    }

    #[test]
    fn test_adjacent_chunks_share_overlap() {
        let text: String = ('a'..='z').cycle().take(100).collect();
        let chunks = chunk_text(&text, 40, 10);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let tail: String = prev[prev.len() - 10..].iter().collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn test_reconstruction_after_stripping_overlap() {
        let text: String = ('a'..='z').cycle().take(250).collect();
        let chunks = chunk_text(&text, 40, 10);
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            let chars: Vec<char> = chunk.chars().collect();
            rebuilt.extend(chars[10..].iter());
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_overlap_clamped_below_max_chars() {
        // overlap >= max_chars would never advance; it is clamped to max - 1
        let text = "a".repeat(50);
        let chunks = chunk_text(&text, 10, 99);
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].len(), 10);
        // step of 1 after clamping to overlap 9
        assert_eq!(chunks.len(), 41);
    }

    #[test]
    fn test_multibyte_input_splits_on_char_boundaries() {
        let text = "é".repeat(100);
        let chunks = chunk_text(&text, 30, 5);
        for chunk in &chunks {
            assert!(chunk.chars().all(|c| c == 'é'));
            assert!(chunk.chars().count() <= 30);
        }
    }
}
