//! Answer composition from retrieved knowledge chunks.
//!
//! Turns scored retrieval hits into the reply text shown to an end user,
//! with citations back to the knowledge sources the text came from.

use sha2::{Digest, Sha256};

use botforge_core::defaults::{
    REPLY_MAX_CHARS, REPLY_MAX_CHUNKS, REPLY_MAX_SOURCES, REPLY_PER_CHUNK_CHARS,
};
use botforge_core::{normalize_text, Citation, RetrievedChunk};
use serde::{Deserialize, Serialize};

/// Reply used when the tenant has no successfully ingested content yet.
pub const NOT_READY_MESSAGE: &str = "I\u{2019}m not ready with your company information yet. \
Please try again in a moment after your content finishes processing.";

/// Reply used when retrieval found nothing relevant.
pub const NO_MATCH_MESSAGE: &str = "I couldn\u{2019}t find this in your company information yet. \
Try rephrasing, or add more content to your knowledge base.";

/// A composed answer, ready to return to the chat surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub reply: String,
    pub citations: Vec<Citation>,
    /// Whether knowledge-base content backed this reply.
    pub kb_used: bool,
    /// Best retrieval score among the used chunks, rounded to 3 decimals.
    pub kb_top_score: Option<f64>,
    /// Distinct source ids cited, in citation order.
    pub kb_source_ids: Vec<String>,
}

fn round3(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Drop empty chunks and chunks whose normalized content matches an earlier
/// chunk, preserving order. Identity is a hash of the whitespace-normalized
/// content, so the same passage indexed under two sources collapses to one
/// chunk.
pub fn dedupe_chunks(chunks: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for chunk in chunks {
        let content = normalize_text(&chunk.content);
        if content.is_empty() {
            continue;
        }
        let digest = Sha256::digest(content.as_bytes());
        if seen.insert(digest) {
            unique.push(chunk.clone());
        }
    }
    unique
}

/// Concatenate the best chunks into one reply body.
///
/// Expects input already deduplicated by [`dedupe_chunks`]. Takes at most
/// [`REPLY_MAX_CHUNKS`] chunks, normalizes and truncates each to
/// [`REPLY_PER_CHUNK_CHARS`] characters, joins them with blank lines, and
/// caps the whole reply at [`REPLY_MAX_CHARS`] characters. The cap never
/// leaves trailing whitespace or a dangling separator.
pub fn compose_reply(chunks: &[RetrievedChunk]) -> String {
    let parts: Vec<String> = chunks
        .iter()
        .take(REPLY_MAX_CHUNKS)
        .map(|chunk| {
            truncate_chars(&normalize_text(&chunk.content), REPLY_PER_CHUNK_CHARS)
                .trim_end()
                .to_string()
        })
        .filter(|part| !part.is_empty())
        .collect();
    truncate_chars(&parts.join("\n\n"), REPLY_MAX_CHARS)
        .trim_end()
        .to_string()
}

/// Citations for the first [`REPLY_MAX_SOURCES`] distinct sources, in hit
/// order, with scores rounded to 3 decimals.
pub fn top_citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    let mut seen = std::collections::HashSet::new();
    let mut citations = Vec::new();
    for chunk in chunks {
        if citations.len() >= REPLY_MAX_SOURCES {
            break;
        }
        if seen.insert(chunk.source_id.clone()) {
            citations.push(Citation {
                source_id: chunk.source_id.clone(),
                title: chunk.title.clone(),
                score: round3(chunk.score),
            });
        }
    }
    citations
}

/// Compose the final answer from retrieval results.
///
/// Policy, in order:
/// 1. tenant has no ingested knowledge yet: canned not-ready reply
/// 2. nothing usable above the score floor after dedup: canned no-match reply
/// 3. otherwise: chunk-backed reply with citations
///
/// De-duplication runs once, and the reply, citations, source ids, and top
/// score all derive from the same deduplicated list. A source whose content
/// duplicated an earlier hit is never cited.
pub fn answer(knowledge_ready: bool, chunks: &[RetrievedChunk]) -> ChatAnswer {
    if !knowledge_ready {
        return ChatAnswer {
            reply: NOT_READY_MESSAGE.to_string(),
            citations: Vec::new(),
            kb_used: false,
            kb_top_score: None,
            kb_source_ids: Vec::new(),
        };
    }

    let unique = dedupe_chunks(chunks);
    if unique.is_empty() {
        return ChatAnswer {
            reply: NO_MATCH_MESSAGE.to_string(),
            citations: Vec::new(),
            kb_used: false,
            kb_top_score: None,
            kb_source_ids: Vec::new(),
        };
    }

    let citations = top_citations(&unique);
    let kb_source_ids = citations.iter().map(|c| c.source_id.clone()).collect();
    let kb_top_score = unique.iter().map(|c| c.score).fold(f64::MIN, f64::max);

    ChatAnswer {
        reply: compose_reply(&unique),
        citations,
        kb_used: true,
        kb_top_score: Some(round3(kb_top_score)),
        kb_source_ids,
    }
}
