//! # botforge-search
//!
//! OpenSearch-compatible index client and answer composition.
//!
//! Retrieval is tenant-scoped: the index holds all tenants' chunks, and the
//! client injects a tenant term filter into every query. Composition turns
//! scored hits into the user-facing reply plus citations.

pub mod client;
pub mod compose;

pub use client::{IndexClient, IndexConfig};
pub use compose::{
    answer, compose_reply, dedupe_chunks, top_citations, ChatAnswer, NOT_READY_MESSAGE,
    NO_MATCH_MESSAGE,
};
