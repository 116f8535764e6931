//! Chat query answering.
//!
//! Ties knowledge readiness, tenant-scoped retrieval, and answer
//! composition together into the single operation the chat surface calls.

use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use botforge_core::defaults::{RETRIEVAL_MIN_SCORE, RETRIEVAL_TOP_K};
use botforge_core::Result;
use botforge_db::Database;
use botforge_search::{answer, ChatAnswer, IndexClient};

/// Answers end-user chat queries from the knowledge base.
#[derive(Clone)]
pub struct ChatService {
    db: Database,
    index: IndexClient,
}

impl ChatService {
    pub fn new(db: Database, index: IndexClient) -> Self {
        Self { db, index }
    }

    /// Answer a query against the tenant's knowledge base.
    ///
    /// Until at least one ingestion has succeeded for the tenant, the
    /// canned not-ready reply is returned without querying the index.
    pub async fn answer_query(&self, tenant_id: Uuid, query: &str) -> Result<ChatAnswer> {
        let start = Instant::now();

        let knowledge_ready = self.db.ingestion.has_succeeded_for_tenant(tenant_id).await?;
        let chunks = if knowledge_ready {
            self.index
                .search(tenant_id, query, RETRIEVAL_TOP_K, RETRIEVAL_MIN_SCORE)
                .await?
        } else {
            Vec::new()
        };

        let answer = answer(knowledge_ready, &chunks);
        info!(
            subsystem = "jobs",
            component = "chat",
            op = "answer",
            tenant_id = %tenant_id,
            result_count = chunks.len(),
            kb_used = answer.kb_used,
            duration_ms = start.elapsed().as_millis() as u64,
            "Answered chat query"
        );
        Ok(answer)
    }
}
