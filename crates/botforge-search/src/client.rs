//! OpenSearch-compatible index client for knowledge chunks.
//!
//! One index holds all tenants' chunks; every query carries a tenant term
//! filter so relevance scoring never crosses tenant boundaries.

use std::time::Duration;

use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, trace};
use uuid::Uuid;

use botforge_core::defaults::{
    INDEX_BASE_URL, INDEX_NAME, INDEX_TIMEOUT_SECS, RETRIEVAL_MIN_QUERY_CHARS,
};
use botforge_core::{Error, Result, RetrievedChunk};

/// Search index connection settings.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Base URL of the OpenSearch-compatible cluster.
    pub base_url: String,
    /// Name of the chunk index.
    pub index_name: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: INDEX_BASE_URL.to_string(),
            index_name: INDEX_NAME.to_string(),
            timeout: Duration::from_secs(INDEX_TIMEOUT_SECS),
        }
    }
}

impl IndexConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults:
    /// - `SEARCH_INDEX_URL`: cluster base URL
    /// - `SEARCH_INDEX_NAME`: index name
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("SEARCH_INDEX_URL") {
            config.base_url = url;
        }
        if let Ok(name) = std::env::var("SEARCH_INDEX_NAME") {
            config.index_name = name;
        }
        config
    }
}

/// HTTP client for the chunk index.
#[derive(Clone)]
pub struct IndexClient {
    http: reqwest::Client,
    config: IndexConfig,
}

impl IndexClient {
    pub fn new(config: IndexConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build index client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn index_url(&self, suffix: &str) -> String {
        format!(
            "{}/{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.index_name,
            suffix
        )
    }

    /// Create the chunk index with its mapping if it does not already exist.
    /// A concurrent or earlier creation is not an error.
    pub async fn ensure_index(&self) -> Result<()> {
        let mapping = json!({
            "mappings": {
                "properties": {
                    "tenant_id":   { "type": "keyword" },
                    "source_id":   { "type": "keyword" },
                    "chunk_index": { "type": "integer" },
                    "title":       { "type": "text" },
                    "content":     { "type": "text" }
                }
            }
        });

        let response = self
            .http
            .put(self.index_url(""))
            .json(&mapping)
            .send()
            .await?;

        if response.status().is_success() {
            info!(
                subsystem = "search",
                op = "ensure_index",
                index = %self.config.index_name,
                "Created chunk index"
            );
            return Ok(());
        }

        let body = response.text().await?;
        if body.contains("resource_already_exists_exception") {
            debug!(
                subsystem = "search",
                op = "ensure_index",
                index = %self.config.index_name,
                "Chunk index already exists"
            );
            return Ok(());
        }
        Err(Error::Index(format!("index creation failed: {}", body)))
    }

    /// NDJSON bulk body for a source's chunks, with the number of documents
    /// it holds. Chunks that are empty after trimming are skipped; their
    /// position is still burned so document ids stay aligned with chunk
    /// indices. Titles are capped at 255 characters.
    fn bulk_body(
        tenant_id: Uuid,
        source_id: Uuid,
        title: &str,
        chunks: &[String],
    ) -> (String, usize) {
        let title: String = title.chars().take(255).collect();
        let mut body = String::new();
        let mut count = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let content = chunk.trim();
            if content.is_empty() {
                continue;
            }
            let doc_id = format!("{}:{}:{}", tenant_id, source_id, i);
            body.push_str(&json!({"index": {"_id": doc_id}}).to_string());
            body.push('\n');
            body.push_str(
                &json!({
                    "tenant_id": tenant_id,
                    "source_id": source_id,
                    "chunk_index": i,
                    "title": title,
                    "content": content,
                })
                .to_string(),
            );
            body.push('\n');
            count += 1;
        }
        (body, count)
    }

    /// Replace a source's chunks in the index, returning how many documents
    /// were written.
    ///
    /// Document ids are `{tenant}:{source}:{position}`, so re-ingesting a
    /// source overwrites its documents in place. Uses `refresh=wait_for` so
    /// a successful ingestion is immediately searchable. Chunks that are
    /// empty after trimming are skipped; an input with no indexable chunks
    /// is a no-op.
    pub async fn upsert_chunks(
        &self,
        tenant_id: Uuid,
        source_id: Uuid,
        title: &str,
        chunks: &[String],
    ) -> Result<usize> {
        let (body, count) = Self::bulk_body(tenant_id, source_id, title, chunks);
        if count == 0 {
            return Ok(0);
        }

        let response = self
            .http
            .post(self.index_url("/_bulk?refresh=wait_for"))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Index(format!(
                "bulk indexing failed with HTTP {}",
                response.status()
            )));
        }

        let result: JsonValue = response.json().await?;
        if result["errors"].as_bool().unwrap_or(false) {
            return Err(Error::Index("bulk indexing reported item errors".to_string()));
        }

        debug!(
            subsystem = "search",
            op = "upsert_chunks",
            tenant_id = %tenant_id,
            source_id = %source_id,
            chunk_count = count,
            "Indexed source chunks"
        );
        Ok(count)
    }

    /// Remove all indexed chunks of a source, returning how many documents
    /// were deleted. Version conflicts from concurrent writes are tolerated.
    pub async fn delete_by_source(&self, tenant_id: Uuid, source_id: Uuid) -> Result<u64> {
        let query = json!({
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "tenant_id": tenant_id } },
                        { "term": { "source_id": source_id } }
                    ]
                }
            }
        });

        let response = self
            .http
            .post(self.index_url("/_delete_by_query?conflicts=proceed&refresh=true"))
            .json(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Index(format!(
                "delete_by_query failed with HTTP {}",
                response.status()
            )));
        }

        let result: JsonValue = response.json().await?;
        let deleted = result["deleted"].as_u64().unwrap_or(0);
        debug!(
            subsystem = "search",
            op = "delete_by_source",
            tenant_id = %tenant_id,
            source_id = %source_id,
            deleted = deleted,
            "Deleted indexed chunks for source"
        );
        Ok(deleted)
    }

    /// Retrieve scored chunks for a tenant's query.
    ///
    /// Queries shorter than three characters return nothing. All query
    /// terms must match (AND operator), with title matches weighted double.
    /// Hits below `min_score` are dropped.
    pub async fn search(
        &self,
        tenant_id: Uuid,
        query: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<RetrievedChunk>> {
        let query = query.trim();
        if query.chars().count() < RETRIEVAL_MIN_QUERY_CHARS {
            return Ok(Vec::new());
        }

        let body = json!({
            "size": top_k,
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "tenant_id": tenant_id } }
                    ],
                    "must": [
                        {
                            "multi_match": {
                                "query": query,
                                "fields": ["content", "title^2"],
                                "operator": "and"
                            }
                        }
                    ]
                }
            }
        });

        let response = self
            .http
            .post(self.index_url("/_search"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Index(format!(
                "search failed with HTTP {}",
                response.status()
            )));
        }

        let result: JsonValue = response.json().await?;
        let hits = result["hits"]["hits"].as_array().cloned().unwrap_or_default();

        let mut chunks = Vec::new();
        for hit in hits {
            let score = hit["_score"].as_f64().unwrap_or(0.0);
            if score < min_score {
                continue;
            }
            let source = &hit["_source"];
            trace!(
                subsystem = "search",
                op = "search",
                score = score,
                "Retrieval hit"
            );
            chunks.push(RetrievedChunk {
                source_id: source["source_id"].as_str().unwrap_or_default().to_string(),
                title: source["title"].as_str().unwrap_or_default().to_string(),
                content: source["content"].as_str().unwrap_or_default().to_string(),
                score,
            });
        }

        debug!(
            subsystem = "search",
            op = "search",
            tenant_id = %tenant_id,
            result_count = chunks.len(),
            "Retrieval complete"
        );
        Ok(chunks)
    }
}
