//! Text extraction from knowledge sources.
//!
//! Turns a source's raw payload (inline text, a fetched URL, or an uploaded
//! file) into normalized plain text ready for chunking.

use scraper::{Html, Node};
use tracing::debug;

use botforge_core::defaults::{URL_FETCH_TIMEOUT_SECS, URL_FETCH_USER_AGENT};
use botforge_core::{normalize_text, Error, KnowledgeSource, Result, SourceType};

/// Extracts plain text from knowledge source payloads.
#[derive(Clone)]
pub struct Extractor {
    http: reqwest::Client,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(URL_FETCH_TIMEOUT_SECS))
            .user_agent(URL_FETCH_USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build fetch client: {}", e)))?;
        Ok(Self { http })
    }

    /// Extract and normalize the text content of a source.
    pub async fn extract(&self, source: &KnowledgeSource) -> Result<String> {
        let text = match source.source_type {
            SourceType::Text => normalize_text(&source.input_text),
            SourceType::Url => self.extract_url(&source.input_url).await?,
            SourceType::File => self.extract_file(source)?,
        };

        debug!(
            subsystem = "jobs",
            component = "extract",
            source_id = %source.id,
            extracted_chars = text.chars().count(),
            "Extraction complete"
        );
        Ok(text)
    }

    async fn extract_url(&self, url: &str) -> Result<String> {
        if url.is_empty() {
            return Err(Error::Extraction("URL source has no URL".to_string()));
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Extraction(format!("fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Extraction(format!(
                "fetch returned HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Extraction(format!("failed to read response body: {}", e)))?;

        Ok(html_to_text(&body))
    }

    fn extract_file(&self, source: &KnowledgeSource) -> Result<String> {
        let bytes = source
            .input_file
            .as_deref()
            .ok_or_else(|| Error::Extraction("file source has no file data".to_string()))?;

        let filename = source.input_filename.as_deref().unwrap_or("").to_lowercase();

        if filename.ends_with(".pdf") {
            let text = pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| Error::Extraction(format!("PDF extraction failed: {}", e)))?;
            return Ok(normalize_text(&text));
        }

        if filename.ends_with(".html") || filename.ends_with(".htm") {
            return Ok(html_to_text(&String::from_utf8_lossy(bytes)));
        }

        // Anything else is treated as plain text.
        Ok(normalize_text(&String::from_utf8_lossy(bytes)))
    }
}

/// Strip markup from an HTML document, keeping only human-visible text.
/// Script, style, and noscript content is dropped.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    for node in document.tree.nodes() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|a| match a.value() {
                Node::Element(el) => matches!(el.name(), "script" | "style" | "noscript"),
                _ => false,
            });
            if !hidden {
                out.push_str(text);
                out.push(' ');
            }
        }
    }

    normalize_text(&out)
}
