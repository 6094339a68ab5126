use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use lore_core::types::{Document, ScoredDocument};
use lore_core::{Error, Result};

use crate::registry::IndexRegistry;

const ELLIPSIS: &str = "...";

/// Read-only query front over a frozen registry. Cheap to clone and share
/// across tasks; searches run without any locking.
#[derive(Debug, Clone)]
pub struct RetrievalRouter {
    registry: Arc<IndexRegistry>,
}

impl RetrievalRouter {
    pub fn new(registry: Arc<IndexRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Up to `top_k` documents of `domain` most similar to `query`, best first.
    pub async fn retrieve(&self, domain: &str, query: &str, top_k: usize) -> Result<RetrievalResult> {
        let handle = self.registry.get(domain).ok_or_else(|| Error::DomainNotReady(domain.to_string()))?;
        if top_k == 0 {
            return Ok(RetrievalResult::new(domain, query, Vec::new()));
        }
        let retrieval_err = |source: anyhow::Error| Error::Retrieval { domain: domain.to_string(), source };

        // A collection never holds more than its document count.
        let limit = top_k.min(handle.document_count.max(1));

        let vector = handle.embedder.embed_one(query).map_err(retrieval_err)?;
        let mut hits = handle.collection.search(&vector, limit).await.map_err(retrieval_err)?;
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);

        debug!(domain, top_k, hits = hits.len(), "retrieved");
        Ok(RetrievalResult::new(domain, query, hits))
    }

    /// [`retrieve`](Self::retrieve) with the domain's configured top-k.
    pub async fn retrieve_default(&self, domain: &str, query: &str) -> Result<RetrievalResult> {
        let top_k = self
            .registry
            .get(domain)
            .map(|h| h.default_top_k)
            .ok_or_else(|| Error::DomainNotReady(domain.to_string()))?;
        self.retrieve(domain, query, top_k).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub domain: String,
    pub query: String,
    pub hits: Vec<ScoredDocument>,
    /// Hit texts in rank order separated by a blank line.
    pub context: String,
}

impl RetrievalResult {
    pub fn new(domain: impl Into<String>, query: impl Into<String>, hits: Vec<ScoredDocument>) -> Self {
        let context = hits.iter().map(|h| h.document.text.as_str()).collect::<Vec<_>>().join("\n\n");
        Self { domain: domain.into(), query: query.into(), hits, context }
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.hits.iter().map(|h| &h.document)
    }

    pub fn len(&self) -> usize { self.hits.len() }

    pub fn is_empty(&self) -> bool { self.hits.is_empty() }

    /// Context limited to `max_chars` characters, ending in `...` when cut.
    pub fn context_within(&self, max_chars: usize) -> String {
        if self.context.chars().count() <= max_chars {
            return self.context.clone();
        }
        let keep = max_chars.saturating_sub(ELLIPSIS.len());
        let mut out: String = self.context.chars().take(keep).collect();
        out.push_str(&ELLIPSIS[..max_chars.min(ELLIPSIS.len())]);
        out
    }
}
