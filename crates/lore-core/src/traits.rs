use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::types::{ScoredDocument, VectorRecord};

/// Text to fixed-length vector. Implementations must be deterministic for a
/// given `embedder_id` and return vectors of length `dim()`.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:xxh64:d256`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder '{}' returned no vector", self.embedder_id()))
    }
}

/// A named set of (id, vector, text) entries inside a vector store.
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;
    /// Insert new ids, overwrite existing ones.
    async fn upsert(&self, records: &[VectorRecord]) -> anyhow::Result<()>;
    async fn count(&self) -> anyhow::Result<usize>;
    /// Up to `k` nearest neighbours of `query`, best first.
    async fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<ScoredDocument>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn list_collections(&self) -> anyhow::Result<Vec<String>>;
    async fn create_collection(&self, name: &str, dim: usize) -> anyhow::Result<Arc<dyn Collection>>;
    /// Absence of the collection is not an error.
    async fn delete_collection(&self, name: &str) -> anyhow::Result<()>;
    async fn get_collection(&self, name: &str) -> anyhow::Result<Arc<dyn Collection>>;
}

/// Opens the vector store that lives in a domain's persisted-index directory.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, dir: &Path) -> anyhow::Result<Arc<dyn VectorStore>>;
}
