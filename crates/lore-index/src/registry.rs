use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lore_core::traits::{Collection, Embedder};

/// How a handle came to be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// Reopened from persisted state.
    Loaded,
    /// Rebuilt from the corpus.
    Built,
}

impl fmt::Display for IndexOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => f.write_str("loaded"),
            Self::Built => f.write_str("built"),
        }
    }
}

/// Query-ready view of one domain's index.
#[derive(Clone)]
pub struct IndexHandle {
    pub domain: String,
    pub collection: Arc<dyn Collection>,
    pub embedder: Arc<dyn Embedder>,
    pub default_top_k: usize,
    pub document_count: usize,
    pub origin: IndexOrigin,
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("domain", &self.domain)
            .field("collection", &self.collection.name())
            .field("embedder", &self.embedder.embedder_id())
            .field("default_top_k", &self.default_top_k)
            .field("document_count", &self.document_count)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Domain name to handle. Written only by the index manager during startup.
#[derive(Debug, Default, Clone)]
pub struct IndexRegistry {
    handles: HashMap<String, IndexHandle>,
}

impl IndexRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, domain: &str) -> Option<&IndexHandle> { self.handles.get(domain) }

    pub fn contains(&self, domain: &str) -> bool { self.handles.contains_key(domain) }

    /// Registered domain names, sorted.
    pub fn domains(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize { self.handles.len() }

    pub fn is_empty(&self) -> bool { self.handles.is_empty() }

    pub(crate) fn insert(&mut self, handle: IndexHandle) {
        self.handles.insert(handle.domain.clone(), handle);
    }

    pub(crate) fn remove(&mut self, domain: &str) -> Option<IndexHandle> {
        self.handles.remove(domain)
    }
}
