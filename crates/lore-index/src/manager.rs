//! Startup-time lifecycle of per-domain indexes.
//!
//! For each configured domain the manager decides whether persisted state can
//! be reused, reloads it or rebuilds it from the corpus, and registers a
//! query-ready [`IndexHandle`]. It is the only writer of the registry and only
//! writes through `&mut self`, so once [`IndexManager::into_registry`] freezes
//! the mapping behind an `Arc` no further mutation is possible.

use anyhow::ensure;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use lore_core::loader::{corpus_digest, DocumentLoader};
use lore_core::traits::{Collection, Embedder, StoreConnector, VectorStore};
use lore_core::types::{Document, Domain, VectorRecord};
use lore_core::{Error, Result};

use crate::manifest::{remove_manifest, IndexManifest, MANIFEST_FILE};
use crate::registry::{IndexHandle, IndexOrigin, IndexRegistry};

const DEFAULT_BATCH_SIZE: usize = 32;

pub struct IndexManager {
    persist_root: PathBuf,
    embedder: Arc<dyn Embedder>,
    connector: Arc<dyn StoreConnector>,
    loader: DocumentLoader,
    batch_size: usize,
    registry: IndexRegistry,
}

/// Result of the persisted-state check for one domain.
#[derive(Debug)]
pub enum PersistedState {
    /// Collection and manifest both present and compatible.
    Valid(IndexManifest),
    /// Something is missing or out of date; the next `ensure` rebuilds.
    Invalid(String),
}

impl IndexManager {
    pub fn new(persist_root: impl Into<PathBuf>, embedder: Arc<dyn Embedder>, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            persist_root: persist_root.into(),
            embedder,
            connector,
            loader: DocumentLoader::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            registry: IndexRegistry::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// `<persist_root>/<domain>/`
    pub fn domain_dir(&self, domain: &str) -> PathBuf {
        self.persist_root.join(domain)
    }

    pub fn get(&self, domain: &str) -> Option<IndexHandle> {
        self.registry.get(domain).cloned()
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Freeze the registry for concurrent readers.
    pub fn into_registry(self) -> Arc<IndexRegistry> {
        Arc::new(self.registry)
    }

    /// Make `domain` query-ready, reusing persisted state when it is valid.
    ///
    /// On failure the domain is left unregistered, even if an earlier call
    /// had registered it.
    pub async fn ensure(&mut self, domain: &Domain) -> Result<IndexHandle> {
        let result = self.ensure_inner(domain).await;
        match &result {
            Ok(handle) => self.registry.insert(handle.clone()),
            Err(_) => {
                self.registry.remove(&domain.name);
            }
        }
        result
    }

    /// Ensure every domain in order. One domain failing never stops the others.
    pub async fn ensure_all(&mut self, domains: &[Domain]) -> InitReport {
        let mut outcomes = Vec::with_capacity(domains.len());
        for domain in domains {
            let result = self
                .ensure(domain)
                .await
                .map(|handle| IndexSummary { origin: handle.origin, document_count: handle.document_count });
            if let Err(e) = &result {
                error!(domain = %domain.name, error = %e, "domain not ready");
            }
            outcomes.push(DomainOutcome { domain: domain.name.clone(), result });
        }
        debug!(registered = self.registry.len(), domains = ?self.registry.domains(), "registry after startup");
        InitReport { outcomes }
    }

    /// Inspect persisted state without building anything.
    pub async fn inspect(&self, domain: &Domain) -> anyhow::Result<PersistedState> {
        let dir = self.domain_dir(&domain.name);
        if !dir.is_dir() {
            return Ok(PersistedState::Invalid("no persisted index".to_string()));
        }
        let store = self.connector.connect(&dir).await?;
        self.validate(domain, store.as_ref(), &dir.join(MANIFEST_FILE)).await
    }

    async fn ensure_inner(&self, domain: &Domain) -> Result<IndexHandle> {
        let name = &domain.name;
        let build_err = |source: anyhow::Error| Error::IndexBuild { domain: name.clone(), source };

        let dir = self.domain_dir(name);
        fs::create_dir_all(&dir)
            .map_err(|e| build_err(anyhow::Error::new(e).context(format!("creating {}", dir.display()))))?;
        let store = self.connector.connect(&dir).await.map_err(build_err)?;
        let manifest_path = dir.join(MANIFEST_FILE);

        match self.validate(domain, store.as_ref(), &manifest_path).await {
            Ok(PersistedState::Valid(manifest)) => match self.load(domain, store.as_ref(), &manifest).await {
                Ok(handle) => return Ok(handle),
                Err(e) => warn!(domain = %name, error = %e, "persisted index unusable, rebuilding"),
            },
            Ok(PersistedState::Invalid(reason)) => info!(domain = %name, %reason, "rebuilding index"),
            Err(e) => {
                let error = format!("{e:#}");
                warn!(domain = %name, %error, "validity check failed, treating index as invalid");
            }
        }

        self.rebuild(domain, store.as_ref(), &manifest_path).await
    }

    async fn validate(&self, domain: &Domain, store: &dyn VectorStore, manifest_path: &Path) -> anyhow::Result<PersistedState> {
        let has_collection = store.list_collections().await?.iter().any(|c| c == &domain.name);
        let has_manifest = manifest_path.exists();
        let missing = match (has_collection, has_manifest) {
            (true, true) => None,
            (false, false) => Some("no persisted index"),
            (true, false) => Some("collection present without manifest"),
            (false, true) => Some("manifest present without collection"),
        };
        if let Some(reason) = missing {
            return Ok(PersistedState::Invalid(reason.to_string()));
        }

        let manifest = IndexManifest::load(manifest_path)?;
        if let Some(reason) = manifest.incompatibility(domain, self.embedder.as_ref()) {
            return Ok(PersistedState::Invalid(format!("stale index: {reason}")));
        }
        match corpus_digest(&domain.corpus) {
            Ok(digest) if digest != manifest.corpus_digest => {
                return Ok(PersistedState::Invalid("stale index: corpus changed since last build".to_string()));
            }
            Ok(_) => {}
            // Unreadable corpus: keep serving what was built from it.
            Err(e) => debug!(domain = %domain.name, error = %e, "corpus not hashable, skipping staleness check"),
        }
        Ok(PersistedState::Valid(manifest))
    }

    async fn load(&self, domain: &Domain, store: &dyn VectorStore, manifest: &IndexManifest) -> Result<IndexHandle> {
        let load_err = |reason: String| Error::IndexLoad { domain: domain.name.clone(), reason };

        let collection = store.get_collection(&domain.name).await.map_err(|e| load_err(format!("{e:#}")))?;
        let count = collection.count().await.map_err(|e| load_err(format!("{e:#}")))?;
        if count != manifest.document_count {
            return Err(load_err(format!(
                "collection holds {count} documents, manifest records {}",
                manifest.document_count
            )));
        }
        info!(domain = %domain.name, documents = count, built_at = %manifest.built_at, "loaded persisted index");
        Ok(self.handle(domain, collection, count, IndexOrigin::Loaded))
    }

    async fn rebuild(&self, domain: &Domain, store: &dyn VectorStore, manifest_path: &Path) -> Result<IndexHandle> {
        let name = &domain.name;
        let build_err = |source: anyhow::Error| Error::IndexBuild { domain: name.clone(), source };

        store.delete_collection(name).await.map_err(build_err)?;
        remove_manifest(manifest_path).map_err(build_err)?;

        let corpus = self.loader.load_corpus(domain)?;
        if corpus.documents.is_empty() {
            return Err(Error::EmptyCorpus { domain: name.clone() });
        }

        let collection = store.create_collection(name, self.embedder.dim()).await.map_err(build_err)?;
        self.embed_and_upsert(collection.as_ref(), &corpus.documents).await.map_err(build_err)?;

        let count = corpus.documents.len();
        IndexManifest::new(domain, self.embedder.as_ref(), count, corpus.digest)
            .save(manifest_path)
            .map_err(build_err)?;
        info!(domain = %name, documents = count, skipped = corpus.skipped, "built index");
        Ok(self.handle(domain, collection, count, IndexOrigin::Built))
    }

    async fn embed_and_upsert(&self, collection: &dyn Collection, documents: &[Document]) -> anyhow::Result<()> {
        let pb = ProgressBar::new(documents.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(collection.name().to_string());

        for batch in documents.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;
            ensure!(
                vectors.len() == batch.len(),
                "embedder returned {} vectors for {} documents",
                vectors.len(),
                batch.len()
            );
            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .map(|(doc, vector)| VectorRecord { id: doc.id.clone(), text: doc.text.clone(), vector })
                .collect();
            collection.upsert(&records).await?;
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();
        Ok(())
    }

    fn handle(&self, domain: &Domain, collection: Arc<dyn Collection>, document_count: usize, origin: IndexOrigin) -> IndexHandle {
        IndexHandle {
            domain: domain.name.clone(),
            collection,
            embedder: Arc::clone(&self.embedder),
            default_top_k: domain.top_k,
            document_count,
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub origin: IndexOrigin,
    pub document_count: usize,
}

#[derive(Debug)]
pub struct DomainOutcome {
    pub domain: String,
    pub result: Result<IndexSummary>,
}

/// Per-domain outcomes of [`IndexManager::ensure_all`], in input order.
#[derive(Debug, Default)]
pub struct InitReport {
    pub outcomes: Vec<DomainOutcome>,
}

impl InitReport {
    pub fn ready(&self) -> Vec<&str> {
        self.outcomes.iter().filter(|o| o.result.is_ok()).map(|o| o.domain.as_str()).collect()
    }

    pub fn failed(&self) -> Vec<(&str, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.domain.as_str(), e)))
            .collect()
    }

    pub fn all_ready(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn log(&self) {
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(summary) => info!(
                    domain = %outcome.domain,
                    origin = %summary.origin,
                    documents = summary.document_count,
                    "domain ready"
                ),
                Err(e) => warn!(domain = %outcome.domain, error = %e, "domain unavailable"),
            }
        }
        info!(ready = self.ready().len(), failed = self.failed().len(), "index initialization finished");
    }
}
