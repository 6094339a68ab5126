use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use lore_core::traits::{Collection, StoreConnector, VectorStore};
use lore_core::types::{Domain, RecordSchema, ScoredDocument, VectorRecord};
use lore_core::Error;
use lore_embed::HashEmbedder;
use lore_index::{IndexManager, IndexOrigin, PersistedState, RetrievalRouter, MANIFEST_FILE};
use lore_vector::{LanceConnector, LanceStore};

const DIM: usize = 64;

struct Workspace {
    tmp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self { tmp: TempDir::new().unwrap() }
    }

    fn root(&self) -> PathBuf {
        self.tmp.path().join("index_store")
    }

    fn corpus(&self, file: &str, records: Value) -> PathBuf {
        let path = self.tmp.path().join(file);
        std::fs::write(&path, serde_json::to_string_pretty(&records).unwrap()).unwrap();
        path
    }

    fn manager(&self) -> IndexManager {
        self.manager_with_dim(DIM)
    }

    fn manager_with_dim(&self, dim: usize) -> IndexManager {
        IndexManager::new(self.root(), Arc::new(HashEmbedder::new(dim)), Arc::new(LanceConnector)).with_batch_size(2)
    }

    fn riddles(&self) -> Domain {
        let corpus = self.corpus("riddles.json", json!([{"instruction": "What flies without wings?", "output": "Time"}]));
        Domain::new("riddles", corpus, RecordSchema::question_answer("问题", "回答"))
    }

    fn magic(&self) -> Domain {
        let corpus = self.corpus(
            "magic.json",
            json!([
                {"spell": "Lumos", "effect": "produces light at the wand tip"},
                {"spell": "Nox", "effect": "ends the light of Lumos"},
                {"spell": "Accio", "effect": "summons an object"},
                {"spell": "Alohomora", "effect": "unlocks doors"}
            ]),
        );
        Domain::new("magic", corpus, RecordSchema::attributes()).with_top_k(2)
    }
}

fn ids(result: &lore_index::RetrievalResult) -> BTreeSet<String> {
    result.documents().map(|d| d.id.clone()).collect()
}

#[tokio::test]
async fn riddles_scenario_returns_the_only_document() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let mut manager = ws.manager();

    let handle = manager.ensure(&ws.riddles()).await?;
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(handle.document_count, 1);
    assert!(manager.get("riddles").is_some());
    assert!(ws.root().join("riddles").join(MANIFEST_FILE).exists());

    let router = RetrievalRouter::new(manager.into_registry());
    let result = router.retrieve("riddles", "flies without wings", 3).await?;
    assert_eq!(result.len(), 1);
    assert_eq!(result.hits[0].document.id, "riddles_0");
    assert_eq!(result.hits[0].document.text, "问题: What flies without wings?\n回答: Time");
    assert_eq!(result.context, result.hits[0].document.text);
    Ok(())
}

#[tokio::test]
async fn retrieve_returns_at_most_top_k_in_descending_order() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let mut manager = ws.manager();
    manager.ensure(&ws.magic()).await?;
    let router = RetrievalRouter::new(manager.into_registry());

    let result = router.retrieve("magic", "light of Lumos", 3).await?;
    assert!(result.len() <= 3);
    assert!(result.hits.windows(2).all(|w| w[0].score >= w[1].score));

    let defaulted = router.retrieve_default("magic", "light of Lumos").await?;
    assert!(defaulted.len() <= 2);

    let all = router.retrieve("magic", "light", usize::MAX).await?;
    assert_eq!(all.len(), 4);
    assert_eq!(router.retrieve("magic", "light", 1 << 40).await?.len(), 4);

    let none = router.retrieve("magic", "light", 0).await?;
    assert!(none.is_empty());
    assert_eq!(none.context, "");
    Ok(())
}

#[tokio::test]
async fn second_ensure_loads_persisted_state() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let magic = ws.magic();

    let mut first = ws.manager();
    first.ensure(&magic).await?;
    let before = RetrievalRouter::new(first.into_registry()).retrieve("magic", "unlocks doors", 3).await?;

    let mut second = ws.manager();
    let handle = second.ensure(&magic).await?;
    assert_eq!(handle.origin, IndexOrigin::Loaded);
    assert_eq!(handle.document_count, 4);
    let after = RetrievalRouter::new(second.into_registry()).retrieve("magic", "unlocks doors", 3).await?;

    assert_eq!(ids(&before), ids(&after));
    Ok(())
}

#[tokio::test]
async fn missing_manifest_forces_rebuild() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let magic = ws.magic();
    ws.manager().ensure(&magic).await?;

    std::fs::remove_file(ws.root().join("magic").join(MANIFEST_FILE))?;

    let handle = ws.manager().ensure(&magic).await?;
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(handle.collection.count().await?, 4);
    Ok(())
}

#[tokio::test]
async fn missing_collection_forces_rebuild() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let magic = ws.magic();
    ws.manager().ensure(&magic).await?;

    LanceStore::open(&ws.root().join("magic")).await?.delete_collection("magic").await?;

    let handle = ws.manager().ensure(&magic).await?;
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(handle.document_count, 4);
    Ok(())
}

#[tokio::test]
async fn row_count_mismatch_falls_back_to_rebuild() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let magic = ws.magic();
    ws.manager().ensure(&magic).await?;

    let extra = VectorRecord { id: "magic_99".into(), text: "stray".into(), vector: HashEmbedder::new(DIM).embed_text("stray") };
    let store = LanceStore::open(&ws.root().join("magic")).await?;
    store.get_collection("magic").await?.upsert(&[extra]).await?;

    let handle = ws.manager().ensure(&magic).await?;
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(handle.collection.count().await?, 4);
    Ok(())
}

#[tokio::test]
async fn embedder_change_forces_rebuild() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let magic = ws.magic();
    ws.manager_with_dim(DIM).ensure(&magic).await?;

    let handle = ws.manager_with_dim(32).ensure(&magic).await?;
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(handle.embedder.dim(), 32);
    Ok(())
}

#[tokio::test]
async fn corpus_change_forces_rebuild() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let riddles = ws.riddles();
    ws.manager().ensure(&riddles).await?;

    ws.corpus(
        "riddles.json",
        json!([
            {"instruction": "What flies without wings?", "output": "Time"},
            {"instruction": "What has keys but no locks?", "output": "A piano"}
        ]),
    );

    let handle = ws.manager().ensure(&riddles).await?;
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(handle.document_count, 2);
    Ok(())
}

#[tokio::test]
async fn empty_corpus_leaves_domain_absent() {
    let ws = Workspace::new();
    let corpus = ws.corpus("empty.json", json!([]));
    let domain = Domain::new("empty", corpus, RecordSchema::attributes());
    let mut manager = ws.manager();

    let err = manager.ensure(&domain).await.unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus { ref domain } if domain == "empty"));
    assert!(manager.get("empty").is_none());
}

#[tokio::test]
async fn failed_ensure_unregisters_a_previously_ready_domain() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let riddles = ws.riddles();
    let mut manager = ws.manager();
    manager.ensure(&riddles).await?;

    ws.corpus("riddles.json", json!([{"instruction": "", "output": ""}]));

    assert!(matches!(manager.ensure(&riddles).await, Err(Error::EmptyCorpus { .. })));
    assert!(manager.get("riddles").is_none());
    Ok(())
}

#[tokio::test]
async fn one_failing_domain_does_not_block_others() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let missing = Domain::new("herbs", ws.tmp.path().join("herbs.json"), RecordSchema::attributes());
    let domains = vec![missing, ws.riddles()];
    let mut manager = ws.manager();

    let report = manager.ensure_all(&domains).await;
    assert_eq!(report.ready(), ["riddles"]);
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "herbs");
    assert!(matches!(failed[0].1, Error::CorpusRead { .. }));
    assert!(!report.all_ready());
    assert!(manager.registry().contains("riddles"));
    assert!(!manager.registry().contains("herbs"));
    assert_eq!(manager.registry().domains(), ["riddles"]);
    assert_eq!(manager.registry().len(), 1);

    let router = RetrievalRouter::new(manager.into_registry());
    assert!(matches!(router.retrieve("herbs", "mint", 3).await, Err(Error::DomainNotReady(ref d)) if d == "herbs"));
    assert_eq!(router.retrieve("riddles", "wings", 3).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn skipped_records_never_appear_in_results() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let corpus = ws.corpus(
        "minecraft.json",
        json!([
            {"item": "Torch", "recipe": "stick and coal"},
            {"item": ""},
            "not a record",
            {"item": "Crafting Table", "recipe": "four planks"}
        ]),
    );
    let domain = Domain::new("minecraft", corpus, RecordSchema::attributes());
    let mut manager = ws.manager();
    let handle = manager.ensure(&domain).await?;
    assert_eq!(handle.document_count, 2);

    let router = RetrievalRouter::new(manager.into_registry());
    let result = router.retrieve("minecraft", "item", 10).await?;
    assert_eq!(ids(&result), BTreeSet::from(["minecraft_0".to_string(), "minecraft_3".to_string()]));
    Ok(())
}

#[tokio::test]
async fn unknown_domain_is_not_ready() {
    let router = RetrievalRouter::new(Arc::new(lore_index::IndexRegistry::new()));
    let err = router.retrieve("unknown_domain", "x", 3).await.unwrap_err();
    assert!(matches!(err, Error::DomainNotReady(ref d) if d == "unknown_domain"));
    assert_eq!(err.to_string(), "Index for domain 'unknown_domain' is not initialized");
    assert!(router.retrieve_default("unknown_domain", "x").await.is_err());
}

/// Store whose listing always fails; every other call goes through.
struct UnlistableStore(Arc<dyn VectorStore>);

#[async_trait]
impl VectorStore for UnlistableStore {
    async fn list_collections(&self) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("listing unavailable")
    }
    async fn create_collection(&self, name: &str, dim: usize) -> anyhow::Result<Arc<dyn Collection>> {
        self.0.create_collection(name, dim).await
    }
    async fn delete_collection(&self, name: &str) -> anyhow::Result<()> {
        self.0.delete_collection(name).await
    }
    async fn get_collection(&self, name: &str) -> anyhow::Result<Arc<dyn Collection>> {
        self.0.get_collection(name).await
    }
}

struct UnlistableConnector;

#[async_trait]
impl StoreConnector for UnlistableConnector {
    async fn connect(&self, dir: &Path) -> anyhow::Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(UnlistableStore(LanceConnector.connect(dir).await?)))
    }
}

#[tokio::test]
async fn failing_validity_check_is_treated_as_invalid() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let magic = ws.magic();
    ws.manager().ensure(&magic).await?;

    let mut manager = IndexManager::new(ws.root(), Arc::new(HashEmbedder::new(DIM)), Arc::new(UnlistableConnector));
    let handle = manager.ensure(&magic).await?;
    assert_eq!(handle.origin, IndexOrigin::Built);
    assert_eq!(handle.collection.count().await?, 4);
    Ok(())
}

#[tokio::test]
async fn inspect_reports_persisted_state_without_building() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let magic = ws.magic();
    let mut manager = ws.manager();

    assert!(matches!(manager.inspect(&magic).await?, PersistedState::Invalid(_)));
    assert!(!ws.root().join("magic").exists());

    manager.ensure(&magic).await?;
    match manager.inspect(&magic).await? {
        PersistedState::Valid(manifest) => {
            assert_eq!(manifest.document_count, 4);
            assert_eq!(manifest.embedder_id, format!("hash:xxh64:d{DIM}"));
        }
        PersistedState::Invalid(reason) => panic!("expected valid state, got {reason}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retrieves_share_one_router() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let mut manager = ws.manager();
    let report = manager.ensure_all(&[ws.magic(), ws.riddles()]).await;
    assert!(report.all_ready());
    let router = RetrievalRouter::new(manager.into_registry());

    let tasks: Vec<_> = ["light", "doors", "wings", "summons"]
        .into_iter()
        .enumerate()
        .map(|(i, query)| {
            let router = router.clone();
            let domain = if i == 2 { "riddles" } else { "magic" };
            tokio::spawn(async move { router.retrieve(domain, query, 2).await })
        })
        .collect();

    for task in tasks {
        let result = task.await??;
        assert!(!result.is_empty() && result.len() <= 2);
    }
    Ok(())
}

/// Collection whose searches always fail, counting each attempt.
struct OfflineSearch {
    inner: Arc<dyn Collection>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Collection for OfflineSearch {
    fn name(&self) -> &str {
        self.inner.name()
    }
    async fn upsert(&self, records: &[VectorRecord]) -> anyhow::Result<()> {
        self.inner.upsert(records).await
    }
    async fn count(&self) -> anyhow::Result<usize> {
        self.inner.count().await
    }
    async fn search(&self, _query: &[f32], _k: usize) -> anyhow::Result<Vec<ScoredDocument>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("search backend offline")
    }
}

/// Faults injected into a Lance store: creating one named collection is
/// refused, and optionally no collection handed out can search.
#[derive(Clone, Default)]
struct Faults {
    refuse_create: Option<&'static str>,
    search_attempts: Option<Arc<AtomicUsize>>,
}

struct FaultyStore {
    inner: Arc<dyn VectorStore>,
    faults: Faults,
}

impl FaultyStore {
    fn wrap(&self, collection: Arc<dyn Collection>) -> Arc<dyn Collection> {
        match &self.faults.search_attempts {
            Some(attempts) => Arc::new(OfflineSearch { inner: collection, attempts: Arc::clone(attempts) }),
            None => collection,
        }
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    async fn list_collections(&self) -> anyhow::Result<Vec<String>> {
        self.inner.list_collections().await
    }
    async fn create_collection(&self, name: &str, dim: usize) -> anyhow::Result<Arc<dyn Collection>> {
        if self.faults.refuse_create == Some(name) {
            anyhow::bail!("disk full while creating '{name}'");
        }
        Ok(self.wrap(self.inner.create_collection(name, dim).await?))
    }
    async fn delete_collection(&self, name: &str) -> anyhow::Result<()> {
        self.inner.delete_collection(name).await
    }
    async fn get_collection(&self, name: &str) -> anyhow::Result<Arc<dyn Collection>> {
        Ok(self.wrap(self.inner.get_collection(name).await?))
    }
}

struct FaultyConnector(Faults);

#[async_trait]
impl StoreConnector for FaultyConnector {
    async fn connect(&self, dir: &Path) -> anyhow::Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(FaultyStore { inner: LanceConnector.connect(dir).await?, faults: self.0.clone() }))
    }
}

#[tokio::test]
async fn search_failure_surfaces_as_retrieval_error_without_retry() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let faults = Faults { search_attempts: Some(Arc::clone(&attempts)), ..Faults::default() };
    let mut manager = IndexManager::new(ws.root(), Arc::new(HashEmbedder::new(DIM)), Arc::new(FaultyConnector(faults)));
    manager.ensure(&ws.riddles()).await?;
    let router = RetrievalRouter::new(manager.into_registry());

    let err = router.retrieve("riddles", "wings", 3).await.unwrap_err();
    assert!(matches!(err, Error::Retrieval { ref domain, .. } if domain == "riddles"));
    assert!(err.to_string().contains("search backend offline"), "got {err}");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn store_failure_during_build_only_fails_that_domain() -> anyhow::Result<()> {
    let ws = Workspace::new();
    let faults = Faults { refuse_create: Some("magic"), ..Faults::default() };
    let mut manager = IndexManager::new(ws.root(), Arc::new(HashEmbedder::new(DIM)), Arc::new(FaultyConnector(faults)));

    let report = manager.ensure_all(&[ws.magic(), ws.riddles()]).await;

    assert_eq!(report.ready(), ["riddles"]);
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert!(matches!(failed[0].1, Error::IndexBuild { domain, .. } if domain == "magic"));
    assert!(failed[0].1.to_string().contains("disk full"), "got {}", failed[0].1);
    assert!(!ws.root().join("magic").join(MANIFEST_FILE).exists());

    let router = RetrievalRouter::new(manager.into_registry());
    assert!(matches!(router.retrieve("magic", "light", 2).await, Err(Error::DomainNotReady(_))));
    assert_eq!(router.retrieve("riddles", "wings", 2).await?.len(), 1);
    Ok(())
}
