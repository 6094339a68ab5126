//! Per-domain index lifecycle and retrieval routing.
//!
//! Startup: build an [`IndexManager`], call [`IndexManager::ensure_all`] once,
//! then freeze it with [`IndexManager::into_registry`] and hand the registry to
//! a [`RetrievalRouter`] that serves queries concurrently.

pub mod manager;
pub mod manifest;
pub mod registry;
pub mod router;

pub use manager::{DomainOutcome, IndexManager, IndexSummary, InitReport, PersistedState};
pub use manifest::{IndexManifest, MANIFEST_FILE};
pub use registry::{IndexHandle, IndexOrigin, IndexRegistry};
pub use router::{RetrievalResult, RetrievalRouter};
