//! Auxiliary metadata persisted next to a domain's collection.
//!
//! The manifest's presence is half of the validity signal for persisted state
//! (the other half is the collection itself). It also records which embedder
//! built the collection and a digest of the corpus it was built from, so a
//! model or corpus change forces a rebuild instead of serving stale vectors.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use lore_core::traits::Embedder;
use lore_core::types::Domain;

pub const MANIFEST_FILE: &str = "index_meta.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub domain: String,
    pub collection: String,
    pub embedder_id: String,
    pub dimension: usize,
    pub document_count: usize,
    /// BLAKE3 hex digest of the corpus file at build time.
    pub corpus_digest: String,
    /// RFC 3339 UTC build timestamp.
    pub built_at: String,
}

impl IndexManifest {
    pub fn new(domain: &Domain, embedder: &dyn Embedder, document_count: usize, corpus_digest: String) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            domain: domain.name.clone(),
            collection: domain.name.clone(),
            embedder_id: embedder.embedder_id().to_string(),
            dimension: embedder.dim(),
            document_count,
            corpus_digest,
            built_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }

    /// Write through a temporary sibling and rename, so readers never see a partial file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }

    /// Why this manifest cannot serve `domain` with `embedder`, if it cannot.
    pub fn incompatibility(&self, domain: &Domain, embedder: &dyn Embedder) -> Option<String> {
        if self.format_version != FORMAT_VERSION {
            return Some(format!("manifest format {} (expected {})", self.format_version, FORMAT_VERSION));
        }
        if self.collection != domain.name {
            return Some(format!("manifest names collection '{}'", self.collection));
        }
        if self.embedder_id != embedder.embedder_id() {
            return Some(format!("built with embedder '{}', configured '{}'", self.embedder_id, embedder.embedder_id()));
        }
        if self.dimension != embedder.dim() {
            return Some(format!("built with dimension {}, configured {}", self.dimension, embedder.dim()));
        }
        None
    }
}

/// Remove the manifest if present; absence is not an error.
pub fn remove_manifest(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}
