//! Embedding providers for the lore index.
//!
//! `build_embedder` picks the provider from configuration. Setting
//! `APP_USE_FAKE_EMBEDDINGS=1` forces the [`HashEmbedder`] regardless of
//! configuration, for fast and deterministic runs without model files.
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use lore_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use lore_core::traits::Embedder;

mod hash;
mod model;
mod pool;

pub use hash::HashEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_embeddings_requested() || settings.provider == EmbeddingProviderKind::Hash {
        info!(dim = settings.dimension, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dimension)));
    }
    Ok(Arc::new(BgeM3Embedder::load(settings.model_dir.as_deref(), settings.dimension)?))
}

fn fake_embeddings_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}
