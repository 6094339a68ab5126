use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use lancedb::{connect, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use lore_core::traits::{Collection, StoreConnector, VectorStore};

use crate::collection::LanceCollection;
use crate::schema::{build_arrow_schema, vector_dim};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

/// A LanceDB database directory; each collection is one Lance table.
pub struct LanceStore { conn: Connection }

impl LanceStore {
    pub async fn open(dir: &Path) -> Result<Self> {
        let conn = open_db(dir.to_string_lossy().as_ref())
            .await
            .with_context(|| format!("Failed to connect to LanceDB at {}", dir.display()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl VectorStore for LanceStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.conn.table_names().execute().await?)
    }

    async fn create_collection(&self, name: &str, dim: usize) -> Result<Arc<dyn Collection>> {
        let table = self
            .conn
            .create_empty_table(name, build_arrow_schema(dim))
            .execute()
            .await
            .with_context(|| format!("Failed to create LanceDB table '{name}'"))?;
        debug!(collection = name, dim, "created collection");
        Ok(Arc::new(LanceCollection::new(table, dim)))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.list_collections().await?.iter().any(|n| n == name) { return Ok(()); }
        self.conn
            .drop_table(name, &[])
            .await
            .with_context(|| format!("Failed to drop LanceDB table '{name}'"))?;
        debug!(collection = name, "dropped collection");
        Ok(())
    }

    async fn get_collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        let table = self
            .conn
            .open_table(name)
            .execute()
            .await
            .with_context(|| format!("Failed to open LanceDB table '{name}'"))?;
        let schema = table.schema().await?;
        let dim = vector_dim(&schema).ok_or_else(|| anyhow!("table '{name}' has no fixed-size vector column"))?;
        Ok(Arc::new(LanceCollection::new(table, dim)))
    }
}

/// Opens a [`LanceStore`] inside each domain's persisted-index directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LanceConnector;

#[async_trait]
impl StoreConnector for LanceConnector {
    async fn connect(&self, dir: &Path) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(LanceStore::open(dir).await?))
    }
}
