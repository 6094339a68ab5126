use anyhow::Result;
use async_trait::async_trait;
use lancedb::Table;

use lore_core::traits::Collection;
use lore_core::types::{ScoredDocument, VectorRecord};

use crate::search::nearest;
use crate::writer::upsert_records;

pub struct LanceCollection { table: Table, dim: usize }

impl LanceCollection {
    pub fn new(table: Table, dim: usize) -> Self { Self { table, dim } }
}

#[async_trait]
impl Collection for LanceCollection {
    fn name(&self) -> &str { self.table.name() }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        upsert_records(&self.table, self.dim, records).await
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.table.count_rows(None).await?)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        nearest(&self.table, query, k).await
    }
}
