use anyhow::{Context, Result};
use arrow_array::{Float32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};

use lore_core::types::{Document, ScoredDocument};
use crate::schema::{ID_COLUMN, TEXT_COLUMN};

/// Largest row limit Lance accepts.
const MAX_LIMIT: usize = i64::MAX as usize;

/// Cosine nearest neighbours of `query`, best first. Score is `1 - distance`.
pub async fn nearest(table: &Table, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
	let stream = table
		.vector_search(query.to_vec())?
		.distance_type(DistanceType::Cosine)
		.limit(k.min(MAX_LIMIT))
		.execute()
		.await
		.context("Failed to execute LanceDB vector search")?;
	let batches: Vec<RecordBatch> = stream.try_collect().await.context("Failed to collect search results")?;

	let mut hits = Vec::new();
	for batch in &batches { read_hits(batch, &mut hits)?; }
	hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
	hits.truncate(k);
	Ok(hits)
}

fn read_hits(batch: &RecordBatch, hits: &mut Vec<ScoredDocument>) -> Result<()> {
	let ids = string_column(batch, ID_COLUMN)?;
	let texts = string_column(batch, TEXT_COLUMN)?;
	let distances = batch
		.column_by_name("_distance")
		.context("Missing '_distance' column")?
		.as_any()
		.downcast_ref::<Float32Array>()
		.context("Failed to cast '_distance' to Float32Array")?;
	for i in 0..batch.num_rows() {
		hits.push(ScoredDocument {
			document: Document::new(ids.value(i), texts.value(i)),
			score: 1.0 - distances.value(i),
		});
	}
	Ok(())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.with_context(|| format!("Missing '{name}' column"))?
		.as_any()
		.downcast_ref::<StringArray>()
		.with_context(|| format!("Failed to cast '{name}' to StringArray"))
}
