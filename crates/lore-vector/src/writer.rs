use anyhow::{Result, ensure};
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use lancedb::Table;
use std::sync::Arc;

use lore_core::types::VectorRecord;
use crate::schema::build_arrow_schema;

/// Rows per Arrow batch handed to Lance.
const BATCH_SIZE: usize = 1000;

/// Insert new ids and overwrite existing ones. An empty table takes a plain append.
pub async fn upsert_records(table: &Table, dim: usize, records: &[VectorRecord]) -> Result<()> {
	if records.is_empty() { return Ok(()); }
	for r in records {
		ensure!(r.vector.len() == dim, "record '{}' has {} dimensions, collection expects {}", r.id, r.vector.len(), dim);
	}
	let schema = build_arrow_schema(dim);
	let batches = records
		.chunks(BATCH_SIZE)
		.map(|chunk| records_to_batch(chunk, dim))
		.collect::<Result<Vec<_>>>()?;
	let reader = Box::new(RecordBatchIterator::new(batches.into_iter().map(Ok), schema));
	if table.count_rows(None).await? == 0 {
		table.add(reader).execute().await?;
	} else {
		let mut mi = table.merge_insert(&["id"]);
		mi.when_matched_update_all(None).when_not_matched_insert_all();
		mi.execute(reader).await?;
	}
	Ok(())
}

fn records_to_batch(records: &[VectorRecord], dim: usize) -> Result<RecordBatch> {
	let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
	let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
	let vectors = records.iter().map(|r| Some(r.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	let record_batch = RecordBatch::try_new(build_arrow_schema(dim), vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(texts)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim as i32)),
	])?;
	Ok(record_batch)
}
