//! LanceDB-backed vector store for the lore index.
//!
//! One LanceDB database per domain directory, one table per collection with
//! the schema `id: Utf8, text: Utf8, vector: FixedSizeList<Float32, D>`.
//! Similarity is cosine; scores are `1 - distance`, higher is better.

pub mod collection;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use collection::LanceCollection;
pub use table::{open_db, LanceConnector, LanceStore};
