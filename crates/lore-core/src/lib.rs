//! Shared vocabulary of the lore workspace: domain configuration, corpus
//! loading, error taxonomy and the traits the index layer is written against.

pub mod config;
pub mod error;
pub mod loader;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
