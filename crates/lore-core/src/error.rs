use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The corpus file is missing or cannot be parsed. Fatal for that domain's build.
    #[error("Failed to read corpus for domain '{domain}' at {}: {reason}", .path.display())]
    CorpusRead {
        domain: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Corpus for domain '{domain}' produced no documents")]
    EmptyCorpus { domain: String },

    /// Persisted state exists but cannot be used; the manager rebuilds instead.
    #[error("Failed to load persisted index for domain '{domain}': {reason}")]
    IndexLoad { domain: String, reason: String },

    #[error("Failed to build index for domain '{domain}': {source:#}")]
    IndexBuild {
        domain: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Index for domain '{0}' is not initialized")]
    DomainNotReady(String),

    #[error("Retrieval failed for domain '{domain}': {source:#}")]
    Retrieval {
        domain: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    pub(crate) fn corpus_read(domain: &str, path: &std::path::Path, reason: impl ToString) -> Self {
        Self::CorpusRead { domain: domain.to_string(), path: path.to_path_buf(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
