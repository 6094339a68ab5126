//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_DATA__PERSIST_DIR`). Provides helpers
//! to expand `~` and `${VAR}` and to resolve relative paths against the
//! directory holding the configuration file.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::Domain;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load the given file, its `<stem>.<env>.toml` sibling and `APP_*` overrides.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("config");

        let mut figment = Figment::new().merge(Toml::file(path));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join(format!("{stem}.dev.toml")))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join(format!("{stem}.prod.toml")))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join(format!("{stem}.test.toml")))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir })
    }

    /// Build a configuration from TOML text; relative paths resolve against `base_dir`.
    pub fn from_toml_str(toml: &str, base_dir: impl Into<PathBuf>) -> Self {
        Self { figment: Figment::new().merge(Toml::string(toml)), base_dir: base_dir.into() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed settings with paths resolved and invariants checked.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.resolve_paths(&self.base_dir);
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub domains: Vec<Domain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Root under which each domain gets its own persisted-index directory.
    #[serde(default = "default_persist_dir")]
    pub persist_dir: PathBuf,
    /// Base for relative corpus paths; defaults to the config directory.
    #[serde(default)]
    pub corpus_root: Option<PathBuf>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { persist_dir: default_persist_dir(), corpus_root: None }
    }
}

fn default_persist_dir() -> PathBuf { PathBuf::from("index_store") }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Local BGE-M3 model run through candle.
    BgeM3,
    /// Deterministic token hashing, for tests and offline development.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_dir: None,
            dimension: default_dimension(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_provider() -> EmbeddingProviderKind { EmbeddingProviderKind::BgeM3 }
fn default_dimension() -> usize { 1024 }
fn default_batch_size() -> usize { 32 }

impl Settings {
    fn resolve_paths(&mut self, base: &Path) {
        self.data.persist_dir = resolve_with_base(base, self.data.persist_dir.to_string_lossy());
        if let Some(dir) = self.embedding.model_dir.take() {
            self.embedding.model_dir = Some(resolve_with_base(base, dir.to_string_lossy()));
        }
        let corpus_base = self
            .data
            .corpus_root
            .take()
            .map(|root| resolve_with_base(base, root.to_string_lossy()))
            .unwrap_or_else(|| base.to_path_buf());
        for domain in &mut self.domains {
            domain.corpus = resolve_with_base(&corpus_base, domain.corpus.to_string_lossy());
        }
        self.data.corpus_root = Some(corpus_base);
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.embedding.dimension == 0 {
            return Err(Error::InvalidConfig("embedding.dimension must be positive".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be positive".into()));
        }
        let mut seen = HashSet::new();
        for domain in &self.domains {
            if domain.name.trim().is_empty() {
                return Err(Error::InvalidConfig("domain name must not be empty".into()));
            }
            // Names double as directory and LanceDB table names.
            let valid_chars = domain.name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
            if !valid_chars || domain.name.starts_with('.') {
                return Err(Error::InvalidConfig(format!(
                    "domain name '{}' may only use ASCII letters, digits, '_', '-' and '.', and must not start with '.'",
                    domain.name
                )));
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(Error::InvalidConfig(format!("domain '{}' is configured twice", domain.name)));
            }
            if domain.top_k == 0 {
                return Err(Error::InvalidConfig(format!("domain '{}' has top_k = 0", domain.name)));
            }
        }
        Ok(())
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name == name)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
