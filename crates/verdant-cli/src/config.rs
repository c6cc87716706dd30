//! `verdant.toml` loading.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use verdant_core::SearchConfig;
use verdant_search::{Embedder, HashingEmbedder, HttpEmbedder};

/// Environment variable overriding `embedding.endpoint`.
pub const ENDPOINT_ENV: &str = "VERDANT_EMBEDDING_ENDPOINT";
/// Environment variable overriding `data_dir`.
pub const DATA_DIR_ENV: &str = "VERDANT_DATA_DIR";

#[derive(Debug, Deserialize)]
pub struct VerdantConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl Default for VerdantConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic in-process feature hashing.
    Hashing,
    /// External embedding service at `endpoint`.
    Http,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProvider,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_provider() -> EmbeddingProvider {
    EmbeddingProvider::Hashing
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl VerdantConfig {
    /// Parse a TOML document and apply environment overrides.
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let mut config: VerdantConfig = toml::from_str(raw)?;
        config.apply_env();
        config.search.validate()?;
        Ok(config)
    }

    /// Read `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Self::from_toml(&raw)
                .with_context(|| format!("Invalid config file '{}'", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                let mut config = Self::default();
                config.apply_env();
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            )),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                self.embedding.endpoint = Some(endpoint);
            }
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Directory holding persisted generations.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// Instantiate the configured embedder.
    pub fn embedder(&self) -> anyhow::Result<Arc<dyn Embedder>> {
        let dimension = self.search.vector_dimension;
        match self.embedding.provider {
            EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(dimension))),
            EmbeddingProvider::Http => {
                let endpoint = self.embedding.endpoint.clone().ok_or_else(|| {
                    anyhow::anyhow!(
                        "embedding.provider = \"http\" needs embedding.endpoint or {ENDPOINT_ENV}"
                    )
                })?;
                let embedder = HttpEmbedder::new(
                    endpoint,
                    dimension,
                    Duration::from_millis(self.embedding.request_timeout_ms),
                )?;
                Ok(Arc::new(embedder))
            }
        }
    }
}
