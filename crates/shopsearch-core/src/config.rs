//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_SEARCH__TEXT_THRESHOLD=0.2`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::Modality;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extracts and validates the full typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub search: SearchSettings,
    pub indexing: IndexingSettings,
    pub models: ModelSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.indexing.validate()
    }

    /// `models.use_fake`, or the legacy `APP_USE_FAKE_EMBEDDINGS=1` switch.
    pub fn use_fake_models(&self) -> bool {
        self.models.use_fake
            || env::var("APP_USE_FAKE_EMBEDDINGS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false)
    }
}

/// Filesystem layout. Relative paths resolve against `project_root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub project_root: String,
    pub catalog_csv: String,
    pub vector_db_dir: String,
    pub table_name: String,
    pub clip_model_dir: String,
    pub reranker_model_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            project_root: ".".to_string(),
            catalog_csv: "data/processed_products.csv".to_string(),
            vector_db_dir: "data/lancedb".to_string(),
            table_name: "amazon_products".to_string(),
            clip_model_dir: "models/clip-vit-base-patch32".to_string(),
            reranker_model_dir: "models/ms-marco-MiniLM-L-6-v2".to_string(),
        }
    }
}

impl PathSettings {
    pub fn root(&self) -> PathBuf {
        expand_path(&self.project_root)
    }

    pub fn resolve(&self, p: &str) -> PathBuf {
        resolve_with_base(&self.root(), p)
    }
}

/// Retrieval sizes, confidence policy and per-stage timeouts.
///
/// Image-to-image cosine scores run much higher than cross-modal
/// text-to-image scores, hence the two floors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub top_k_retrieval: usize,
    pub top_k_final: usize,
    pub text_threshold: f32,
    pub image_threshold: f32,
    /// Rank-1 minus rank-2 gap above which only the leader is kept.
    pub leader_margin: f32,
    pub embed_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
    pub rerank: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k_retrieval: 20,
            top_k_final: 5,
            text_threshold: 0.15,
            image_threshold: 0.60,
            leader_margin: 0.10,
            embed_timeout_ms: 10_000,
            query_timeout_ms: 5_000,
            rerank_timeout_ms: 10_000,
            rerank: true,
        }
    }
}

impl SearchSettings {
    pub fn threshold_for(&self, modality: Modality) -> f32 {
        match modality {
            Modality::Text => self.text_threshold,
            Modality::Image => self.image_threshold,
        }
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn rerank_timeout(&self) -> Duration {
        Duration::from_millis(self.rerank_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k_final == 0 {
            return Err(Error::InvalidConfig("search.top_k_final must be > 0".into()));
        }
        if self.top_k_retrieval < self.top_k_final {
            return Err(Error::InvalidConfig(format!(
                "search.top_k_retrieval ({}) must be >= search.top_k_final ({})",
                self.top_k_retrieval, self.top_k_final
            )));
        }
        for (name, v) in [("text_threshold", self.text_threshold), ("image_threshold", self.image_threshold)] {
            if !v.is_finite() {
                return Err(Error::InvalidConfig(format!("search.{name} must be finite")));
            }
        }
        if !self.leader_margin.is_finite() || self.leader_margin < 0.0 {
            return Err(Error::InvalidConfig("search.leader_margin must be a finite value >= 0".into()));
        }
        if self.embed_timeout_ms == 0 || self.query_timeout_ms == 0 || self.rerank_timeout_ms == 0 {
            return Err(Error::InvalidConfig("search timeouts must be > 0 ms".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    /// Concurrent embedding jobs.
    pub workers: usize,
    /// Records per store upsert.
    pub batch_size: usize,
    /// Log a progress line every N indexed records.
    pub progress_every: usize,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self { workers: 4, batch_size: 256, progress_every: 50 }
    }
}

impl IndexingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("indexing.workers must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("indexing.batch_size must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub use_fake: bool,
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
