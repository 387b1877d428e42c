//! Lightweight configuration loader and typed settings.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_MONGODB__URI`). Provides helpers to
//! expand `~` and `${VAR}` in user supplied paths.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::types::FusionWeights;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_in(Path::new("."), &env_name)
    }

    /// Load `config.toml` and the env-specific overlay from `dir`.
    pub fn load_in(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the full typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mongodb: MongoSettings,
    pub voyage: VoyageSettings,
    pub search: SearchSettings,
    pub retry: RetrySettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.mongodb.min_pool_size > self.mongodb.max_pool_size {
            return Err(Error::InvalidConfig(format!(
                "mongodb.min_pool_size ({}) exceeds max_pool_size ({})",
                self.mongodb.min_pool_size, self.mongodb.max_pool_size
            )));
        }
        if self.mongodb.embedding_field.trim().is_empty() {
            return Err(Error::InvalidConfig("mongodb.embedding_field must not be empty".into()));
        }
        let t = &self.search.timeouts;
        if [t.keyword_ms, t.text_ms, t.vector_ms, t.hybrid_ms].contains(&0) {
            return Err(Error::InvalidConfig("search.timeouts must be > 0".into()));
        }
        self.search.default_weights().validate().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if self.search.candidate_limit == 0 || self.search.num_candidates < self.search.candidate_limit {
            return Err(Error::InvalidConfig(
                "search.num_candidates must be >= search.candidate_limit > 0".into(),
            ));
        }
        let b = &self.search.text_boosts;
        if !(1..=2).contains(&b.name_max_edits) || !(1..=2).contains(&b.other_max_edits) {
            return Err(Error::InvalidConfig(format!(
                "search.text_boosts max_edits must be 1 or 2 (name {}, other {})",
                b.name_max_edits, b.other_max_edits
            )));
        }
        if self.search.max_page_size == 0 {
            return Err(Error::InvalidConfig("search.max_page_size must be > 0".into()));
        }
        if self.voyage.dimensions == 0 || self.voyage.timeout_ms == 0 {
            return Err(Error::InvalidConfig("voyage.dimensions and voyage.timeout_ms must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry.max_attempts must be >= 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub text_index: String,
    pub vector_index: String,
    pub embedding_field: String,
    pub max_pool_size: u32,
    pub min_pool_size: u32,
    pub server_selection_timeout_ms: u64,
    pub app_name: String,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "catalog".to_string(),
            collection: "products".to_string(),
            text_index: "default".to_string(),
            vector_index: "vector_index".to_string(),
            embedding_field: "textEmbeddingVector".to_string(),
            max_pool_size: 50,
            min_pool_size: 10,
            server_selection_timeout_ms: 5000,
            app_name: "catalog-search".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoyageSettings {
    pub api_url: String,
    /// No key means no embedding capability: strategies 3/4 are refused.
    pub api_key: Option<String>,
    pub model: String,
    pub rerank_model: String,
    /// Length of the vectors returned by `model`.
    pub dimensions: usize,
    pub timeout_ms: u64,
}

impl Default for VoyageSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.voyageai.com/v1".to_string(),
            api_key: None,
            model: "voyage-3-lite".to_string(),
            rerank_model: "rerank-2-lite".to_string(),
            dimensions: 512,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPolicy {
    /// One unmappable document fails the whole request.
    #[default]
    FailFast,
    /// Unmappable documents are logged and dropped from the page.
    SkipInvalid,
}

/// Per-field boosts and edit distances for the full-text compound clause.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextBoosts {
    pub name: f64,
    pub brand: f64,
    pub category: f64,
    pub sub_category: f64,
    pub name_max_edits: u8,
    pub other_max_edits: u8,
}

impl Default for TextBoosts {
    fn default() -> Self {
        Self { name: 0.8, brand: 0.1, category: 0.06, sub_category: 0.04, name_max_edits: 2, other_max_edits: 1 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTimeouts {
    pub keyword_ms: u64,
    pub text_ms: u64,
    pub vector_ms: u64,
    pub hybrid_ms: u64,
}

impl Default for StrategyTimeouts {
    fn default() -> Self {
        Self { keyword_ms: 4000, text_ms: 4000, vector_ms: 4500, hybrid_ms: 6000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub hybrid_weight_vector: f64,
    pub hybrid_weight_text: f64,
    /// Per-pipeline cap on candidates handed to rank fusion / k-NN.
    pub candidate_limit: u32,
    /// Nearest-neighbor candidate pool, over-fetched for recall.
    pub num_candidates: u32,
    pub max_page_size: u32,
    pub mapping_policy: MappingPolicy,
    pub text_boosts: TextBoosts,
    pub timeouts: StrategyTimeouts,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            hybrid_weight_vector: 0.5,
            hybrid_weight_text: 0.5,
            candidate_limit: 200,
            num_candidates: 200,
            max_page_size: 50,
            mapping_policy: MappingPolicy::FailFast,
            text_boosts: TextBoosts::default(),
            timeouts: StrategyTimeouts::default(),
        }
    }
}

impl SearchSettings {
    pub fn default_weights(&self) -> FusionWeights {
        FusionWeights { vector: self.hybrid_weight_vector, text: self.hybrid_weight_text }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter_percent: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 100, max_delay_ms: 1000, backoff_factor: 2.0, jitter_percent: 0.1 }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_factor,
            self.jitter_percent,
            self.max_attempts,
        )
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
