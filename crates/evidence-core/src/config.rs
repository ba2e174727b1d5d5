//! Configuration loader, typed engine settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_FUSION__WEIGHTS__DENSE=0.6`).
//! Every setting has a default, so an empty configuration is valid.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{SearchMode, SourceKind, SourceScores};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Loads the config files found in `dir`; relative data paths resolve
    /// against `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment, base_dir: &Path) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extracts and validates the engine settings.
    pub fn settings(&self) -> Result<EngineSettings> {
        let settings: EngineSettings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn resolve_path<S: AsRef<str>>(&self, p: S) -> PathBuf {
        resolve_with_base(&self.base_dir, p)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        if matches!(env, "prod" | "production") {
            let use_fake: bool = self.get("embedding.use_fake").unwrap_or(false);
            if use_fake {
                anyhow::bail!("embedding.use_fake must not be enabled in production");
            }
        }
        Ok(())
    }
}

/// Relative weight of each source in the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub dense: f64,
    pub lexical: f64,
    pub structured: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self { dense: 0.5, lexical: 0.3, structured: 0.2 }
    }
}

impl FusionWeights {
    pub fn new(dense: f64, lexical: f64, structured: f64) -> Self {
        Self { dense, lexical, structured }
    }

    pub fn get(&self, kind: SourceKind) -> f64 {
        match kind {
            SourceKind::Dense => self.dense,
            SourceKind::Lexical => self.lexical,
            SourceKind::Structured => self.structured,
        }
    }

    /// Rescales to sum to 1. Only the ratios between weights matter.
    pub fn normalized(&self) -> Result<Self> {
        let all = [self.dense, self.lexical, self.structured];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidConfig(format!(
                "fusion weights must be finite and non-negative, got {}/{}/{}",
                self.dense, self.lexical, self.structured
            )));
        }
        let sum: f64 = all.iter().sum();
        if sum <= 0.0 {
            return Err(Error::InvalidConfig("fusion weights must not all be zero".into()));
        }
        Ok(Self { dense: self.dense / sum, lexical: self.lexical / sum, structured: self.structured / sum })
    }

    pub fn composite(&self, scores: &SourceScores) -> f64 {
        SourceKind::ALL.iter().map(|k| self.get(*k) * scores.get(*k)).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub weights: FusionWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub dense_top_k: usize,
    pub lexical_top_k: usize,
    pub structured_top_k: usize,
    /// Candidates requested from every source in depth mode.
    pub depth_candidates_per_source: usize,
    pub timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { dense_top_k: 10, lexical_top_k: 10, structured_top_k: 10, depth_candidates_per_source: 20, timeout_ms: 2000 }
    }
}

impl RetrievalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn top_k(&self, source: SourceKind, mode: SearchMode) -> usize {
        let fast = match source {
            SourceKind::Dense => self.dense_top_k,
            SourceKind::Lexical => self.lexical_top_k,
            SourceKind::Structured => self.structured_top_k,
        };
        match mode {
            SearchMode::Fast => fast,
            SearchMode::Depth => fast.max(self.depth_candidates_per_source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeSettings {
    pub fast_results: usize,
    pub depth_results: usize,
    /// Total queries issued in depth mode, the original included.
    pub depth_reformulations: usize,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self { fast_results: 5, depth_results: 10, depth_reformulations: 3 }
    }
}

impl ModeSettings {
    pub fn results(&self, mode: SearchMode) -> usize {
        match mode {
            SearchMode::Fast => self.fast_results,
            SearchMode::Depth => self.depth_results,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    #[default]
    Lru,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub capacity: u64,
    pub eviction: EvictionPolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { capacity: 256, eviction: EvictionPolicy::Lru }
    }
}

/// Locations of the prebuilt indexes and the relational store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub tantivy_index_dir: String,
    pub lancedb_uri: String,
    pub lancedb_table: String,
    pub sqlite_path: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            tantivy_index_dir: "data/index/tantivy".to_string(),
            lancedb_uri: "data/index/lancedb".to_string(),
            lancedb_table: "chunks".to_string(),
            sqlite_path: "data/evidence.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: Option<String>,
    pub use_fake: bool,
    pub dim: usize,
    pub max_len: usize,
    /// Prepended to queries for models trained with role prefixes (E5).
    pub query_prefix: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, use_fake: false, dim: 1024, max_len: 512, query_prefix: "query: ".to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub fusion: FusionSettings,
    pub retrieval: RetrievalSettings,
    pub modes: ModeSettings,
    pub cache: CacheSettings,
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        self.fusion.weights.normalized()?;
        let r = &self.retrieval;
        if r.dense_top_k == 0 || r.lexical_top_k == 0 || r.structured_top_k == 0 || r.depth_candidates_per_source == 0 {
            return Err(Error::InvalidConfig("per-source top_k values must be > 0".into()));
        }
        if r.timeout_ms == 0 {
            return Err(Error::InvalidConfig("retrieval.timeout_ms must be > 0".into()));
        }
        if self.modes.fast_results == 0 || self.modes.depth_results == 0 {
            return Err(Error::InvalidConfig("result counts must be > 0".into()));
        }
        if self.modes.depth_reformulations == 0 {
            return Err(Error::InvalidConfig("modes.depth_reformulations must be >= 1".into()));
        }
        if self.cache.capacity == 0 {
            return Err(Error::InvalidConfig("cache.capacity must be > 0".into()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be > 0".into()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
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
