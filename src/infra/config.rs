// src/infra/config.rs - Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Workflow definition file. The embedded default is used when unset.
    pub workflow: Option<String>,
    /// Wall-clock budget for one run (0 = no deadline).
    pub timeout_seconds: u64,
    /// Consult the prompt cache before running any step.
    pub use_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflow: None,
            timeout_seconds: 300,
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub similarity_threshold: f64,
    /// SQLite file backing the cache; defaults to `<data_dir>/moonforge.db`.
    pub db_path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
            similarity_threshold: 0.8,
            db_path: None,
        }
    }
}

impl CacheConfig {
    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::db_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Image generation endpoint. Without one the offline placeholder is used.
    pub endpoint: Option<String>,
    #[serde(default)]
    pub fallback_endpoints: Vec<String>,
    pub timeout_seconds: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            fallback_endpoints: Vec::new(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    Random,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub quality: QualityMode,
    pub fixed_quality: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            quality: QualityMode::Random,
            fixed_quality: 0.75,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert!(c.engine.workflow.is_none());
        assert_eq!(c.engine.timeout_seconds, 300);
        assert!(c.engine.use_cache);
        assert!(c.cache.enabled);
        assert_eq!(c.cache.ttl_seconds, 3600);
        assert!((c.cache.similarity_threshold - 0.8).abs() < 1e-9);
        assert!(c.generator.endpoint.is_none());
        assert_eq!(c.scoring.quality, QualityMode::Random);
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert_eq!(config.generator.timeout_seconds, 60);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[engine]
workflow = "/etc/moonforge/tuner.yaml"
timeout_seconds = 30
use_cache = false

[cache]
enabled = true
ttl_seconds = 60
similarity_threshold = 0.5
db_path = "/tmp/mf.db"

[generator]
endpoint = "http://localhost:8787/api/generate"
fallback_endpoints = ["http://backup/api/generate"]
timeout_seconds = 10

[scoring]
quality = "fixed"
fixed_quality = 0.6
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.engine.workflow.as_deref(),
            Some("/etc/moonforge/tuner.yaml")
        );
        assert!(!config.engine.use_cache);
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.cache.resolved_db_path(), PathBuf::from("/tmp/mf.db"));
        assert_eq!(config.generator.fallback_endpoints.len(), 1);
        assert_eq!(config.scoring.quality, QualityMode::Fixed);
        assert!((config.scoring.fixed_quality - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(back.engine.timeout_seconds, config.engine.timeout_seconds);
        assert_eq!(back.scoring.quality, config.scoring.quality);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
