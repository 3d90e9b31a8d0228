use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ml::gbdt::BoostingParams;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    /// Server-side statement timeout applied to every pooled connection
    pub statement_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Artifact loaded at start-up; the newest file in `artifact_dir` when unset
    pub artifact_path: Option<PathBuf>,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            artifact_path: None,
            artifact_dir: default_artifact_dir(),
        }
    }
}

fn default_artifact_dir() -> PathBuf { PathBuf::from("models") }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_max_results")]
    pub default_max_results: usize,
    #[serde(default = "default_max_results_cap")]
    pub max_results_cap: usize,
    #[serde(default = "default_search_radius_km")]
    pub default_search_radius_km: f64,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_max_results: default_max_results(),
            max_results_cap: default_max_results_cap(),
            default_search_radius_km: default_search_radius_km(),
        }
    }
}

fn default_max_results() -> usize { 20 }
fn default_max_results_cap() -> usize { 100 }
fn default_search_radius_km() -> f64 { 500.0 }

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_synthetic_samples")]
    pub synthetic_samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    #[serde(default = "default_validation_ratio")]
    pub validation_ratio: f64,
    /// Historical outcomes needed before synthetic data is abandoned
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    #[serde(default = "default_precision_k")]
    pub precision_k: Vec<usize>,
    #[serde(default)]
    pub boosting: BoostingParams,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            synthetic_samples: default_synthetic_samples(),
            seed: default_seed(),
            test_ratio: default_test_ratio(),
            validation_ratio: default_validation_ratio(),
            min_history: default_min_history(),
            precision_k: default_precision_k(),
            boosting: BoostingParams::default(),
        }
    }
}

fn default_synthetic_samples() -> usize { 5000 }
fn default_seed() -> u64 { 42 }
fn default_test_ratio() -> f64 { 0.2 }
fn default_validation_ratio() -> f64 { 0.1 }
fn default_min_history() -> usize { 500 }
fn default_precision_k() -> Vec<usize> { vec![5, 10, 20] }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

fn environment() -> Environment {
    // e.g., ORGAN_MATCH__SERVER__PORT -> server.port
    Environment::with_prefix("ORGAN_MATCH")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Later sources override earlier ones:
    /// 1. config/default.toml
    /// 2. config/local.toml (development overrides)
    /// 3. Environment variables prefixed with ORGAN_MATCH__
    /// 4. DATABASE_URL
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(environment())
            .build()?;

        with_database_url(settings)?.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        with_database_url(settings)?.try_deserialize()
    }
}

/// DATABASE_URL wins over any configured database.url
fn with_database_url(settings: Config) -> Result<Config, ConfigError> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Config::builder()
            .add_source(settings)
            .set_override("database.url", url)?
            .build(),
        Err(_) => Ok(settings),
    }
}
