//! Configuration management for training and serving.
//!
//! One document drives both modes so the feature schema the trainer fits
//! on is the same one the server aligns requests to.

use crate::preprocessor::FeatureSchema;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub csv: CsvConfig,
    pub features: FeaturesConfig,
    pub model: ModelConfig,
    pub split: SplitConfig,
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub serving: ServingConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Training data source
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Path to the labelled CSV file
    pub file_path: PathBuf,
    /// Name of the target column
    pub target: String,
}

/// CSV dialect
#[derive(Debug, Clone, Deserialize)]
pub struct CsvConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_quotechar")]
    pub quotechar: String,
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_quotechar() -> String {
    "\"".to_string()
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            quotechar: default_quotechar(),
        }
    }
}

impl CsvConfig {
    /// Field delimiter byte. Validated to be a single byte at load time.
    pub fn delimiter(&self) -> u8 {
        self.separator.as_bytes().first().copied().unwrap_or(b',')
    }

    /// Quote byte. Validated to be a single byte at load time.
    pub fn quote(&self) -> u8 {
        self.quotechar.as_bytes().first().copied().unwrap_or(b'"')
    }
}

/// Declared partition of feature columns
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    pub numerical: Vec<String>,
    pub categorical: Vec<String>,
}

impl FeaturesConfig {
    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.numerical.clone(), self.categorical.clone())
    }
}

/// Classifier selection
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Registry key: "xgb" or "lr"
    #[serde(rename = "type")]
    pub model_type: String,
    /// Keyword parameters forwarded to the model constructor
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
}

fn default_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Train/test split
#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    pub test_size: f64,
    pub random_state: u64,
}

/// Artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
    pub model_subdir: String,
    pub metrics_subdir: String,
}

impl ArtifactsConfig {
    pub fn model_dir(&self) -> PathBuf {
        self.dir.join(&self.model_subdir)
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.dir.join(&self.metrics_subdir)
    }
}

/// Serving process settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServingConfig {
    /// Pipeline artifact loaded at startup
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    /// Label encoder artifact paired with the pipeline
    #[serde(default = "default_label_encoder_path")]
    pub label_encoder_path: PathBuf,
    /// Maximum number of requests scored concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Threshold applied when a request does not carry one
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Seconds between serving metrics summaries
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("artifacts/models/latest_model.json")
}

fn default_label_encoder_path() -> PathBuf {
    PathBuf::from("artifacts/models/latest_label_encoder.json")
}

fn default_workers() -> usize {
    4
}

fn default_threshold() -> f64 {
    0.5
}

fn default_report_interval() -> u64 {
    30
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            label_encoder_path: default_label_encoder_path(),
            workers: default_workers(),
            default_threshold: default_threshold(),
            report_interval_secs: default_report_interval(),
        }
    }
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub url: String,
    /// Subject for prediction requests
    #[serde(default = "default_predict_subject")]
    pub predict_subject: String,
    /// Subject for health probes
    #[serde(default = "default_health_subject")]
    pub health_subject: String,
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_predict_subject() -> String {
    "deposit.predict".to_string()
}

fn default_health_subject() -> String {
    "deposit.health".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_nats_url(),
            predict_subject: default_predict_subject(),
            health_subject: default_health_subject(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the conventional location
    pub fn load() -> Result<Self> {
        Self::load_from_path("configs/train.yaml")
    }

    /// Load configuration from a specific path. The format follows the file
    /// extension; `DEPOSIT__SECTION__KEY` environment variables override it.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("DEPOSIT").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let cfg: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            bail!(
                "split.test_size must be in (0, 1), got {}",
                self.split.test_size
            );
        }
        if self.csv.separator.len() != 1 {
            bail!("csv.separator must be a single byte, got {:?}", self.csv.separator);
        }
        if self.csv.quotechar.len() != 1 {
            bail!("csv.quotechar must be a single byte, got {:?}", self.csv.quotechar);
        }
        if self.features.numerical.is_empty() && self.features.categorical.is_empty() {
            bail!("features.numerical and features.categorical are both empty");
        }

        let mut seen = HashSet::new();
        for name in self.features.numerical.iter().chain(&self.features.categorical) {
            if !seen.insert(name.as_str()) {
                bail!("feature '{}' is declared more than once", name);
            }
            if *name == self.data.target {
                bail!("target column '{}' is also declared as a feature", name);
            }
        }

        if !(0.0..=1.0).contains(&self.serving.default_threshold) {
            bail!(
                "serving.default_threshold must be in [0, 1], got {}",
                self.serving.default_threshold
            );
        }
        if self.serving.workers == 0 {
            bail!("serving.workers must be at least 1");
        }
        Ok(())
    }
}
