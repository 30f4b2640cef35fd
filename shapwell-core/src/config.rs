//! Configuration system for Shapwell.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace (or explicit) config file -> environment. CLI flags are applied
//! by the binary on top of the extracted value.
//!
//! Configuration is loaded from `~/.config/shapwell/config.toml` and
//! `shapwell.toml` in the workspace directory. Environment variables use the
//! `SHAPWELL_` prefix and `__` as the section separator, e.g.
//! `SHAPWELL_SERVER__PORT=8000`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::shape::InputShape;

/// Name of the workspace-level configuration file.
pub const WORKSPACE_CONFIG_FILE: &str = "shapwell.toml";

/// Top-level configuration shared by the sampler, the trainer and the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapwellConfig {
    /// Input shape every component agrees on.
    #[serde(default)]
    pub shape: InputShape,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub explainer: ExplainerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where artifacts are written and read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_background_path")]
    pub background_path: PathBuf,
    /// JSON report written by the trainer.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            background_path: default_background_path(),
            report_path: default_report_path(),
        }
    }
}

impl ArtifactsConfig {
    /// Resolve relative paths against `base`. Absolute paths are kept.
    pub fn resolved(&self, base: &Path) -> Self {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            model_path: resolve(&self.model_path),
            background_path: resolve(&self.background_path),
            report_path: resolve(&self.report_path),
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("artifacts/models/lstm_model.bin")
}

fn default_background_path() -> PathBuf {
    PathBuf::from("artifacts/data/background_sample.bin")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("artifacts/models/training_report.json")
}

/// Background sampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Number of sequences in the background sample.
    #[serde(default = "default_sample_count")]
    pub sample_count: usize,
    /// RNG seed; drawn from entropy when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            seed: None,
        }
    }
}

fn default_sample_count() -> usize {
    100
}

/// Model trainer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of synthetic labeled sequences to generate.
    #[serde(default = "default_training_samples")]
    pub samples: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Trailing fraction of samples held out for validation.
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Units of the sequence-returning first LSTM.
    #[serde(default = "default_lstm_units")]
    pub lstm_units: usize,
    /// Units of the second LSTM, which collapses the sequence.
    #[serde(default = "default_final_lstm_units")]
    pub final_lstm_units: usize,
    /// Also persist the first `sampler.sample_count` training sequences as the background sample.
    #[serde(default = "default_true")]
    pub write_background: bool,
    /// Stop after this many epochs without validation-loss improvement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_stopping_patience: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            samples: default_training_samples(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            validation_split: default_validation_split(),
            learning_rate: default_learning_rate(),
            lstm_units: default_lstm_units(),
            final_lstm_units: default_final_lstm_units(),
            write_background: true,
            early_stopping_patience: None,
            seed: None,
        }
    }
}

fn default_training_samples() -> usize {
    1000
}

fn default_epochs() -> usize {
    10
}

fn default_batch_size() -> usize {
    64
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_learning_rate() -> f64 {
    0.001
}

fn default_lstm_units() -> usize {
    128
}

fn default_final_lstm_units() -> usize {
    64
}

fn default_true() -> bool {
    true
}

/// Attribution explainer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainerConfig {
    /// Interpolation points on each reference-to-instance path.
    ///
    /// One instance costs `integration_steps * background_limit` forward and
    /// backward passes per class; at the defaults a 60 x 15 instance takes a
    /// few seconds on one core.
    #[serde(default = "default_integration_steps")]
    pub integration_steps: usize,
    /// Use only the first N background sequences as references. `0`, or a
    /// value at or above the background size, uses all of them.
    #[serde(default = "default_background_limit")]
    pub background_limit: usize,
    /// Spread path evaluations across the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            integration_steps: default_integration_steps(),
            background_limit: default_background_limit(),
            parallel: true,
        }
    }
}

fn default_integration_steps() -> usize {
    8
}

fn default_background_limit() -> usize {
    32
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Explanations computed at the same time; further requests wait.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_explanations: usize,
    /// Largest accepted `instances` batch. Requests are computed one instance
    /// after another, so this bounds the latency of a single request.
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_explanations: default_max_concurrent(),
            max_instances: default_max_instances(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_concurrent() -> usize {
    1
}

fn default_max_instances() -> usize {
    8
}

fn default_body_limit() -> usize {
    16 * 1024 * 1024
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive for the stderr layer (overridden by `RUST_LOG`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily-rotated JSON logs; disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ShapwellConfig {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shape.time_steps == 0 || self.shape.features == 0 {
            return Err(ConfigError::invalid(format!(
                "shape must be non-empty, got {}",
                self.shape
            )));
        }
        if self.sampler.sample_count == 0 {
            return Err(ConfigError::invalid("sampler.sample_count must be > 0"));
        }

        let t = &self.training;
        if t.epochs == 0 || t.batch_size == 0 || t.samples == 0 {
            return Err(ConfigError::invalid(
                "training.samples, training.epochs and training.batch_size must be > 0",
            ));
        }
        if !(0.0..1.0).contains(&t.validation_split) {
            return Err(ConfigError::invalid(format!(
                "training.validation_split must be in [0, 1), got {}",
                t.validation_split
            )));
        }
        if !(t.learning_rate > 0.0 && t.learning_rate.is_finite()) {
            return Err(ConfigError::invalid("training.learning_rate must be > 0"));
        }
        if t.lstm_units == 0 || t.final_lstm_units == 0 {
            return Err(ConfigError::invalid("LSTM unit counts must be > 0"));
        }

        if self.explainer.integration_steps == 0 {
            return Err(ConfigError::invalid("explainer.integration_steps must be > 0"));
        }

        if self.server.max_concurrent_explanations == 0 || self.server.max_instances == 0 {
            return Err(ConfigError::invalid(
                "server.max_concurrent_explanations and server.max_instances must be > 0",
            ));
        }
        Ok(())
    }
}

/// Build the layered figment without extracting it.
fn figment(workspace: Option<&Path>, config_file: Option<&Path>) -> Result<Figment, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ShapwellConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "shapwell", "shapwell") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Explicit file wins over the workspace file
    match config_file {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            if let Some(ws) = workspace {
                let ws_config = ws.join(WORKSPACE_CONFIG_FILE);
                if ws_config.exists() {
                    figment = figment.merge(Toml::file(&ws_config));
                }
            }
        }
    }

    // SHAPWELL_SERVER__PORT, SHAPWELL_TRAINING__EPOCHS, ...
    Ok(figment.merge(Env::prefixed("SHAPWELL_").split("__")))
}

/// Load and validate the effective configuration.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<ShapwellConfig, ConfigError> {
    let config: ShapwellConfig = figment(workspace, config_file)?
        .extract()
        .map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}
