//! # shapwell-core
//!
//! Shared foundation for the Shapwell workspace: layered configuration, the
//! `(time_steps, features)` shape contract, error types, artifact
//! persistence, and tracing setup.

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod shape;

pub use config::{
    load_config, ArtifactsConfig, ExplainerConfig, LoggingConfig, SamplerConfig, ServerConfig,
    ShapwellConfig, TrainingConfig,
};
pub use error::{ArtifactError, ConfigError, CoreError, ShapeError};
pub use shape::{InputShape, Signal, CLASS_COUNT};
