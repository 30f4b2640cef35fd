//! Error types for the shapwell-ml crate.

use shapwell_core::{ArtifactError, ConfigError, CoreError, ShapeError};
use thiserror::Error;

/// Top-level error type for ML operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Training error: {0}")]
    Training(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Explainer error: {0}")]
    Explainer(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Incompatible artifacts: {0}")]
    Incompatible(String),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<CoreError> for MlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(e) => Self::Config(e),
            CoreError::Artifact(e) => Self::Artifact(e),
            CoreError::Shape(e) => Self::Shape(e),
            CoreError::Io(e) => Self::Io(e),
        }
    }
}

impl MlError {
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn explainer(msg: impl Into<String>) -> Self {
        Self::Explainer(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::Incompatible(msg.into())
    }

    /// Whether the error was caused by the caller's data rather than by the model.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Shape(_))
    }
}
