//! Error types for Shapwell core.
//!
//! Uses `thiserror` for structured variants covering configuration,
//! artifact persistence, and the shared shape contract.

use std::path::PathBuf;

use crate::shape::InputShape;

/// Top-level error type for the core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {0}")]
    Parse(#[from] Box<figment::Error>),
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Errors from reading or writing persisted artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to decode artifact {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Failed to encode artifact: {message}")]
    Encode { message: String },

    #[error("Artifact {path} has kind '{actual}', expected '{expected}'")]
    WrongKind {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Artifact {path} uses format version {actual}, this build reads version {expected}")]
    UnsupportedVersion {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("Artifact {path} has sha256 {actual}, its manifest records {expected}")]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Violations of the `(time_steps, features)` shape contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("expected input shape {expected}, got {actual}")]
    Mismatch {
        expected: InputShape,
        actual: InputShape,
    },

    #[error("row {row} has {actual} features, expected {expected}")]
    Row {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{what} is empty")]
    Empty { what: String },
}
