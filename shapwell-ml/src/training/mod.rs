//! Training infrastructure: synthetic data, optimizer, metrics, callbacks and the fit loop.

pub mod callbacks;
pub mod dataset;
pub mod metrics;
pub mod optimizer;
pub mod trainer;

pub use callbacks::{CallbackAction, EarlyStoppingCallback, NonFiniteLossCallback, TrainingCallback};
pub use dataset::SyntheticDataset;
pub use metrics::{ClassificationMetrics, EpochMetrics, TrainingMetrics};
pub use optimizer::{Adam, AdamConfig};
pub use trainer::{evaluate, FitSummary, Trainer, TrainingReport};
