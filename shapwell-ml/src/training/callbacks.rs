//! Training callbacks: early stopping and non-finite loss detection.

use crate::training::metrics::TrainingMetrics;
use serde::{Deserialize, Serialize};

/// Action a callback can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    /// Stop training, with the reason recorded in the report.
    Stop(String),
}

/// Trait for training callbacks.
pub trait TrainingCallback: Send + Sync {
    /// Called at the end of each epoch with epoch number and current metrics.
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction;
}

/// Stops when the monitored loss has not improved by `min_delta` for
/// `patience` consecutive epochs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyStoppingCallback {
    pub patience: usize,
    pub min_delta: f64,
    #[serde(skip)]
    counter: usize,
    #[serde(skip)]
    best_loss: Option<f64>,
}

impl EarlyStoppingCallback {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best_loss: None,
        }
    }

    pub fn observe(&mut self, loss: f64) -> CallbackAction {
        match self.best_loss {
            Some(best) if loss >= best - self.min_delta => {
                self.counter += 1;
                if self.counter >= self.patience {
                    CallbackAction::Stop(format!(
                        "no improvement over {best:.4} for {} epochs",
                        self.counter
                    ))
                } else {
                    CallbackAction::Continue
                }
            }
            _ => {
                self.best_loss = Some(loss);
                self.counter = 0;
                CallbackAction::Continue
            }
        }
    }
}

impl TrainingCallback for EarlyStoppingCallback {
    fn on_epoch_end(&mut self, _epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        match metrics.monitored_loss() {
            Some(loss) => self.observe(loss),
            None => CallbackAction::Continue,
        }
    }
}

/// Stops as soon as the training or validation loss is NaN or infinite.
#[derive(Debug, Clone, Default)]
pub struct NonFiniteLossCallback;

impl TrainingCallback for NonFiniteLossCallback {
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        let latest = [
            metrics.loss_history.last(),
            metrics.val_loss_history.last(),
        ];
        match latest.into_iter().flatten().find(|l| !l.is_finite()) {
            Some(loss) => CallbackAction::Stop(format!("loss became {loss} at epoch {epoch}")),
            None => CallbackAction::Continue,
        }
    }
}
