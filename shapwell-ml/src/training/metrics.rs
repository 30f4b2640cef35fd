//! Training metrics tracking.

use serde::{Deserialize, Serialize};
use shapwell_core::{Signal, CLASS_COUNT};

/// Results of one finished epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    pub elapsed_secs: f64,
}

/// Per-epoch history of a training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub accuracy_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    pub val_accuracy_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    /// Append an epoch. The best epoch tracks validation loss when present,
    /// training loss otherwise.
    pub fn record_epoch(&mut self, epoch: &EpochMetrics) {
        self.loss_history.push(epoch.loss);
        self.accuracy_history.push(epoch.accuracy);
        if let Some(vl) = epoch.val_loss {
            self.val_loss_history.push(vl);
        }
        if let Some(va) = epoch.val_accuracy {
            self.val_accuracy_history.push(va);
        }
        self.epochs_completed += 1;
        self.total_training_time_secs += epoch.elapsed_secs;

        let check_loss = epoch.val_loss.unwrap_or(epoch.loss);
        if self.best_loss.is_none_or(|best| check_loss < best) {
            self.best_loss = Some(check_loss);
            self.best_epoch = Some(epoch.epoch);
        }
    }

    /// Loss monitored by callbacks for the latest epoch.
    pub fn monitored_loss(&self) -> Option<f64> {
        if self.val_loss_history.len() == self.epochs_completed && self.epochs_completed > 0 {
            self.val_loss_history.last().copied()
        } else {
            self.loss_history.last().copied()
        }
    }
}

/// Classification quality on a labeled set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub samples: usize,
    pub loss: f64,
    pub accuracy: f64,
    /// `confusion_matrix[actual][predicted]`.
    pub confusion_matrix: [[usize; CLASS_COUNT]; CLASS_COUNT],
}

impl ClassificationMetrics {
    /// Build from per-sample losses, labels and predictions.
    pub fn from_predictions(losses: &[f32], labels: &[usize], predicted: &[usize]) -> Self {
        let samples = labels.len();
        let mut confusion_matrix = [[0; CLASS_COUNT]; CLASS_COUNT];
        let mut correct = 0;
        for (&actual, &guess) in labels.iter().zip(predicted) {
            confusion_matrix[actual][guess] += 1;
            if actual == guess {
                correct += 1;
            }
        }
        let denom = samples.max(1) as f64;
        Self {
            samples,
            loss: losses.iter().map(|&l| l as f64).sum::<f64>() / denom,
            accuracy: correct as f64 / denom,
            confusion_matrix,
        }
    }

    /// Recall per class, in [`Signal::ALL`] order; `None` for absent classes.
    pub fn recall(&self) -> [(Signal, Option<f64>); CLASS_COUNT] {
        Signal::ALL.map(|signal| {
            let row = &self.confusion_matrix[signal.index()];
            let total: usize = row.iter().sum();
            let recall = (total > 0).then(|| row[signal.index()] as f64 / total as f64);
            (signal, recall)
        })
    }
}
