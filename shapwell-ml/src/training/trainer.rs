//! Mini-batch training loop for [`SignalNetwork`].

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shapwell_core::{InputShape, TrainingConfig, CLASS_COUNT};
use std::time::Instant;

use crate::error::MlError;
use crate::nn::{argmax, Parameterized, SignalNetwork};
use crate::training::callbacks::{
    CallbackAction, EarlyStoppingCallback, NonFiniteLossCallback, TrainingCallback,
};
use crate::training::dataset::SyntheticDataset;
use crate::training::metrics::{ClassificationMetrics, EpochMetrics, TrainingMetrics};
use crate::training::optimizer::Adam;

/// Samples per parallel gradient task. Fixed so the summation order, and
/// therefore the result, does not depend on the thread count.
const GRADIENT_CHUNK: usize = 8;

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone)]
pub struct FitSummary {
    pub metrics: TrainingMetrics,
    /// Set when a callback ended training before the last epoch.
    pub stop_reason: Option<String>,
}

/// JSON report written next to the model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub created_at: DateTime<Utc>,
    pub input_shape: InputShape,
    pub lstm_units: usize,
    pub final_lstm_units: usize,
    pub parameter_count: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    pub class_counts: [usize; CLASS_COUNT],
    pub epochs_requested: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    pub metrics: TrainingMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ClassificationMetrics>,
}

pub struct Trainer {
    config: TrainingConfig,
    optimizer: Adam,
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl Trainer {
    /// A trainer with the non-finite loss guard, plus early stopping when
    /// `early_stopping_patience` is set.
    pub fn new(config: TrainingConfig) -> Self {
        let mut callbacks: Vec<Box<dyn TrainingCallback>> = vec![Box::new(NonFiniteLossCallback)];
        if let Some(patience) = config.early_stopping_patience {
            callbacks.push(Box::new(EarlyStoppingCallback::new(patience, 0.0)));
        }
        Self {
            optimizer: Adam::with_learning_rate(config.learning_rate as f32),
            config,
            callbacks,
        }
    }

    pub fn with_callback(mut self, callback: Box<dyn TrainingCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Fit `model` on `train`, shuffling with `rng` every epoch.
    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        model: &mut SignalNetwork,
        train: &SyntheticDataset,
        validation: Option<&SyntheticDataset>,
        rng: &mut R,
    ) -> Result<FitSummary, MlError> {
        let epochs = self.config.epochs;
        let batch_size = self.config.batch_size;
        if epochs == 0 || batch_size == 0 {
            return Err(MlError::training("epochs and batch_size must be > 0"));
        }
        if train.is_empty() {
            return Err(MlError::training("training set is empty"));
        }
        let shape = model.input_shape();
        shape.check_batch(train.inputs().dim())?;
        if let Some(val) = validation {
            shape.check_batch(val.inputs().dim())?;
        }

        tracing::info!(
            train_samples = train.len(),
            validation_samples = validation.map_or(0, |v| v.len()),
            epochs,
            batch_size,
            parameters = model.parameter_count(),
            "Training started"
        );

        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut metrics = TrainingMetrics::default();
        let mut stop_reason = None;

        for epoch in 1..=epochs {
            let started = Instant::now();
            order.shuffle(rng);

            let mut loss_sum = 0.0;
            let mut correct = 0;
            for batch in order.chunks(batch_size) {
                let (mut grads, batch_loss, batch_correct) = batch_gradients(model, train, batch);
                grads.scale(1.0 / batch.len() as f32);
                self.optimizer.step(model, &grads);
                loss_sum += batch_loss;
                correct += batch_correct;
            }

            let val = validation.map(|v| evaluate(model, v));
            let record = EpochMetrics {
                epoch,
                loss: loss_sum / train.len() as f64,
                accuracy: correct as f64 / train.len() as f64,
                val_loss: val.as_ref().map(|m| m.loss),
                val_accuracy: val.as_ref().map(|m| m.accuracy),
                elapsed_secs: started.elapsed().as_secs_f64(),
            };
            tracing::info!(
                epoch,
                epochs,
                loss = record.loss,
                accuracy = record.accuracy,
                val_loss = ?record.val_loss,
                val_accuracy = ?record.val_accuracy,
                elapsed_secs = record.elapsed_secs,
                "Epoch finished"
            );
            metrics.record_epoch(&record);

            for callback in &mut self.callbacks {
                if let CallbackAction::Stop(reason) = callback.on_epoch_end(epoch, &metrics) {
                    tracing::warn!(epoch, %reason, "Training stopped by callback");
                    stop_reason = Some(reason);
                    break;
                }
            }
            if stop_reason.is_some() {
                break;
            }
        }

        if let Some(loss) = metrics.monitored_loss().filter(|l| !l.is_finite()) {
            return Err(MlError::training(format!(
                "training diverged (loss {loss}) after {} epochs",
                metrics.epochs_completed
            )));
        }

        tracing::info!(
            epochs_completed = metrics.epochs_completed,
            best_epoch = ?metrics.best_epoch,
            best_loss = ?metrics.best_loss,
            total_secs = metrics.total_training_time_secs,
            "Training finished"
        );
        Ok(FitSummary {
            metrics,
            stop_reason,
        })
    }
}

/// Summed gradients, summed loss and correct-prediction count over `batch`.
fn batch_gradients(
    model: &SignalNetwork,
    data: &SyntheticDataset,
    batch: &[usize],
) -> (SignalNetwork, f64, usize) {
    let partials: Vec<(SignalNetwork, f64, usize)> = batch
        .par_chunks(GRADIENT_CHUNK)
        .map(|chunk| {
            let mut grads = model.zeros_like();
            let mut loss = 0.0;
            let mut correct = 0;
            for &i in chunk {
                let label = data.labels()[i];
                let (l, predicted) = model.train_step(data.sequence(i), label, &mut grads);
                loss += l as f64;
                if predicted == label {
                    correct += 1;
                }
            }
            (grads, loss, correct)
        })
        .collect();

    let mut total = model.zeros_like();
    let mut loss = 0.0;
    let mut correct = 0;
    for (grads, l, c) in &partials {
        total.accumulate(grads);
        loss += l;
        correct += c;
    }
    (total, loss, correct)
}

/// Loss, accuracy and confusion matrix of `model` on `data`.
pub fn evaluate(model: &SignalNetwork, data: &SyntheticDataset) -> ClassificationMetrics {
    let probabilities = model.predict_batch(data.inputs());
    let (losses, predicted): (Vec<f32>, Vec<usize>) = probabilities
        .outer_iter()
        .zip(data.labels())
        .map(|(p, &label)| (SignalNetwork::loss(p, label), argmax(p)))
        .unzip();
    ClassificationMetrics::from_predictions(&losses, data.labels(), &predicted)
}
