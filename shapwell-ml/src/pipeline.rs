//! End-to-end steps driven by the CLI: sample, train, and load for serving.
//!
//! Artifact paths are taken from `config.artifacts` as given; resolve them
//! against the workspace first.

use shapwell_core::persistence::{atomic_write_json, ArtifactManifest};
use shapwell_core::ShapwellConfig;

use crate::artifacts::{
    check_compatibility, load_background, load_model, save_background, save_model,
};
use crate::error::MlError;
use crate::explain::Explainer;
use crate::nn::{Parameterized, SignalNetwork};
use crate::sampler::{generate_background, seeded_rng};
use crate::training::{evaluate, SyntheticDataset, Trainer, TrainingReport};

/// Everything a training run produced.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: SignalNetwork,
    pub report: TrainingReport,
    pub model_manifest: ArtifactManifest,
    pub background_manifest: Option<ArtifactManifest>,
}

/// Generate the background sample and write it to `artifacts.background_path`.
pub fn run_sampler(config: &ShapwellConfig) -> Result<ArtifactManifest, MlError> {
    config.validate()?;
    let sampler = &config.sampler;
    let sample = generate_background(config.shape, sampler.sample_count, sampler.seed);
    save_background(&config.artifacts.background_path, &sample)
}

/// Generate data, train the classifier and persist model, report and
/// (optionally) the background sample cut from the training data.
pub fn run_training(config: &ShapwellConfig) -> Result<TrainingOutcome, MlError> {
    config.validate()?;
    let t = &config.training;
    let mut rng = seeded_rng(t.seed);

    let data = SyntheticDataset::generate(config.shape, t.samples, &mut rng);
    tracing::info!(
        samples = data.len(),
        input_shape = %config.shape,
        class_counts = ?data.class_counts(),
        "Generated training data"
    );

    let background_manifest = if t.write_background {
        let sample = data.head(config.sampler.sample_count);
        Some(save_background(&config.artifacts.background_path, &sample)?)
    } else {
        None
    };

    let (train, validation) = data.split(t.validation_split)?;
    let mut model = SignalNetwork::new(config.shape, t.lstm_units, t.final_lstm_units, &mut rng);

    let mut trainer = Trainer::new(t.clone());
    let summary = trainer.fit(&mut model, &train, validation.as_ref(), &mut rng)?;
    let final_validation = validation.as_ref().map(|v| evaluate(&model, v));

    let model_manifest = save_model(&config.artifacts.model_path, &model)?;

    let report = TrainingReport {
        created_at: chrono::Utc::now(),
        input_shape: model.input_shape(),
        lstm_units: model.lstm_units(),
        final_lstm_units: model.final_lstm_units(),
        parameter_count: model.parameter_count(),
        train_samples: train.len(),
        validation_samples: validation.as_ref().map_or(0, |v| v.len()),
        class_counts: data.class_counts(),
        epochs_requested: t.epochs,
        batch_size: t.batch_size,
        learning_rate: t.learning_rate,
        seed: t.seed,
        stop_reason: summary.stop_reason,
        metrics: summary.metrics,
        validation: final_validation,
    };
    atomic_write_json(&config.artifacts.report_path, &report)?;
    tracing::info!(path = %config.artifacts.report_path.display(), "Wrote training report");

    Ok(TrainingOutcome {
        model,
        report,
        model_manifest,
        background_manifest,
    })
}

/// Load both artifacts, run the startup consistency check and build the explainer.
pub fn load_explainer(config: &ShapwellConfig) -> Result<Explainer<SignalNetwork>, MlError> {
    let model = load_model(&config.artifacts.model_path)?;
    let background = load_background(&config.artifacts.background_path)?;
    check_compatibility(config.shape, &model, &background)?;
    Explainer::new(model, background.view(), &config.explainer)
}
