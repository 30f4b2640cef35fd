//! Model and background artifacts on disk.
//!
//! Both are written through `shapwell_core::persistence`, so each file
//! carries its kind, format version and input shape, and has a manifest
//! sidecar with its SHA-256 digest.

use ndarray::Array3;
use shapwell_core::persistence::{load_artifact, save_artifact, ArtifactHeader, ArtifactManifest};
use shapwell_core::{ArtifactError, InputShape, ShapeError};
use std::path::Path;

use crate::error::MlError;
use crate::nn::SignalNetwork;

pub const MODEL_KIND: &str = "model";
pub const BACKGROUND_KIND: &str = "background";

pub fn save_model(path: &Path, model: &SignalNetwork) -> Result<ArtifactManifest, MlError> {
    model.validate()?;
    let manifest = save_artifact(path, MODEL_KIND, model.input_shape(), model)?;
    tracing::info!(
        path = %path.display(),
        input_shape = %manifest.input_shape,
        sha256 = %manifest.sha256,
        "Saved model"
    );
    Ok(manifest)
}

/// Load a model and check its layers against the shape in the header.
pub fn load_model(path: &Path) -> Result<SignalNetwork, MlError> {
    let (header, model): (ArtifactHeader, SignalNetwork) = load_artifact(path, MODEL_KIND)?;
    if header.input_shape != model.input_shape() {
        return Err(ArtifactError::Decode {
            path: path.to_path_buf(),
            message: format!(
                "header records input shape {} but the network was built for {}",
                header.input_shape,
                model.input_shape()
            ),
        }
        .into());
    }
    model.validate()?;
    tracing::info!(
        path = %path.display(),
        input_shape = %header.input_shape,
        created_at = %header.created_at,
        "Loaded model"
    );
    Ok(model)
}

pub fn save_background(path: &Path, sample: &Array3<f32>) -> Result<ArtifactManifest, MlError> {
    let (n, t, f) = sample.dim();
    if n == 0 {
        return Err(ShapeError::Empty {
            what: "background sample".into(),
        }
        .into());
    }
    let manifest = save_artifact(path, BACKGROUND_KIND, InputShape::new(t, f), sample)?;
    tracing::info!(
        path = %path.display(),
        samples = n,
        input_shape = %manifest.input_shape,
        "Saved background sample"
    );
    Ok(manifest)
}

pub fn load_background(path: &Path) -> Result<Array3<f32>, MlError> {
    let (header, sample): (ArtifactHeader, Array3<f32>) = load_artifact(path, BACKGROUND_KIND)?;
    if let Err(e) = header.input_shape.check_batch(sample.dim()) {
        return Err(ArtifactError::Decode {
            path: path.to_path_buf(),
            message: format!("payload disagrees with header: {e}"),
        }
        .into());
    }
    tracing::info!(
        path = %path.display(),
        samples = sample.len_of(ndarray::Axis(0)),
        input_shape = %header.input_shape,
        "Loaded background sample"
    );
    Ok(sample)
}

/// Startup consistency check between configuration, model and background.
pub fn check_compatibility(
    configured: InputShape,
    model: &SignalNetwork,
    background: &Array3<f32>,
) -> Result<(), MlError> {
    let model_shape = model.input_shape();
    if configured != model_shape {
        return Err(MlError::incompatible(format!(
            "configured shape {configured} does not match the model's input shape {model_shape}"
        )));
    }

    let (n, t, f) = background.dim();
    if n == 0 {
        return Err(MlError::incompatible("background sample is empty"));
    }
    if InputShape::new(t, f) != model_shape {
        return Err(MlError::incompatible(format!(
            "background sample has shape ({n}, {t}, {f}) but the model expects {model_shape}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shapwell_core::persistence::manifest_path;
    use tempfile::TempDir;

    fn network(shape: InputShape) -> SignalNetwork {
        let mut rng = StdRng::seed_from_u64(21);
        SignalNetwork::new(shape, 4, 3, &mut rng)
    }

    #[test]
    fn test_model_roundtrip_preserves_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models/lstm_model.bin");
        let net = network(InputShape::new(5, 2));

        let manifest = save_model(&path, &net).unwrap();
        assert_eq!(manifest.kind, MODEL_KIND);
        assert!(manifest_path(&path).exists());

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded, net);
    }

    #[test]
    fn test_nan_model_is_not_written() {
        use crate::nn::Parameterized;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lstm_model.bin");
        let mut net = network(InputShape::new(5, 2));
        if let Some(mut bias) = net.params_mut().pop() {
            bias.fill(f32::NAN);
        }

        let err = save_model(&path, &net).unwrap_err();
        assert!(matches!(err, MlError::Model(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_background_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("background.bin");
        let sample = Array3::from_shape_fn((3, 4, 2), |(n, t, f)| (n * 8 + t * 2 + f) as f32);

        let manifest = save_background(&path, &sample).unwrap();
        assert_eq!(manifest.input_shape, InputShape::new(4, 2));
        assert_eq!(load_background(&path).unwrap(), sample);
    }

    #[test]
    fn test_empty_background_is_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("background.bin");
        assert!(save_background(&path, &Array3::zeros((0, 4, 2))).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_model_file_is_not_a_background() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.bin");
        save_model(&path, &network(InputShape::new(3, 2))).unwrap();
        let err = load_background(&path).unwrap_err();
        assert!(matches!(
            err,
            MlError::Artifact(ArtifactError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_missing_model_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = load_model(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, MlError::Artifact(ArtifactError::NotFound { .. })));
    }

    #[test]
    fn test_compatibility_rejects_narrow_background() {
        let model = network(InputShape::new(60, 15));
        let background = Array3::<f32>::zeros((100, 60, 10));
        let err = check_compatibility(InputShape::new(60, 15), &model, &background).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("(100, 60, 10)"), "{message}");
        assert!(message.contains("(60, 15)"), "{message}");
    }

    #[test]
    fn test_compatibility_rejects_config_drift() {
        let model = network(InputShape::new(6, 3));
        let background = Array3::<f32>::zeros((2, 6, 3));
        assert!(check_compatibility(InputShape::new(6, 3), &model, &background).is_ok());
        assert!(check_compatibility(InputShape::new(6, 4), &model, &background).is_err());
        assert!(
            check_compatibility(InputShape::new(6, 3), &model, &Array3::zeros((0, 6, 3))).is_err()
        );
    }
}
