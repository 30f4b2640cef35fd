use ndarray::{s, Array1, Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;
use shapwell_core::{ExplainerConfig, InputShape, ShapeError};
use std::time::Instant;

use super::{Attributor, Classifier};
use crate::error::MlError;

/// Expected-gradients explainer bound to one model and one background sample.
///
/// Immutable after construction; all methods take `&self`, so a single
/// instance can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct Explainer<M> {
    model: M,
    references: Array3<f32>,
    base_values: Array1<f32>,
    steps: usize,
    parallel: bool,
}

impl<M: Classifier> Explainer<M> {
    /// Bind `model` to `background`, rejecting a background whose per-instance
    /// shape differs from the model's.
    pub fn new(
        model: M,
        background: ArrayView3<f32>,
        config: &ExplainerConfig,
    ) -> Result<Self, MlError> {
        let shape = model.input_shape();
        if shape.is_empty() {
            return Err(MlError::model(format!("model input shape {shape} is empty")));
        }
        shape.check_batch(background.dim())?;

        let available = background.len_of(Axis(0));
        if available == 0 {
            return Err(ShapeError::Empty {
                what: "background sample".into(),
            }
            .into());
        }
        if config.integration_steps == 0 {
            return Err(MlError::explainer("integration_steps must be > 0"));
        }

        let used = match config.background_limit {
            0 => available,
            limit => limit.min(available),
        };
        let references = background.slice(s![..used, .., ..]).to_owned();

        let outputs: Vec<Array1<f32>> = if config.parallel {
            references
                .outer_iter()
                .into_par_iter()
                .map(|r| model.predict(r))
                .collect()
        } else {
            references.outer_iter().map(|r| model.predict(r)).collect()
        };
        let mut base_values = Array1::<f32>::zeros(model.class_count());
        for out in &outputs {
            base_values += out;
        }
        base_values /= used as f32;

        if base_values.iter().any(|v| !v.is_finite()) {
            return Err(MlError::explainer(
                "model produced non-finite outputs on the background sample",
            ));
        }

        tracing::info!(
            input_shape = %shape,
            references = used,
            background = available,
            steps = config.integration_steps,
            base_values = ?base_values.to_vec(),
            "Explainer ready"
        );

        Ok(Self {
            model,
            references,
            base_values,
            steps: config.integration_steps,
            parallel: config.parallel,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Background sequences actually used as references.
    pub fn references(&self) -> ArrayView3<'_, f32> {
        self.references.view()
    }

    /// Attribution for one `(T, F)` instance, shaped `(T, F, C)`.
    pub fn explain_instance(&self, x: ArrayView2<f32>) -> Result<Array3<f32>, MlError> {
        let shape = self.model.input_shape();
        shape.check_batch((1, x.nrows(), x.ncols()))?;

        let refs = self.references.len_of(Axis(0));
        let steps = self.steps;
        let tasks: Vec<(usize, usize)> = (0..refs)
            .flat_map(|r| (0..steps).map(move |k| (r, k)))
            .collect();

        let path_term = |&(r, k): &(usize, usize)| -> Array3<f32> {
            let reference = self.references.index_axis(Axis(0), r);
            let delta = &x - &reference;
            // midpoint rule on [0, 1]
            let alpha = (k as f32 + 0.5) / steps as f32;
            let point = &reference + &(&delta * alpha);
            let (_, mut grads) = self.model.output_gradients(point.view());
            for mut class_grad in grads.outer_iter_mut() {
                class_grad *= &delta;
            }
            grads
        };

        // Collected in task order and summed sequentially so the result does
        // not depend on thread scheduling.
        let terms: Vec<Array3<f32>> = if self.parallel {
            tasks.par_iter().map(&path_term).collect()
        } else {
            tasks.iter().map(&path_term).collect()
        };

        let classes = self.model.class_count();
        let mut total = Array3::<f32>::zeros((classes, shape.time_steps, shape.features));
        for term in &terms {
            total += term;
        }
        total /= (refs * steps) as f32;

        if total.iter().any(|v| !v.is_finite()) {
            return Err(MlError::explainer("attribution produced non-finite values"));
        }

        // (C, T, F) -> (T, F, C)
        Ok(total.permuted_axes([1, 2, 0]).as_standard_layout().into_owned())
    }

    /// Attributions for every instance of an `(N, T, F)` batch.
    pub fn explain(&self, instances: ArrayView3<f32>) -> Result<Vec<Array3<f32>>, MlError> {
        if instances.len_of(Axis(0)) == 0 {
            return Err(MlError::invalid_input("no instances to explain"));
        }
        self.model.input_shape().check_batch(instances.dim())?;

        let started = Instant::now();
        let values = instances
            .outer_iter()
            .map(|x| self.explain_instance(x))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            instances = values.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Computed attributions"
        );
        Ok(values)
    }
}

impl<M: Classifier> Attributor for Explainer<M> {
    fn input_shape(&self) -> InputShape {
        self.model.input_shape()
    }

    fn class_count(&self) -> usize {
        self.model.class_count()
    }

    fn reference_count(&self) -> usize {
        self.references.len_of(Axis(0))
    }

    fn base_values(&self) -> Array1<f32> {
        self.base_values.clone()
    }

    fn attribute(&self, instances: ArrayView3<f32>) -> Result<Vec<Array3<f32>>, MlError> {
        self.explain(instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::SignalNetwork;
    use ndarray::{Array, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// `f_c(x) = Σ w_c ⊙ x`, whose attributions are known in closed form.
    #[derive(Debug)]
    struct LinearScorer {
        weights: Array3<f32>,
    }

    impl Classifier for LinearScorer {
        fn input_shape(&self) -> InputShape {
            let (_, t, f) = self.weights.dim();
            InputShape::new(t, f)
        }

        fn class_count(&self) -> usize {
            self.weights.len_of(Axis(0))
        }

        fn predict(&self, x: ArrayView2<f32>) -> Array1<f32> {
            self.weights
                .outer_iter()
                .map(|w| (&w * &x).sum())
                .collect()
        }

        fn output_gradients(&self, x: ArrayView2<f32>) -> (Array1<f32>, Array3<f32>) {
            (self.predict(x), self.weights.clone())
        }
    }

    fn linear(t: usize, f: usize) -> LinearScorer {
        LinearScorer {
            weights: Array::from_shape_fn((3, t, f), |(c, i, j)| {
                (c as f32 + 1.0) * ((i * f + j) as f32 * 0.1).sin()
            }),
        }
    }

    fn config(steps: usize, limit: usize) -> ExplainerConfig {
        ExplainerConfig {
            integration_steps: steps,
            background_limit: limit,
            parallel: true,
        }
    }

    #[test]
    fn test_linear_attributions_are_exact() {
        let model = linear(4, 2);
        let background = Array::from_shape_fn((5, 4, 2), |(n, i, j)| (n + i) as f32 - j as f32);
        let explainer = Explainer::new(model, background.view(), &config(3, 0)).unwrap();

        let x = Array::from_shape_fn((4, 2), |(i, j)| 0.5 * i as f32 + j as f32);
        let attr = explainer.explain_instance(x.view()).unwrap();
        assert_eq!(attr.dim(), (4, 2, 3));

        let mean_ref = background.mean_axis(Axis(0)).unwrap();
        let w = &explainer.model().weights;
        for c in 0..3 {
            for i in 0..4 {
                for j in 0..2 {
                    let expected = w[[c, i, j]] * (x[[i, j]] - mean_ref[[i, j]]);
                    assert!((attr[[i, j, c]] - expected).abs() < 1e-4);
                }
            }
            let total: f32 = attr.index_axis(Axis(2), c).sum();
            let gap = explainer.model().predict(x.view())[c] - explainer.base_values()[c];
            assert!((total - gap).abs() < 1e-3);
        }
    }

    #[test]
    fn test_background_shape_mismatch_is_rejected() {
        let model = linear(60, 15);
        let background = Array3::<f32>::zeros((100, 60, 10));
        let err = Explainer::new(model, background.view(), &config(2, 0)).unwrap_err();
        assert!(matches!(err, MlError::Shape(ShapeError::Mismatch { .. })));
        assert!(err.to_string().contains("(60, 15)"));
    }

    #[test]
    fn test_empty_background_is_rejected() {
        let model = linear(3, 2);
        let background = Array3::<f32>::zeros((0, 3, 2));
        assert!(Explainer::new(model, background.view(), &config(2, 0)).is_err());
    }

    #[test]
    fn test_background_limit_selects_leading_references() {
        let model = linear(2, 2);
        let background = Array::from_shape_fn((10, 2, 2), |(n, _, _)| n as f32);
        let explainer = Explainer::new(model, background.view(), &config(1, 4)).unwrap();
        assert_eq!(explainer.reference_count(), 4);
        assert_eq!(explainer.references().index_axis(Axis(0), 3)[[0, 0]], 3.0);

        let unlimited = Explainer::new(linear(2, 2), background.view(), &config(1, 50))
            .unwrap();
        assert_eq!(unlimited.reference_count(), 10);

        let all = Explainer::new(linear(2, 2), background.view(), &config(1, 0)).unwrap();
        assert_eq!(all.reference_count(), 10);
    }

    #[test]
    fn test_instance_shape_mismatch_is_client_error() {
        let explainer =
            Explainer::new(linear(3, 2), Array3::zeros((2, 3, 2)).view(), &config(1, 0))
                .unwrap();
        let err = explainer.explain(Array3::zeros((1, 3, 5)).view()).unwrap_err();
        assert!(err.is_client_error());
        let err = explainer.explain(Array3::zeros((0, 3, 2)).view()).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_network_attributions_complete_and_deterministic() {
        let mut rng = StdRng::seed_from_u64(5);
        let net = SignalNetwork::new(InputShape::new(5, 3), 6, 4, &mut rng);
        let background = Array::from_shape_fn((4, 5, 3), |(n, t, f)| {
            ((n * 15 + t * 3 + f) as f32 * 0.77).sin() * 0.5
        });
        let explainer = Explainer::new(net, background.view(), &config(24, 0)).unwrap();

        let x: Array2<f32> = Array::from_shape_fn((5, 3), |(t, f)| ((t + f) as f32 * 0.4).cos());
        let first = explainer.explain_instance(x.view()).unwrap();
        let second = explainer.explain_instance(x.view()).unwrap();
        assert_eq!(first, second);

        let p = explainer.model().predict(x.view());
        let base = explainer.base_values();
        for c in 0..3 {
            let total: f32 = first.index_axis(Axis(2), c).sum();
            assert!(
                (total - (p[c] - base[c])).abs() < 1e-2,
                "class {c}: attribution sum {total} vs output gap {}",
                p[c] - base[c]
            );
        }
        assert!((base.sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let background = Array::from_shape_fn((3, 2, 2), |(n, t, f)| (n + t + f) as f32 * 0.2);
        let x = Array::from_shape_fn((1, 2, 2), |(_, t, f)| (t * 2 + f) as f32);

        let mut cfg = config(4, 0);
        let parallel = Explainer::new(linear(2, 2), background.view(), &cfg).unwrap();
        cfg.parallel = false;
        let sequential = Explainer::new(linear(2, 2), background.view(), &cfg).unwrap();

        assert_eq!(
            parallel.explain(x.view()).unwrap(),
            sequential.explain(x.view()).unwrap()
        );
    }
}
