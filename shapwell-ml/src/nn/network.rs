//! The recurrent signal classifier.
//!
//! ```text
//! input (T, F)
//!   -> LSTM(H1, full sequence)            encoder  (T, H1)
//!   -> self-attention over the sequence   context  (T, H1)
//!   -> concat [encoder, context]                   (T, 2·H1)
//!   -> LSTM(H2, last state only)          decoder  (H2)
//!   -> dense(3) + softmax                          (3)
//! ```

use ndarray::{
    concatenate, s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewD,
    ArrayViewMutD, Axis,
};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shapwell_core::{InputShape, CLASS_COUNT};

use super::activation::softmax;
use super::attention::AttentionCache;
use super::lstm::LstmCache;
use super::{Dense, Lstm, Parameterized, SelfAttention};
use crate::error::MlError;

/// Smallest probability fed to `ln` in the loss.
const PROB_FLOOR: f32 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalNetwork {
    input_shape: InputShape,
    encoder: Lstm,
    attention: SelfAttention,
    decoder: Lstm,
    head: Dense,
}

/// Everything the backward pass needs from one forward pass.
#[derive(Debug, Clone)]
pub struct NetworkCache {
    encoder: LstmCache,
    attention: AttentionCache,
    decoder: LstmCache,
    last_hidden: Array1<f32>,
    probabilities: Array1<f32>,
}

impl NetworkCache {
    pub fn probabilities(&self) -> &Array1<f32> {
        &self.probabilities
    }
}

impl SignalNetwork {
    pub fn new<R: Rng + ?Sized>(
        input_shape: InputShape,
        lstm_units: usize,
        final_lstm_units: usize,
        rng: &mut R,
    ) -> Self {
        let encoder = Lstm::new(input_shape.features, lstm_units, rng);
        let decoder = Lstm::new(2 * lstm_units, final_lstm_units, rng);
        let head = Dense::new(final_lstm_units, CLASS_COUNT, rng);
        Self {
            input_shape,
            encoder,
            attention: SelfAttention,
            decoder,
            head,
        }
    }

    /// A network of identical architecture with every parameter zeroed.
    pub fn zeros_like(&self) -> Self {
        Self {
            input_shape: self.input_shape,
            encoder: self.encoder.zeros_like(),
            attention: SelfAttention,
            decoder: self.decoder.zeros_like(),
            head: self.head.zeros_like(),
        }
    }

    pub fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    pub fn class_count(&self) -> usize {
        self.head.output_size()
    }

    pub fn lstm_units(&self) -> usize {
        self.encoder.units()
    }

    pub fn final_lstm_units(&self) -> usize {
        self.decoder.units()
    }

    /// Check internal layer sizes agree with each other and with the recorded input shape.
    pub fn validate(&self) -> Result<(), MlError> {
        if self.encoder.input_size() != self.input_shape.features {
            return Err(MlError::model(format!(
                "encoder expects {} features but the network records input shape {}",
                self.encoder.input_size(),
                self.input_shape
            )));
        }
        if self.decoder.input_size() != 2 * self.encoder.units() {
            return Err(MlError::model(format!(
                "decoder input {} does not match concatenated encoder width {}",
                self.decoder.input_size(),
                2 * self.encoder.units()
            )));
        }
        if self.head.weights.nrows() != self.decoder.units() || self.class_count() != CLASS_COUNT {
            return Err(MlError::model(format!(
                "output head is {:?}, expected ({}, {})",
                self.head.weights.dim(),
                self.decoder.units(),
                CLASS_COUNT
            )));
        }
        let non_finite = self
            .params()
            .iter()
            .map(|p| p.iter().filter(|v| !v.is_finite()).count())
            .sum::<usize>();
        if non_finite > 0 {
            return Err(MlError::model(format!(
                "{non_finite} parameters are NaN or infinite"
            )));
        }
        Ok(())
    }

    /// Class probabilities for one `(T, F)` sequence.
    pub fn predict(&self, x: ArrayView2<f32>) -> Array1<f32> {
        self.forward_cached(x).probabilities
    }

    /// Class probabilities `(N, C)` for a batch `(N, T, F)`.
    pub fn predict_batch(&self, x: ArrayView3<f32>) -> Array2<f32> {
        let rows: Vec<Array1<f32>> = x
            .outer_iter()
            .into_par_iter()
            .map(|seq| self.predict(seq))
            .collect();
        let mut out = Array2::zeros((rows.len(), self.class_count()));
        for (mut dst, row) in out.outer_iter_mut().zip(rows) {
            dst.assign(&row);
        }
        out
    }

    pub fn forward_cached(&self, x: ArrayView2<f32>) -> NetworkCache {
        let encoder = self.encoder.forward_cached(x);
        let (context, attention) = self.attention.forward_cached(encoder.outputs());
        let joined = concatenate![Axis(1), encoder.outputs(), context];
        let decoder = self.decoder.forward_cached(joined.view());
        let last_hidden = decoder.outputs().row(x.nrows() - 1).to_owned();
        let logits = self.head.forward(last_hidden.view());
        let probabilities = softmax(logits.view());
        NetworkCache {
            encoder,
            attention,
            decoder,
            last_hidden,
            probabilities,
        }
    }

    /// Backpropagate a gradient on the logits down to the input.
    ///
    /// Parameter gradients are added into `grads` when given. Returns the
    /// input gradient `(T, F)`.
    pub fn backward(
        &self,
        cache: &NetworkCache,
        d_logits: ArrayView1<f32>,
        mut grads: Option<&mut SignalNetwork>,
    ) -> Array2<f32> {
        let steps = cache.encoder.outputs().nrows();
        let h1 = self.encoder.units();

        if let Some(g) = grads.as_deref_mut() {
            self.head
                .accumulate_grads(cache.last_hidden.view(), d_logits, &mut g.head);
        }
        let d_last = self.head.backward(d_logits);

        let mut d_decoder_out = Array2::<f32>::zeros((steps, self.decoder.units()));
        d_decoder_out.row_mut(steps - 1).assign(&d_last);
        let (dz_decoder, d_joined) = self.decoder.backward(&cache.decoder, d_decoder_out.view());

        let mut d_encoder_out = d_joined.slice(s![.., ..h1]).to_owned();
        d_encoder_out += &self
            .attention
            .backward(&cache.attention, d_joined.slice(s![.., h1..]));
        let (dz_encoder, dx) = self.encoder.backward(&cache.encoder, d_encoder_out.view());

        if let Some(g) = grads {
            self.decoder
                .accumulate_grads(&cache.decoder, &dz_decoder, &mut g.decoder);
            self.encoder
                .accumulate_grads(&cache.encoder, &dz_encoder, &mut g.encoder);
        }
        dx
    }

    /// Sparse categorical cross-entropy of one prediction.
    ///
    /// A NaN probability yields a NaN loss.
    pub fn loss(probabilities: ArrayView1<f32>, label: usize) -> f32 {
        let p = probabilities[label];
        if p.is_nan() {
            return f32::NAN;
        }
        -p.max(PROB_FLOOR).ln()
    }

    /// Forward, loss and parameter gradients for one labeled sequence.
    ///
    /// Returns `(loss, predicted_class)`.
    pub fn train_step(
        &self,
        x: ArrayView2<f32>,
        label: usize,
        grads: &mut SignalNetwork,
    ) -> (f32, usize) {
        let cache = self.forward_cached(x);
        let probs = &cache.probabilities;
        let loss = Self::loss(probs.view(), label);

        let mut d_logits = probs.clone();
        d_logits[label] -= 1.0;
        self.backward(&cache, d_logits.view(), Some(grads));

        (loss, argmax(probs.view()))
    }

    /// Probabilities and the gradient of every class probability w.r.t. the input.
    ///
    /// The gradient array has shape `(C, T, F)`.
    pub fn probability_gradients(&self, x: ArrayView2<f32>) -> (Array1<f32>, Array3<f32>) {
        let cache = self.forward_cached(x);
        let p = cache.probabilities.clone();
        let classes = p.len();
        let mut grads = Array3::zeros((classes, x.nrows(), x.ncols()));

        for c in 0..classes {
            // d p_c / d logit_j = p_c (δ_cj − p_j)
            let mut d_logits = p.mapv(|pj| -p[c] * pj);
            d_logits[c] += p[c];
            let dx = self.backward(&cache, d_logits.view(), None);
            grads.index_axis_mut(Axis(0), c).assign(&dx);
        }
        (p, grads)
    }
}

impl Parameterized for SignalNetwork {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        let mut params = self.encoder.params();
        params.extend(self.decoder.params());
        params.extend(self.head.params());
        params
    }

    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        let mut params = self.encoder.params_mut();
        params.extend(self.decoder.params_mut());
        params.extend(self.head.params_mut());
        params
    }
}

/// Index of the largest value; ties resolve to the lowest index.
pub(crate) fn argmax(values: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny() -> SignalNetwork {
        let mut rng = StdRng::seed_from_u64(11);
        SignalNetwork::new(InputShape::new(4, 3), 5, 4, &mut rng)
    }

    fn sample() -> Array2<f32> {
        Array::from_shape_fn((4, 3), |(t, f)| ((t * 3 + f) as f32 * 0.53).sin())
    }

    #[test]
    fn test_predict_is_distribution() {
        let net = tiny();
        let p = net.predict(sample().view());
        assert_eq!(p.len(), 3);
        assert!((p.sum() - 1.0).abs() < 1e-5);
        assert!(p.iter().all(|&v| v > 0.0));
        assert!(net.validate().is_ok());
    }

    #[test]
    fn test_parameter_count() {
        let net = tiny();
        let encoder = 3 * 20 + 5 * 20 + 20;
        let decoder = 10 * 16 + 4 * 16 + 16;
        let head = 4 * 3 + 3;
        assert_eq!(net.parameter_count(), encoder + decoder + head);
    }

    #[test]
    fn test_predict_batch_matches_predict() {
        let net = tiny();
        let x = sample();
        let batch = ndarray::stack![Axis(0), x, x.mapv(|v| -v)];
        let out = net.predict_batch(batch.view());
        assert_eq!(out.dim(), (2, 3));
        assert_eq!(out.row(0), net.predict(x.view()));
    }

    #[test]
    fn test_probability_gradient_matches_finite_difference() {
        let net = tiny();
        let x = sample();
        let (_, grads) = net.probability_gradients(x.view());
        assert_eq!(grads.dim(), (3, 4, 3));

        let eps = 1e-2;
        for c in 0..3 {
            for (t, f) in [(0usize, 0usize), (1, 2), (3, 1)] {
                let mut plus = x.clone();
                plus[[t, f]] += eps;
                let mut minus = x.clone();
                minus[[t, f]] -= eps;
                let numeric =
                    (net.predict(plus.view())[c] - net.predict(minus.view())[c]) / (2.0 * eps);
                assert!(
                    (numeric - grads[[c, t, f]]).abs() < 1e-3,
                    "class {c} at ({t},{f}): numeric {numeric} vs analytic {}",
                    grads[[c, t, f]]
                );
            }
        }
    }

    #[test]
    fn test_train_step_head_gradient_matches_finite_difference() {
        let net = tiny();
        let x = sample();
        let mut grads = net.zeros_like();
        let (loss, _) = net.train_step(x.view(), 1, &mut grads);
        assert!(loss.is_finite() && loss > 0.0);

        let eps = 1e-2;
        for (i, j) in [(0usize, 0usize), (2, 1), (3, 2)] {
            let mut plus = net.clone();
            plus.head.weights[[i, j]] += eps;
            let mut minus = net.clone();
            minus.head.weights[[i, j]] -= eps;
            let numeric = (SignalNetwork::loss(plus.predict(x.view()).view(), 1)
                - SignalNetwork::loss(minus.predict(x.view()).view(), 1))
                / (2.0 * eps);
            assert!(
                (numeric - grads.head.weights[[i, j]]).abs() < 1e-3,
                "head[{i},{j}]: numeric {numeric} vs analytic {}",
                grads.head.weights[[i, j]]
            );
        }
    }

    #[test]
    fn test_train_step_encoder_gradient_matches_finite_difference() {
        let net = tiny();
        let x = sample();
        let mut grads = net.zeros_like();
        net.train_step(x.view(), 2, &mut grads);

        let eps = 1e-2;
        for (i, j) in [(0usize, 0usize), (1, 7), (2, 19)] {
            let mut plus = net.clone();
            plus.encoder.kernel[[i, j]] += eps;
            let mut minus = net.clone();
            minus.encoder.kernel[[i, j]] -= eps;
            let numeric = (SignalNetwork::loss(plus.predict(x.view()).view(), 2)
                - SignalNetwork::loss(minus.predict(x.view()).view(), 2))
                / (2.0 * eps);
            assert!(
                (numeric - grads.encoder.kernel[[i, j]]).abs() < 2e-3,
                "encoder.kernel[{i},{j}]: numeric {numeric} vs analytic {}",
                grads.encoder.kernel[[i, j]]
            );
        }
    }

    #[test]
    fn test_validate_rejects_mismatched_shape() {
        let mut net = tiny();
        net.input_shape = InputShape::new(4, 7);
        assert!(net.validate().is_err());
    }

    #[test]
    fn test_nan_parameters_surface_as_nan_loss() {
        let mut net = tiny();
        net.head.bias[1] = f32::NAN;
        let p = net.predict(sample().view());
        assert!(p.iter().all(|v| v.is_nan()));
        assert!(SignalNetwork::loss(p.view(), 0).is_nan());

        let err = net.validate().unwrap_err();
        assert!(err.to_string().contains("1 parameters are NaN or infinite"));
    }

    #[test]
    fn test_loss_floors_zero_probability() {
        let p = ndarray::array![0.0f32, 0.5, 0.5];
        let loss = SignalNetwork::loss(p.view(), 0);
        assert!((loss - 16.118_095).abs() < 1e-4);
    }

    #[test]
    fn test_argmax_ties_take_first() {
        assert_eq!(argmax(ndarray::array![0.2f32, 0.5, 0.5].view()), 1);
        assert_eq!(argmax(ndarray::array![0.9f32, 0.05, 0.05].view()), 0);
    }
}
