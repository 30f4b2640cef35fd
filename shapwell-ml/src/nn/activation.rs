//! Scalar and row-wise activation functions.

use ndarray::{Array1, Array2, ArrayView1, Axis};

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax of a vector.
pub fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Softmax applied independently to every row.
pub fn softmax_rows(scores: &Array2<f32>) -> Array2<f32> {
    let mut out = scores.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 0.001);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(array![1.0f32, 2.0, 3.0].view());
        assert!((p.sum() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn test_softmax_large_logits_stay_finite() {
        let p = softmax(array![1000.0f32, 1000.0].view());
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_rows() {
        let s = softmax_rows(&array![[0.0f32, 0.0], [10.0, 0.0]]);
        assert!((s[[0, 0]] - 0.5).abs() < 1e-6);
        assert!(s[[1, 0]] > 0.99);
        for row in s.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
    }
}
