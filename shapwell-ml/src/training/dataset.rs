//! Synthetic labeled sequences.

use ndarray::{s, Array3, ArrayView2, ArrayView3, Axis};
use rand::Rng;
use shapwell_core::{InputShape, CLASS_COUNT};

use crate::error::MlError;
use crate::sampler::standard_normal;

/// Sequences `(N, T, F)` with one class label each.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticDataset {
    inputs: Array3<f32>,
    labels: Vec<usize>,
}

impl SyntheticDataset {
    pub fn new(inputs: Array3<f32>, labels: Vec<usize>) -> Result<Self, MlError> {
        if inputs.len_of(Axis(0)) != labels.len() {
            return Err(MlError::invalid_input(format!(
                "{} sequences but {} labels",
                inputs.len_of(Axis(0)),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= CLASS_COUNT) {
            return Err(MlError::invalid_input(format!(
                "label {bad} is outside 0..{CLASS_COUNT}"
            )));
        }
        Ok(Self { inputs, labels })
    }

    /// Standard-normal inputs with labels drawn uniformly from the classes.
    ///
    /// Inputs are drawn before labels, so the leading sequences depend only
    /// on the seed and the shape.
    pub fn generate<R: Rng + ?Sized>(shape: InputShape, samples: usize, rng: &mut R) -> Self {
        let inputs = standard_normal(shape, samples, rng);
        let labels = (0..samples).map(|_| rng.gen_range(0..CLASS_COUNT)).collect();
        Self { inputs, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn input_shape(&self) -> InputShape {
        let (_, t, f) = self.inputs.dim();
        InputShape::new(t, f)
    }

    pub fn inputs(&self) -> ArrayView3<'_, f32> {
        self.inputs.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn sequence(&self, index: usize) -> ArrayView2<'_, f32> {
        self.inputs.index_axis(Axis(0), index)
    }

    /// The first `count` sequences (all of them if there are fewer).
    pub fn head(&self, count: usize) -> Array3<f32> {
        let count = count.min(self.len());
        self.inputs.slice(s![..count, .., ..]).to_owned()
    }

    /// Split off the trailing `validation_fraction` of samples.
    ///
    /// Returns `(train, validation)`; the validation part is `None` when the
    /// fraction rounds down to zero samples.
    pub fn split(&self, validation_fraction: f64) -> Result<(Self, Option<Self>), MlError> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(MlError::training(format!(
                "validation fraction must be in [0, 1), got {validation_fraction}"
            )));
        }
        let n = self.len();
        let split_at = (n as f64 * (1.0 - validation_fraction)) as usize;
        if split_at == 0 {
            return Err(MlError::training(format!(
                "no training samples left after holding out {validation_fraction} of {n}"
            )));
        }

        let train = Self {
            inputs: self.inputs.slice(s![..split_at, .., ..]).to_owned(),
            labels: self.labels[..split_at].to_vec(),
        };
        let validation = (split_at < n).then(|| Self {
            inputs: self.inputs.slice(s![split_at.., .., ..]).to_owned(),
            labels: self.labels[split_at..].to_vec(),
        });
        Ok((train, validation))
    }

    /// Count of samples per class.
    pub fn class_counts(&self) -> [usize; CLASS_COUNT] {
        let mut counts = [0; CLASS_COUNT];
        for &label in &self.labels {
            counts[label] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dataset(n: usize) -> SyntheticDataset {
        let mut rng = StdRng::seed_from_u64(4);
        SyntheticDataset::generate(InputShape::new(6, 3), n, &mut rng)
    }

    #[test]
    fn test_generate_dimensions_and_labels() {
        let data = dataset(30);
        assert_eq!(data.len(), 30);
        assert_eq!(data.inputs().dim(), (30, 6, 3));
        assert!(data.labels().iter().all(|&l| l < CLASS_COUNT));
        assert_eq!(data.class_counts().iter().sum::<usize>(), 30);
    }

    #[test]
    fn test_split_holds_out_trailing_fraction() {
        let data = dataset(1000);
        let (train, val) = data.split(0.2).unwrap();
        let val = val.unwrap();
        assert_eq!(train.len(), 800);
        assert_eq!(val.len(), 200);
        assert_eq!(val.sequence(0), data.sequence(800));
        assert_eq!(val.labels()[0], data.labels()[800]);
    }

    #[test]
    fn test_split_without_validation() {
        let (train, val) = dataset(10).split(0.0).unwrap();
        assert_eq!(train.len(), 10);
        assert!(val.is_none());
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        assert!(dataset(10).split(1.0).is_err());
        assert!(dataset(1).split(0.5).is_err());
    }

    #[test]
    fn test_head_is_clamped() {
        let data = dataset(5);
        assert_eq!(data.head(3).dim(), (3, 6, 3));
        assert_eq!(data.head(50).dim(), (5, 6, 3));
        assert_eq!(data.head(2), data.inputs().slice(s![..2, .., ..]));
    }

    #[test]
    fn test_new_validates_labels() {
        assert!(SyntheticDataset::new(Array3::zeros((2, 1, 1)), vec![0, 3]).is_err());
        assert!(SyntheticDataset::new(Array3::zeros((2, 1, 1)), vec![0]).is_err());
        assert!(SyntheticDataset::new(Array3::zeros((2, 1, 1)), vec![0, 2]).is_ok());
    }
}
