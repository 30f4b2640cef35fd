//! The shape contract shared by the sampler, the trainer and the service.
//!
//! Every artifact records the [`InputShape`] it was produced for, and every
//! component reads the same `[shape]` configuration section, so a mismatch is
//! caught when artifacts are loaded instead of deep inside a matrix product.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ShapeError;

/// Number of output classes of the signal classifier.
pub const CLASS_COUNT: usize = 3;

/// Dimensions of one model input: `time_steps` rows of `features` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub time_steps: usize,
    pub features: usize,
}

impl InputShape {
    pub const fn new(time_steps: usize, features: usize) -> Self {
        Self {
            time_steps,
            features,
        }
    }

    /// Number of scalar values in one instance.
    pub fn len(&self) -> usize {
        self.time_steps * self.features
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that a batch of dimensions `(n, t, f)` is compatible with this shape.
    ///
    /// The batch dimension may be any value, including zero; callers that
    /// need a non-empty batch check that separately.
    pub fn check_batch(&self, dims: (usize, usize, usize)) -> Result<(), ShapeError> {
        let (_, t, f) = dims;
        if t != self.time_steps || f != self.features {
            return Err(ShapeError::Mismatch {
                expected: *self,
                actual: InputShape::new(t, f),
            });
        }
        Ok(())
    }

    /// Validate a nested `rows x values` sequence against this shape.
    ///
    /// Ragged rows are reported with the index of the first offending row.
    pub fn check_rows<R: AsRef<[f32]>>(&self, rows: &[R]) -> Result<(), ShapeError> {
        if rows.len() != self.time_steps {
            let features = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
            return Err(ShapeError::Mismatch {
                expected: *self,
                actual: InputShape::new(rows.len(), features),
            });
        }
        for (index, row) in rows.iter().enumerate() {
            let len = row.as_ref().len();
            if len != self.features {
                return Err(ShapeError::Row {
                    row: index,
                    expected: self.features,
                    actual: len,
                });
            }
        }
        Ok(())
    }
}

impl Default for InputShape {
    fn default() -> Self {
        Self::new(60, 15)
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.time_steps, self.features)
    }
}

/// The trading signal predicted by the classifier, in output-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Sell,
    Hold,
    Buy,
}

impl Signal {
    pub const ALL: [Signal; CLASS_COUNT] = [Signal::Sell, Signal::Hold, Signal::Buy];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
            Signal::Buy => "BUY",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
