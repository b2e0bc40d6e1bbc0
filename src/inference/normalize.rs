use serde::{Deserialize, Serialize};

use crate::data::model::{FeatureVector, FEATURE_COUNT};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Min-max normalization
// ---------------------------------------------------------------------------

/// Per-feature range captured from a training set.
///
/// `max[i] >= min[i]` always holds; a column with `max == min` normalizes
/// to 0 everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl NormalizationParams {
    /// Column-wise min and max over `features`.
    pub fn fit(features: &[FeatureVector]) -> Result<Self> {
        if features.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let mut min = vec![f64::INFINITY; FEATURE_COUNT];
        let mut max = vec![f64::NEG_INFINITY; FEATURE_COUNT];
        for v in features {
            for (i, &x) in v.iter().enumerate() {
                min[i] = min[i].min(x);
                max[i] = max[i].max(x);
            }
        }
        Ok(Self { min, max })
    }

    /// Rescale one vector with the fitted ranges.
    pub fn apply_one(&self, v: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, slot) in out.iter_mut().enumerate() {
            let range = self.max[i] - self.min[i];
            *slot = if range.abs() < f64::EPSILON {
                0.0
            } else {
                (v[i] - self.min[i]) / range
            };
        }
        out
    }

    pub fn apply(&self, features: &[FeatureVector]) -> Vec<FeatureVector> {
        features.iter().map(|v| self.apply_one(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::CohortGenerator;

    fn vector(values: &[(usize, f64)]) -> FeatureVector {
        let mut v = [0.0; FEATURE_COUNT];
        for &(i, x) in values {
            v[i] = x;
        }
        v
    }

    #[test]
    fn fit_then_apply_maps_into_unit_interval() {
        let (features, _) = CohortGenerator::new(9).generate(120);
        let params = NormalizationParams::fit(&features).unwrap();
        let normalized = params.apply(&features);

        for (i, (&lo, &hi)) in params.min.iter().zip(&params.max).enumerate() {
            assert!(hi >= lo);
            let column: Vec<f64> = normalized.iter().map(|v| v[i]).collect();
            assert!(column.iter().all(|&x| (0.0..=1.0).contains(&x)));
            if hi > lo {
                let at_min = features.iter().position(|v| v[i] == lo).unwrap();
                let at_max = features.iter().position(|v| v[i] == hi).unwrap();
                assert_eq!(normalized[at_min][i], 0.0);
                assert!((normalized[at_max][i] - 1.0).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn degenerate_column_maps_to_zero() {
        let a = vector(&[(0, 5.0), (1, 1.0)]);
        let b = vector(&[(0, 5.0), (1, 3.0)]);
        let params = NormalizationParams::fit(&[a, b]).unwrap();
        let out = params.apply_one(&vector(&[(0, 9.0), (1, 2.0)]));
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn params_are_reused_not_refit() {
        let train = [vector(&[(0, 0.0)]), vector(&[(0, 10.0)])];
        let params = NormalizationParams::fit(&train).unwrap();
        let out = params.apply(&[vector(&[(0, 5.0)]), vector(&[(0, 20.0)])]);
        assert_eq!(out[0][0], 0.5);
        assert_eq!(out[1][0], 2.0);
    }

    #[test]
    fn fitting_nothing_is_an_error() {
        assert!(matches!(
            NormalizationParams::fit(&[]),
            Err(PipelineError::EmptyDataset)
        ));
    }
}
