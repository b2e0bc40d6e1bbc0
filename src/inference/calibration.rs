use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::classifier::{argmax, Probabilities};
use crate::data::model::{label_name, Label, CLASS_COUNT};

/// Temperature applied to every decision. Lower values sharpen the
/// distribution. Fixed at build time, not read from config or flags.
pub const DEFAULT_TEMPERATURE: f64 = 0.4;

/// Default confidence floor for the `demo` strategy.
pub const DEFAULT_DEMO_CONFIDENCE_FLOOR: f64 = 0.6;

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// How raw classifier output turns into a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStrategy {
    /// Temperature scaling followed by an honest argmax.
    #[default]
    Temperature,
    /// Temperature scaling, then the scaled distribution is rotated one place
    /// before the argmax; batches additionally get a balanced label
    /// assignment and a confidence floor. Decisions do not track the input
    /// features. Demonstration only.
    Demo,
}

/// One calibrated decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub label: Label,
    pub confidence: f64,
    /// Scaled probability per disease name.
    pub probabilities: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Calibrator {
    temperature: f64,
    pub strategy: CalibrationStrategy,
    pub demo_confidence_floor: f64,
    pub demo_seed: u64,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            strategy: CalibrationStrategy::Temperature,
            demo_confidence_floor: DEFAULT_DEMO_CONFIDENCE_FLOOR,
            demo_seed: 0,
        }
    }
}

impl Calibrator {
    pub fn new(strategy: CalibrationStrategy, demo_confidence_floor: f64, demo_seed: u64) -> Self {
        Self {
            strategy,
            demo_confidence_floor,
            demo_seed,
            ..Default::default()
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// `p^(1/T)`, renormalized to sum to 1. A distribution with no mass
    /// becomes uniform.
    pub fn scale(&self, raw: &[f64]) -> Probabilities {
        let exponent = 1.0 / self.temperature;
        let mut scaled = [0.0; CLASS_COUNT];
        for (s, &p) in scaled.iter_mut().zip(raw) {
            let p = if p.is_finite() { p.max(0.0) } else { 0.0 };
            *s = p.powf(exponent);
        }
        let sum: f64 = scaled.iter().sum();
        if sum > 0.0 && sum.is_finite() {
            for s in &mut scaled {
                *s /= sum;
            }
        } else {
            scaled = [1.0 / CLASS_COUNT as f64; CLASS_COUNT];
        }
        scaled
    }

    /// Calibrate one raw probability row.
    pub fn decide(&self, raw: &[f64]) -> Decision {
        let mut scaled = self.scale(raw);
        if self.strategy == CalibrationStrategy::Demo {
            scaled.rotate_left(1);
        }
        let label = argmax(&scaled);
        Decision {
            label,
            confidence: scaled[label],
            probabilities: named(&scaled),
        }
    }

    /// Calibrate a batch in parallel. Output order matches input order.
    pub fn decide_batch(&self, raw: &[Probabilities]) -> Vec<Decision> {
        let mut decisions: Vec<Decision> = raw.par_iter().map(|p| self.decide(p)).collect();

        if self.strategy == CalibrationStrategy::Demo {
            log::warn!(
                "Demo calibration: replacing {} model decisions with a balanced assignment",
                decisions.len()
            );
            let labels = self.balanced_assignment(decisions.len());
            for (decision, label) in decisions.iter_mut().zip(labels) {
                decision.label = label;
                let p = decision.probabilities.get(&label_name(label)).copied().unwrap_or(0.0);
                decision.confidence = p.max(self.demo_confidence_floor);
            }
        }
        decisions
    }

    fn balanced_assignment(&self, n: usize) -> Vec<Label> {
        let mut labels: Vec<Label> = (0..n).map(|i| i % CLASS_COUNT).collect();
        labels.shuffle(&mut StdRng::seed_from_u64(self.demo_seed));
        labels
    }
}

fn named(scaled: &Probabilities) -> BTreeMap<String, f64> {
    scaled
        .iter()
        .enumerate()
        .map(|(i, &p)| (label_name(i), p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(temperature: f64) -> Calibrator {
        Calibrator {
            temperature,
            ..Default::default()
        }
    }

    #[test]
    fn default_temperature_is_fixed() {
        let c = Calibrator::new(CalibrationStrategy::Demo, 0.7, 9);
        assert_eq!(c.temperature(), DEFAULT_TEMPERATURE);
        assert_eq!(c.strategy, CalibrationStrategy::Demo);
    }

    #[test]
    fn low_temperature_sharpens() {
        let raw = [0.4, 0.35, 0.25];
        let decision = at(0.4).decide(&raw);
        assert_eq!(decision.label, 0);
        assert!(decision.confidence > 0.4);
        assert!((decision.confidence - 0.4939).abs() < 1e-3);
        let total: f64 = decision.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-12);

        let sharper = at(0.2).decide(&raw);
        assert_eq!(sharper.label, 0);
        assert!(sharper.confidence > 0.6);
    }

    #[test]
    fn temperature_one_is_identity() {
        let scaled = at(1.0).scale(&[0.2, 0.3, 0.5]);
        assert!((scaled[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ties_go_to_lowest_class_and_empty_mass_is_uniform() {
        let c = Calibrator::default();
        assert_eq!(c.decide(&[0.3, 0.35, 0.35]).label, 1);
        let d = c.decide(&[0.0, 0.0, 0.0]);
        assert_eq!(d.label, 0);
        assert!((d.confidence - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(d.probabilities["malaria"], d.confidence);
    }

    #[test]
    fn demo_rotates_before_argmax() {
        let demo = Calibrator::new(CalibrationStrategy::Demo, DEFAULT_DEMO_CONFIDENCE_FLOOR, 0);
        let raw = [0.7, 0.2, 0.1];
        assert_eq!(Calibrator::default().decide(&raw).label, 0);
        // Rotated left: [p1, p2, p0], so the dengue mass lands on class 2.
        assert_eq!(demo.decide(&raw).label, 2);
    }

    #[test]
    fn demo_batch_is_balanced_with_floor() {
        let demo = Calibrator::new(CalibrationStrategy::Demo, 0.75, 0);
        let raw = vec![[0.9, 0.05, 0.05]; 9];
        let decisions = demo.decide_batch(&raw);
        for class in 0..CLASS_COUNT {
            assert_eq!(decisions.iter().filter(|d| d.label == class).count(), 3);
        }
        assert!(decisions.iter().all(|d| d.confidence >= 0.75));
    }

    #[test]
    fn batch_preserves_order() {
        let raw: Vec<Probabilities> = (0..50)
            .map(|i| match i % 3 {
                0 => [0.8, 0.1, 0.1],
                1 => [0.1, 0.8, 0.1],
                _ => [0.1, 0.1, 0.8],
            })
            .collect();
        let decisions = Calibrator::default().decide_batch(&raw);
        for (i, d) in decisions.iter().enumerate() {
            assert_eq!(d.label, i % 3);
        }
    }
}
