//! The trainable classifier seam.
//!
//! The pipeline only ever sees [`TrainableClassifier`]: fit on normalized
//! features, then predict raw per-class probabilities. [`SoftmaxRegression`]
//! is the implementation the binaries use.

use serde::{Deserialize, Serialize};

use crate::data::model::{FeatureVector, Label, CLASS_COUNT, FEATURE_COUNT};

/// Raw, uncalibrated class probabilities for one record.
pub type Probabilities = [f64; CLASS_COUNT];

/// Progress reported at the end of every training epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochProgress {
    /// 1-based epoch number.
    pub epoch: usize,
    pub epochs: usize,
    pub loss: f64,
    pub accuracy: f64,
}

/// Anything that can be fit on normalized features and then predict raw
/// class probabilities.
pub trait TrainableClassifier: Send + Sync {
    type Model: Send + Sync;

    fn fit(
        &self,
        features: &[FeatureVector],
        labels: &[Label],
        on_epoch_end: &mut dyn FnMut(EpochProgress),
    ) -> anyhow::Result<Self::Model>;

    fn predict(&self, model: &Self::Model, rows: &[FeatureVector]) -> anyhow::Result<Vec<Probabilities>>;
}

// ---------------------------------------------------------------------------
// SoftmaxRegression
// ---------------------------------------------------------------------------

/// Training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftmaxConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for SoftmaxConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.5,
            l2: 1e-4,
        }
    }
}

/// Multinomial logistic regression trained by full-batch gradient descent.
#[derive(Debug, Clone, Default)]
pub struct SoftmaxRegression {
    pub config: SoftmaxConfig,
}

/// Fitted weights: one row of `FEATURE_COUNT` weights plus a bias per class.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxModel {
    pub weights: Vec<FeatureVector>,
    pub bias: [f64; CLASS_COUNT],
}

impl SoftmaxModel {
    fn zeros() -> Self {
        Self {
            weights: vec![[0.0; FEATURE_COUNT]; CLASS_COUNT],
            bias: [0.0; CLASS_COUNT],
        }
    }

    fn probabilities(&self, x: &FeatureVector) -> Probabilities {
        let mut logits = self.bias;
        for (logit, w) in logits.iter_mut().zip(&self.weights) {
            *logit += w.iter().zip(x.iter()).map(|(a, b)| a * b).sum::<f64>();
        }
        softmax(&logits)
    }
}

fn softmax(logits: &[f64; CLASS_COUNT]) -> Probabilities {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0; CLASS_COUNT];
    let mut sum = 0.0;
    for (o, &l) in out.iter_mut().zip(logits) {
        *o = (l - max).exp();
        sum += *o;
    }
    for o in &mut out {
        *o /= sum;
    }
    out
}

impl SoftmaxRegression {
    pub fn new(config: SoftmaxConfig) -> Self {
        Self { config }
    }
}

impl TrainableClassifier for SoftmaxRegression {
    type Model = SoftmaxModel;

    fn fit(
        &self,
        features: &[FeatureVector],
        labels: &[Label],
        on_epoch_end: &mut dyn FnMut(EpochProgress),
    ) -> anyhow::Result<SoftmaxModel> {
        anyhow::ensure!(!features.is_empty(), "cannot fit on an empty training set");
        anyhow::ensure!(
            features.len() == labels.len(),
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        );
        if let Some(bad) = labels.iter().find(|&&l| l >= CLASS_COUNT) {
            anyhow::bail!("label {bad} is outside 0..{CLASS_COUNT}");
        }
        anyhow::ensure!(self.config.epochs > 0, "epochs must be positive");

        let n = features.len() as f64;
        let mut model = SoftmaxModel::zeros();

        for epoch in 1..=self.config.epochs {
            let mut grad_w = vec![[0.0; FEATURE_COUNT]; CLASS_COUNT];
            let mut grad_b = [0.0; CLASS_COUNT];
            let mut loss = 0.0;
            let mut correct = 0usize;

            for (x, &y) in features.iter().zip(labels) {
                let p = model.probabilities(x);
                loss -= p[y].max(1e-12).ln();
                if argmax(&p) == y {
                    correct += 1;
                }
                for class in 0..CLASS_COUNT {
                    let err = p[class] - if class == y { 1.0 } else { 0.0 };
                    grad_b[class] += err;
                    for (g, &xi) in grad_w[class].iter_mut().zip(x.iter()) {
                        *g += err * xi;
                    }
                }
            }

            let lr = self.config.learning_rate;
            for class in 0..CLASS_COUNT {
                for (w, g) in model.weights[class].iter_mut().zip(&grad_w[class]) {
                    *w -= lr * (g / n + self.config.l2 * *w);
                }
                model.bias[class] -= lr * grad_b[class] / n;
            }

            anyhow::ensure!(loss.is_finite(), "loss diverged at epoch {epoch}");

            let progress = EpochProgress {
                epoch,
                epochs: self.config.epochs,
                loss: loss / n,
                accuracy: correct as f64 / n,
            };
            log::debug!(
                "epoch {:3} | loss={:.4} acc={:.3}",
                progress.epoch,
                progress.loss,
                progress.accuracy
            );
            on_epoch_end(progress);
        }

        Ok(model)
    }

    fn predict(&self, model: &SoftmaxModel, rows: &[FeatureVector]) -> anyhow::Result<Vec<Probabilities>> {
        Ok(rows.iter().map(|x| model.probabilities(x)).collect())
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
