//! Confusion matrix and macro-averaged classification metrics.
//!
//! Rows of the matrix are actual classes, columns are predicted classes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::model::{label_name, Label, CLASS_COUNT};

/// 3×3 count matrix, `cells[actual][predicted]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub cells: [[u64; CLASS_COUNT]; CLASS_COUNT],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(cells: [[u64; CLASS_COUNT]; CLASS_COUNT]) -> Self {
        Self { cells }
    }

    /// Accumulate paired labels. Pairs where either label is outside the
    /// known classes are left out.
    pub fn from_labels(predicted: &[Label], actual: &[Label]) -> Self {
        if predicted.len() != actual.len() {
            log::warn!(
                "Evaluating {} predictions against {} actual labels; extra entries ignored",
                predicted.len(),
                actual.len()
            );
        }
        let mut matrix = Self::new();
        for (&p, &a) in predicted.iter().zip(actual) {
            matrix.record(a, p);
        }
        matrix
    }

    /// Record one prediction. Returns `false` when the pair was excluded.
    pub fn record(&mut self, actual: Label, predicted: Label) -> bool {
        if actual >= CLASS_COUNT || predicted >= CLASS_COUNT {
            return false;
        }
        self.cells[actual][predicted] += 1;
        true
    }

    /// Total number of samples.
    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }

    /// Diagonal sum.
    pub fn correct(&self) -> u64 {
        (0..CLASS_COUNT).map(|i| self.cells[i][i]).sum()
    }

    pub fn true_positives(&self, class: Label) -> u64 {
        self.cells[class][class]
    }

    /// Predicted as `class` but actually something else.
    pub fn false_positives(&self, class: Label) -> u64 {
        (0..CLASS_COUNT)
            .filter(|&j| j != class)
            .map(|j| self.cells[j][class])
            .sum()
    }

    /// Actually `class` but predicted as something else.
    pub fn false_negatives(&self, class: Label) -> u64 {
        (0..CLASS_COUNT)
            .filter(|&j| j != class)
            .map(|j| self.cells[class][j])
            .sum()
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::from_confusion_matrix(self)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>16}", "actual \\ pred")?;
        for j in 0..CLASS_COUNT {
            write!(f, "{:>15}", label_name(j))?;
        }
        writeln!(f)?;
        for (i, row) in self.cells.iter().enumerate() {
            write!(f, "{:>16}", label_name(i))?;
            for count in row {
                write!(f, "{count:>15}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of actual instances of the class.
    pub support: u64,
}

/// Accuracy plus macro-averaged precision, recall and F1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    /// Harmonic mean of the macro precision and macro recall.
    pub f1: f64,
    pub per_class: Vec<ClassMetrics>,
}

impl Metrics {
    pub fn from_confusion_matrix(cm: &ConfusionMatrix) -> Self {
        let total = cm.total();
        let accuracy = ratio(cm.correct(), total);

        let per_class: Vec<ClassMetrics> = (0..CLASS_COUNT)
            .map(|class| {
                let tp = cm.true_positives(class);
                let precision = ratio(tp, tp + cm.false_positives(class));
                let recall = ratio(tp, tp + cm.false_negatives(class));
                ClassMetrics {
                    class: label_name(class),
                    precision,
                    recall,
                    f1: harmonic(precision, recall),
                    support: cm.cells[class].iter().sum(),
                }
            })
            .collect();

        let precision = per_class.iter().map(|c| c.precision).sum::<f64>() / CLASS_COUNT as f64;
        let recall = per_class.iter().map(|c| c.recall).sum::<f64>() / CLASS_COUNT as f64;

        Metrics {
            accuracy,
            precision,
            recall,
            f1: harmonic(precision, recall),
            per_class,
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acc={:.3} prec={:.3} rec={:.3} f1={:.3}",
            self.accuracy, self.precision, self.recall, self.f1
        )
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn harmonic(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_from_known_matrix() {
        let cm = ConfusionMatrix::from_cells([[45, 3, 2], [4, 42, 4], [3, 5, 42]]);
        let m = cm.metrics();
        assert_eq!(cm.total(), 150);
        assert!((m.accuracy - 0.86).abs() < 1e-9);

        // Column sums 52, 50, 48.
        let expected_precision = (45.0 / 52.0 + 42.0 / 50.0 + 42.0 / 48.0) / 3.0;
        let expected_recall = (45.0 / 50.0 + 42.0 / 50.0 + 42.0 / 50.0) / 3.0;
        assert!((m.precision - expected_precision).abs() < 1e-12);
        assert!((m.recall - expected_recall).abs() < 1e-12);
        let f1 = 2.0 * expected_precision * expected_recall / (expected_precision + expected_recall);
        assert!((m.f1 - f1).abs() < 1e-12);
        assert_eq!(m.per_class[0].support, 50);
    }

    #[test]
    fn empty_input_gives_zero_metrics() {
        let m = ConfusionMatrix::from_labels(&[], &[]).metrics();
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn cell_sum_counts_only_resolvable_pairs() {
        let predicted = [0, 1, 2, 2, 1];
        let actual = [0, 1, 9, 2, 0];
        let cm = ConfusionMatrix::from_labels(&predicted, &actual);
        assert_eq!(cm.total(), 4);
        assert_eq!(cm.cells[0][1], 1);
        assert_eq!(cm.correct(), 3);
        assert_eq!(cm.false_positives(1), 1);
        assert_eq!(cm.false_negatives(0), 1);
    }

    #[test]
    fn class_never_predicted_has_zero_precision() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 0], &[0, 1, 2]);
        let m = cm.metrics();
        assert_eq!(m.per_class[1].precision, 0.0);
        assert_eq!(m.per_class[1].recall, 0.0);
        assert_eq!(m.per_class[0].recall, 1.0);
        assert!((m.accuracy - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn display_lists_every_class() {
        let text = ConfusionMatrix::from_labels(&[0, 1], &[0, 1]).to_string();
        assert!(text.contains("dengue"));
        assert!(text.contains("leptospirosis"));
    }
}
