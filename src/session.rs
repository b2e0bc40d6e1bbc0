use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::PipelineConfig;
use crate::data::encoder::FeatureEncoder;
use crate::data::loader::TabularParser;
use crate::data::model::{label_name, EncodedDataset, FeatureVector, Label, Record};
use crate::data::synthetic::CohortGenerator;
use crate::error::{PipelineError, Result};
use crate::evaluation::{ConfusionMatrix, Metrics};
use crate::inference::calibration::{Calibrator, Decision};
use crate::inference::classifier::{EpochProgress, TrainableClassifier};
use crate::inference::normalize::NormalizationParams;

// ---------------------------------------------------------------------------
// Training inputs and outputs
// ---------------------------------------------------------------------------

/// Where a training run gets its data.
#[derive(Debug, Clone)]
pub enum TrainingData {
    /// Fresh synthetic cohort sized by the session config.
    Synthetic,
    /// An explicitly supplied labelled dataset.
    Dataset(EncodedDataset),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    /// `"synthetic"` or `"dataset"`.
    pub source: &'static str,
    pub samples: usize,
    pub epochs: usize,
    pub final_loss: f64,
    pub final_accuracy: f64,
}

/// The one model + normalization pair a session serves from.
struct TrainedModel<M> {
    model: M,
    params: NormalizationParams,
    summary: TrainingSummary,
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub id: String,
    pub predicted_label: Label,
    pub predicted: String,
    pub actual_label: Option<Label>,
    pub confidence: f64,
    pub probabilities: std::collections::BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub predictions: Vec<Prediction>,
    pub confusion_matrix: Option<ConfusionMatrix>,
    pub metrics: Option<Metrics>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Owns the active model and its normalization parameters.
///
/// Nothing is shared between sessions and nothing outlives the process.
/// Training takes `&mut self`, so runs on one session never overlap.
pub struct Session<C: TrainableClassifier> {
    classifier: Arc<C>,
    config: PipelineConfig,
    encoder: FeatureEncoder,
    calibrator: Calibrator,
    trained: Option<TrainedModel<C::Model>>,
}

impl<C: TrainableClassifier> Session<C> {
    pub fn new(classifier: C, config: PipelineConfig) -> Self {
        Self {
            classifier: Arc::new(classifier),
            encoder: FeatureEncoder::new(&config.urban_aliases),
            calibrator: config.calibrator(),
            config,
            trained: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    pub fn normalization(&self) -> Option<&NormalizationParams> {
        self.trained.as_ref().map(|t| &t.params)
    }

    pub fn training_summary(&self) -> Option<&TrainingSummary> {
        self.trained.as_ref().map(|t| &t.summary)
    }

    /// Fit a fresh model, replacing the current one only on success.
    pub fn train(
        &mut self,
        data: TrainingData,
        on_epoch_end: &mut dyn FnMut(EpochProgress),
    ) -> Result<TrainingSummary> {
        let (source, features, labels) = self.training_set(data)?;
        let trained = fit(self.classifier.as_ref(), source, &features, &labels, on_epoch_end)?;
        Ok(self.install(trained))
    }

    /// Same as [`Session::train`], but the fit runs on a blocking task and
    /// every epoch is forwarded to `progress`. The caller awaits completion.
    pub async fn train_async(
        &mut self,
        data: TrainingData,
        progress: Option<UnboundedSender<EpochProgress>>,
    ) -> Result<TrainingSummary>
    where
        C: 'static,
        C::Model: 'static,
    {
        let (source, features, labels) = self.training_set(data)?;
        let classifier = Arc::clone(&self.classifier);

        let trained = tokio::task::spawn_blocking(move || {
            let mut forward = |p: EpochProgress| {
                if let Some(tx) = &progress {
                    // A dropped receiver only means nobody is watching.
                    let _ = tx.send(p);
                }
            };
            fit(classifier.as_ref(), source, &features, &labels, &mut forward)
        })
        .await
        .map_err(|e| PipelineError::TrainingFailure(format!("training task aborted: {e}")))??;

        Ok(self.install(trained))
    }

    /// Classify a single record.
    pub fn classify(&self, record: &Record) -> Result<Decision> {
        let trained = self.trained.as_ref().ok_or(PipelineError::ModelUnavailable)?;
        let features = self.encoder.encode_record(record)?;
        let raw = self.raw_probabilities(trained, &[features])?;
        let row = raw.first().ok_or(PipelineError::EmptyDataset)?;
        Ok(self.calibrator.decide(row))
    }

    /// Classify every row of an encoded dataset; evaluate when labels exist.
    pub fn predict_batch(&self, dataset: &EncodedDataset) -> Result<BatchResult> {
        let trained = self.trained.as_ref().ok_or(PipelineError::ModelUnavailable)?;
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }

        let raw = self.raw_probabilities(trained, &dataset.features)?;
        let decisions = self.calibrator.decide_batch(&raw);

        let predictions: Vec<Prediction> = decisions
            .into_iter()
            .enumerate()
            .map(|(i, d)| Prediction {
                id: dataset.ids.get(i).cloned().unwrap_or_else(|| (i + 1).to_string()),
                predicted_label: d.label,
                predicted: label_name(d.label),
                actual_label: if dataset.has_labels { dataset.labels.get(i).copied() } else { None },
                confidence: d.confidence,
                probabilities: d.probabilities,
            })
            .collect();

        let (confusion_matrix, metrics) = if dataset.has_labels {
            let predicted: Vec<Label> = predictions.iter().map(|p| p.predicted_label).collect();
            let cm = ConfusionMatrix::from_labels(&predicted, &dataset.labels);
            let metrics = cm.metrics();
            log::info!("Evaluated {} labelled records: {metrics}", cm.total());
            (Some(cm), Some(metrics))
        } else {
            (None, None)
        };

        Ok(BatchResult {
            predictions,
            confusion_matrix,
            metrics,
        })
    }

    /// Parse, encode and classify a file in one go.
    pub fn predict_file(&self, parser: &TabularParser, path: &Path) -> Result<BatchResult> {
        let (headers, rows) = parser.load_file(path)?;
        let dataset = self.encoder.encode(&headers, &rows)?;
        self.predict_batch(&dataset)
    }

    fn raw_probabilities(
        &self,
        trained: &TrainedModel<C::Model>,
        features: &[FeatureVector],
    ) -> Result<Vec<[f64; 3]>> {
        let normalized = trained.params.apply(features);
        self.classifier
            .predict(&trained.model, &normalized)
            .map_err(|e| PipelineError::InferenceFailure(format!("{e:#}")))
    }

    fn training_set(&self, data: TrainingData) -> Result<(&'static str, Vec<FeatureVector>, Vec<Label>)> {
        match data {
            TrainingData::Synthetic => {
                let mut generator = CohortGenerator::new(self.config.seed);
                let (features, labels) = generator.generate(self.config.synthetic_samples);
                Ok(("synthetic", features, labels))
            }
            TrainingData::Dataset(ds) => {
                if !ds.has_labels {
                    return Err(PipelineError::malformed(
                        "training data needs a diagnosis column",
                    ));
                }
                if ds.is_empty() {
                    return Err(PipelineError::EmptyDataset);
                }
                Ok(("dataset", ds.features, ds.labels))
            }
        }
    }

    fn install(&mut self, trained: TrainedModel<C::Model>) -> TrainingSummary {
        let summary = trained.summary.clone();
        log::info!(
            "Trained on {} {} samples: loss={:.4} acc={:.3}",
            summary.samples,
            summary.source,
            summary.final_loss,
            summary.final_accuracy
        );
        self.trained = Some(trained);
        summary
    }
}

/// Normalize, then fit. Shared by the blocking and async paths.
fn fit<C: TrainableClassifier>(
    classifier: &C,
    source: &'static str,
    features: &[FeatureVector],
    labels: &[Label],
    on_epoch_end: &mut dyn FnMut(EpochProgress),
) -> Result<TrainedModel<C::Model>> {
    let params = NormalizationParams::fit(features)?;
    let normalized = params.apply(features);

    let mut last: Option<EpochProgress> = None;
    let model = classifier
        .fit(&normalized, labels, &mut |p| {
            last = Some(p);
            on_epoch_end(p);
        })
        .map_err(|e| PipelineError::TrainingFailure(format!("{e:#}")))?;

    Ok(TrainedModel {
        model,
        params,
        summary: TrainingSummary {
            source,
            samples: features.len(),
            epochs: last.map_or(0, |p| p.epoch),
            final_loss: last.map_or(0.0, |p| p.loss),
            final_accuracy: last.map_or(0.0, |p| p.accuracy),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::calibration::CalibrationStrategy;
    use crate::inference::classifier::{SoftmaxConfig, SoftmaxRegression};

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            synthetic_samples: 300,
            classifier: SoftmaxConfig {
                epochs: 60,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn session() -> Session<SoftmaxRegression> {
        let config = quick_config();
        Session::new(SoftmaxRegression::new(config.classifier.clone()), config)
    }

    struct FailingClassifier;

    impl TrainableClassifier for FailingClassifier {
        type Model = ();

        fn fit(
            &self,
            _features: &[FeatureVector],
            _labels: &[Label],
            _on_epoch_end: &mut dyn FnMut(EpochProgress),
        ) -> anyhow::Result<()> {
            anyhow::bail!("optimizer exploded")
        }

        fn predict(&self, _model: &(), rows: &[FeatureVector]) -> anyhow::Result<Vec<[f64; 3]>> {
            Ok(vec![[1.0, 0.0, 0.0]; rows.len()])
        }
    }

    struct BrokenPredictor;

    impl TrainableClassifier for BrokenPredictor {
        type Model = ();

        fn fit(
            &self,
            _features: &[FeatureVector],
            _labels: &[Label],
            _on_epoch_end: &mut dyn FnMut(EpochProgress),
        ) -> anyhow::Result<()> {
            Ok(())
        }

        fn predict(&self, _model: &(), _rows: &[FeatureVector]) -> anyhow::Result<Vec<[f64; 3]>> {
            anyhow::bail!("weights corrupted")
        }
    }

    #[test]
    fn inference_before_training_is_model_unavailable() {
        let s = session();
        assert!(!s.is_trained());
        assert!(matches!(s.classify(&Record::new()), Err(PipelineError::ModelUnavailable)));
        let ds = EncodedDataset {
            features: vec![[0.0; 53]],
            row_count: 1,
            ids: vec!["1".into()],
            ..Default::default()
        };
        assert!(matches!(s.predict_batch(&ds), Err(PipelineError::ModelUnavailable)));
    }

    #[test]
    fn synthetic_training_then_classify() {
        let mut s = session();
        let mut epochs = 0;
        let summary = s.train(TrainingData::Synthetic, &mut |_| epochs += 1).unwrap();
        assert_eq!(epochs, 60);
        assert_eq!(summary.source, "synthetic");
        assert_eq!(summary.samples, 300);
        assert!(s.normalization().is_some());

        let mut record = Record::new();
        record.set("fever", "1");
        record.set("jaundice", "1");
        let decision = s.classify(&record).unwrap();
        assert!(decision.label < 3);
        assert!(decision.confidence > 0.0 && decision.confidence <= 1.0);
        assert_eq!(decision.probabilities.len(), 3);
    }

    #[test]
    fn batch_on_labelled_data_reports_metrics() {
        let mut s = session();
        s.train(TrainingData::Synthetic, &mut |_| {}).unwrap();

        let (headers, rows) = CohortGenerator::new(99).generate_table(60);
        let ds = s.encoder().encode(&headers, &rows).unwrap();
        let result = s.predict_batch(&ds).unwrap();

        assert_eq!(result.predictions.len(), 60);
        let cm = result.confusion_matrix.unwrap();
        assert_eq!(cm.total(), 60);
        let metrics = result.metrics.unwrap();
        assert!(metrics.accuracy > 0.5);
        assert!(result.predictions.iter().all(|p| p.actual_label.is_some()));
        assert_eq!(result.predictions[0].id, "1");
    }

    #[test]
    fn unlabelled_batch_has_no_metrics() {
        let mut s = session();
        s.train(TrainingData::Synthetic, &mut |_| {}).unwrap();
        let headers = vec!["age".to_string(), "fever".to_string()];
        let rows = vec![vec!["30".to_string(), "1".to_string()]];
        let ds = s.encoder().encode(&headers, &rows).unwrap();
        let result = s.predict_batch(&ds).unwrap();
        assert!(result.confusion_matrix.is_none());
        assert!(result.metrics.is_none());
        assert_eq!(result.predictions[0].actual_label, None);
    }

    #[test]
    fn training_on_unlabelled_dataset_is_rejected() {
        let mut s = session();
        let ds = EncodedDataset {
            features: vec![[0.0; 53]],
            row_count: 1,
            ..Default::default()
        };
        assert!(matches!(
            s.train(TrainingData::Dataset(ds), &mut |_| {}),
            Err(PipelineError::MalformedInput(_))
        ));
        assert!(!s.is_trained());
    }

    #[test]
    fn failed_fit_keeps_previous_state() {
        let mut s = Session::new(FailingClassifier, quick_config());
        let err = s.train(TrainingData::Synthetic, &mut |_| {}).unwrap_err();
        assert!(matches!(err, PipelineError::TrainingFailure(msg) if msg.contains("exploded")));
        assert!(!s.is_trained());
    }

    #[test]
    fn failed_predict_is_an_inference_failure() {
        let mut s = Session::new(BrokenPredictor, quick_config());
        s.train(TrainingData::Synthetic, &mut |_| {}).unwrap();
        let err = s.classify(&Record::new()).unwrap_err();
        assert!(matches!(err, PipelineError::InferenceFailure(msg) if msg.contains("corrupted")));
        assert!(s.is_trained());
    }

    #[test]
    fn demo_strategy_is_opt_in() {
        let mut config = quick_config();
        config.calibration = CalibrationStrategy::Demo;
        let mut s = Session::new(SoftmaxRegression::new(config.classifier.clone()), config);
        s.train(TrainingData::Synthetic, &mut |_| {}).unwrap();

        let (headers, rows) = CohortGenerator::new(4).generate_table(30);
        let ds = s.encoder().encode(&headers, &rows).unwrap();
        let result = s.predict_batch(&ds).unwrap();
        for class in 0..3 {
            let n = result.predictions.iter().filter(|p| p.predicted_label == class).count();
            assert_eq!(n, 10);
        }
    }

    #[tokio::test]
    async fn async_training_streams_progress() {
        let mut s = session();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let summary = s.train_async(TrainingData::Synthetic, Some(tx)).await.unwrap();

        let mut events = Vec::new();
        while let Some(p) = rx.recv().await {
            events.push(p);
        }
        assert_eq!(events.len(), 60);
        assert_eq!(events.last().unwrap().epoch, summary.epochs);
        assert!(s.is_trained());
    }
}
