//! Febrile illness classification pipeline.
//!
//! Tabular input (CSV, spreadsheet or Parquet) is parsed, encoded into
//! fixed 53-slot feature vectors, normalized with ranges captured at training
//! time, scored by a [`TrainableClassifier`](inference::classifier::TrainableClassifier)
//! and calibrated into a decision. Labelled batches are evaluated with a
//! confusion matrix and macro metrics.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod session;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use session::{BatchResult, Session, TrainingData};
