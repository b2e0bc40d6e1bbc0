use thiserror::Error;

// ---------------------------------------------------------------------------
// PipelineError – everything the core can surface to a caller
// ---------------------------------------------------------------------------

/// Errors raised by parsing, encoding, training and inference.
///
/// Every variant is terminal for the request that triggered it; nothing in
/// the core retries internally.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Fewer than two usable lines/rows, an unreadable container, or an
    /// unsupported file type.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Encoding left no rows after filtering.
    #[error("dataset contains no usable rows")]
    EmptyDataset,

    /// Inference was requested before a model was trained in this session.
    #[error("no trained model available; run training first")]
    ModelUnavailable,

    /// The classifier failed while fitting. No partial model is kept.
    #[error("training failed: {0}")]
    TrainingFailure(String),

    /// The classifier failed while scoring rows with a trained model.
    #[error("inference failed: {0}")]
    InferenceFailure(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        PipelineError::MalformedInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
