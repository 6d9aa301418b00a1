//! Error taxonomy shared by every pipeline stage.
//!
//! All variants are deterministic consequences of bad input. Nothing here is
//! retried.

/// Errors raised by the aligner, feature synthesizer, estimator and recommender.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or missing required columns/values.
    #[error("data error: {0}")]
    Data(String),

    /// The requested window starts after it ends.
    #[error("empty window: start {start} is after end {end}")]
    EmptyWindow { start: String, end: String },

    /// Candidate spacing of zero minutes.
    #[error("invalid candidate interval: {0} minutes")]
    InvalidInterval(u32),

    /// No historical feature rows to build any fallback level from.
    #[error("no historical feature rows available")]
    NoHistory,

    /// Too few labelled rows to form non-empty train and test partitions.
    #[error("insufficient training data: {rows} labelled rows cannot be split into train/test")]
    TrainingInsufficiency { rows: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
