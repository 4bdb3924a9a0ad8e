use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatalensError {
    /// Upstream generative-service failure (network, non-success status,
    /// missing or empty candidates). Retryable.
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Schema introspection error: {0}")]
    Schema(String),

    /// The model produced output the pipeline cannot proceed with
    /// (unparseable JSON, missing `sql` field, bad chart config). Fatal.
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    /// Caller-side input rejected before any work is done. Fatal, not retried.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatalensError {
    /// Whether a retry with backoff is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatalensError::Llm(_))
    }
}

pub type Result<T> = std::result::Result<T, DatalensError>;
