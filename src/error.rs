use thiserror::Error;

/// Convenience result type used across the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Error type returned by ingestion, processing, and gateway operations.
///
/// The orchestrator never propagates these past a single unit of work (one file, one merge, one
/// record); they are reported to a [`crate::orchestrator::RunObserver`] and the unit is skipped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding/decoding error (stored records, notification payloads).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Object storage backend error.
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Required configuration is missing or invalid.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The input does not have the expected shape (missing columns, bad paths, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// Two datasets share no column name, so there is nothing to join on.
    #[error("no common key between '{left}' and '{right}'")]
    NoCommonKey { left: String, right: String },

    /// A record is missing the table's key attribute.
    #[error("record is missing key attribute '{attribute}'")]
    MissingKeyAttribute { attribute: String },

    /// An update tried to change something that cannot be changed.
    #[error("invalid update: {message}")]
    InvalidUpdate { message: String },

    /// A container, table, or topic name that cannot be used as a storage path segment.
    #[error("invalid resource name '{0}'")]
    InvalidName(String),

    /// The container has not been created.
    #[error("container '{0}' does not exist")]
    ContainerNotFound(String),

    /// A bucket could not be looked up or created.
    #[error("bucket '{bucket}': {message}")]
    Bucket { bucket: String, message: String },

    /// The table has not been created.
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// The topic has not been created.
    #[error("topic '{0}' does not exist")]
    TopicNotFound(String),
}

impl PipelineError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }
}
