use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Conditions that stop a run. Everything else is counted and reported.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("missing required configuration: {0}")]
    MissingConfig(String),
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("could not decode {} with any supported text encoding", .0.display())]
    Undecodable(PathBuf),
    #[error("{} is missing required columns {missing:?} (decoded as {encoding})", .path.display())]
    MissingColumns {
        path: PathBuf,
        encoding: String,
        missing: Vec<String>,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A store rejected a write or a read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Why a single record did not make it through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    MissingRequired { field: &'static str },
    Unkeyable { field: &'static str },
    StoreRejected { message: String },
    ServiceStatus { status: u16 },
    ServiceTransport { message: String },
    BadVector { expected: usize, actual: usize },
}

impl FailureReason {
    /// Short stable code for logs and summaries.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::MissingRequired { .. } => "missing_required",
            FailureReason::Unkeyable { .. } => "unkeyable",
            FailureReason::StoreRejected { .. } => "store_rejected",
            FailureReason::ServiceStatus { .. } => "service_status",
            FailureReason::ServiceTransport { .. } => "service_transport",
            FailureReason::BadVector { .. } => "bad_vector",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingRequired { field } => write!(f, "missing required field {field}"),
            FailureReason::Unkeyable { field } => write!(f, "no usable value for {field}"),
            FailureReason::StoreRejected { message } => write!(f, "store rejected: {message}"),
            FailureReason::ServiceStatus { status } => write!(f, "service returned {status}"),
            FailureReason::ServiceTransport { message } => write!(f, "service call failed: {message}"),
            FailureReason::BadVector { expected, actual } => {
                write!(f, "expected {expected} dimensions, got {actual}")
            }
        }
    }
}

/// A counted, non-fatal failure attached to the record it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub key: String,
    pub reason: FailureReason,
}

impl From<StoreError> for FailureReason {
    fn from(e: StoreError) -> Self {
        FailureReason::StoreRejected {
            message: e.to_string(),
        }
    }
}
