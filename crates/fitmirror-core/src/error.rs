use std::path::PathBuf;

/// Failures raised by [`crate::store::ActivityStore`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid store filename '{0}'")]
    InvalidFilename(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A persisted or remote activity document that could not be interpreted.
#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("malformed activity {name}: {reason}")]
    Malformed { name: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    pub(crate) fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RecordError::Malformed {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by a remote activity source.
///
/// `NotAvailable` is deliberately absent: a missing representation is an
/// outcome, see [`crate::source::FetchOutcome`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Transient(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("malformed activity: {0}")]
    Malformed(String),
}

impl SourceError {
    /// Whether the failure only concerns the activity being processed.
    pub fn is_per_activity(&self) -> bool {
        matches!(self, SourceError::Malformed(_))
    }
}

/// Run-fatal failures of [`crate::sync::SyncEngine::sync`].
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
