use std::io;
use std::path::PathBuf;

/// Reasons a stored row cannot be turned back into an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected} fields, got {found}")]
    MissingFields { expected: usize, found: usize },
    #[error("expected {expected} fields, got {found} (stray tab or line break?)")]
    ExtraFields { expected: usize, found: usize },
    #[error("invalid {field}: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("create dir {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema mismatch in {}: expected header {expected:?}, found {found:?}", path.display())]
    SchemaMismatch {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
