use serde::Serialize;
use usage_store::StoreError;

/// Summary of one sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub session_files: usize,
    pub event_rows: usize,
    pub live_event_rows: usize,
    pub source_root: String,
    pub issues: Vec<IngestIssue>,
}

/// Non-fatal issues encountered during a sync.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub file_path: String,
    pub message: String,
}

/// Errors that abort a sync run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, IngestError>;
