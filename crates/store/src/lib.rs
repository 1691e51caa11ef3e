mod atomic;
mod codec;
mod error;

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use usage_core::{LiveEvent, ProjectEntry, UsageEvent};

pub use atomic::write_atomic;
pub use codec::{EVENTS_HEADER, LIVE_EVENTS_HEADER, TsvRecord};
pub use error::{DecodeError, Result, StoreError};

pub const EVENTS_FILE: &str = "events.tsv";
pub const LIVE_EVENTS_FILE: &str = "live-events.tsv";
pub const PROJECTS_FILE: &str = "projects.json";
pub const ACCOUNT_FILE: &str = "account.json";
pub const SYNC_STATUS_FILE: &str = "sync-status.json";

/// Contents of `sync-status.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync_epoch: i64,
    pub last_sync_iso: String,
    pub source_root: String,
    pub session_files: usize,
    pub event_rows: usize,
    pub live_event_rows: usize,
}

/// Handle on a data root holding the generated reports.
///
/// Every write replaces its file atomically. A single writer per data root is
/// assumed; readers may run at any time.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    /// Opens the store, creating the data root if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Opens the store without touching the filesystem, for read-only use.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    pub fn write_events(&self, events: &[UsageEvent]) -> Result<()> {
        self.write_records(EVENTS_FILE, events)
    }

    pub fn write_live_events(&self, events: &[LiveEvent]) -> Result<()> {
        self.write_records(LIVE_EVENTS_FILE, events)
    }

    pub fn write_projects(&self, projects: &[ProjectEntry]) -> Result<()> {
        self.write_json(PROJECTS_FILE, &projects)
    }

    pub fn write_account(&self, account: &serde_json::Value) -> Result<()> {
        self.write_json(ACCOUNT_FILE, account)
    }

    pub fn write_sync_status(&self, status: &SyncStatus) -> Result<()> {
        self.write_json(SYNC_STATUS_FILE, status)
    }

    pub fn read_events(&self) -> Result<Vec<UsageEvent>> {
        self.read_records(EVENTS_FILE)
    }

    pub fn read_live_events(&self) -> Result<Vec<LiveEvent>> {
        self.read_records(LIVE_EVENTS_FILE)
    }

    /// Returns `None` when no sync has completed yet.
    pub fn read_sync_status(&self) -> Result<Option<SyncStatus>> {
        let path = self.path(SYNC_STATUS_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io(path, err)),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write_records<T: TsvRecord>(&self, file: &str, records: &[T]) -> Result<()> {
        let mut out = String::with_capacity(T::HEADER.len() + 1 + records.len() * 96);
        out.push_str(T::HEADER);
        out.push('\n');
        for record in records {
            out.push_str(&record.encode());
            out.push('\n');
        }
        let path = self.path(file);
        write_atomic(&path, out.as_bytes()).map_err(|err| StoreError::io(path, err))
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let mut out = serde_json::to_string_pretty(value)?;
        out.push('\n');
        let path = self.path(file);
        write_atomic(&path, out.as_bytes()).map_err(|err| StoreError::io(path, err))
    }

    /// Reads rows back, skipping blank lines and rows that no longer decode.
    /// The header must match exactly.
    fn read_records<T: TsvRecord>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.path(file);
        let reader = File::open(&path)
            .map(BufReader::new)
            .map_err(|err| StoreError::io(&path, err))?;
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => line.map_err(|err| StoreError::io(&path, err))?,
            None => String::new(),
        };
        if header.trim_end_matches('\r') != T::HEADER {
            return Err(StoreError::SchemaMismatch {
                path,
                expected: T::HEADER,
                found: header,
            });
        }
        let mut records = Vec::new();
        for line in lines {
            let line = line.map_err(|err| StoreError::io(&path, err))?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(record) = T::decode(line) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
