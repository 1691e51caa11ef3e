use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration as StdDuration, Instant};

use chrono::{SecondsFormat, Utc};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use usage_core::{LiveEvent, ProjectEntry, UsageEvent, compare_chronological, is_row_safe};
use usage_store::{ReportStore, SyncStatus, TsvRecord};
use walkdir::WalkDir;

use crate::config::SyncConfig;
use crate::parser::{SessionEvents, extract_project_path, parse_session_file};
use crate::reports::{build_project_index, write_account_profile};
use crate::types::{IngestIssue, Result, SyncResult};

const SESSION_SUFFIX: &str = ".jsonl";

/// A transcript found under `<source_root>/<project_slug>/<session_id>.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFile {
    pub path: PathBuf,
    pub project_slug: String,
    pub session_id: String,
}

impl SessionFile {
    /// `None` when either name is not UTF-8 or would split a stored row.
    fn from_path(path: PathBuf) -> Option<Self> {
        let project_slug = path.parent()?.file_name()?.to_str()?.to_string();
        let file_name = path.file_name()?.to_str()?;
        let session_id = file_name
            .strip_suffix(SESSION_SUFFIX)
            .unwrap_or(file_name)
            .to_string();
        if !is_row_safe(&project_slug) || !is_row_safe(&session_id) {
            return None;
        }
        Some(Self {
            path,
            project_slug,
            session_id,
        })
    }
}

struct ParsedFile {
    file_path: String,
    project: ProjectEntry,
    events: Option<SessionEvents>,
    issue: Option<IngestIssue>,
    parse_duration: StdDuration,
}

impl ParsedFile {
    fn new(
        session: &SessionFile,
        project_path: &str,
        outcome: io::Result<SessionEvents>,
        parse_duration: StdDuration,
    ) -> Self {
        let file_path = session.path.to_string_lossy().to_string();
        let (events, issue) = match outcome {
            Ok(events) => (Some(events), None),
            Err(err) => (
                None,
                Some(IngestIssue {
                    file_path: file_path.clone(),
                    message: err.to_string(),
                }),
            ),
        };
        Self {
            file_path,
            project: ProjectEntry::discovered(&session.project_slug, project_path),
            events,
            issue,
            parse_duration,
        }
    }
}

#[derive(Default)]
struct MergedFiles {
    events: Vec<UsageEvent>,
    live_events: Vec<LiveEvent>,
    projects: Vec<ProjectEntry>,
    parse_total: StdDuration,
}

fn is_session_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(SESSION_SUFFIX))
}

/// Transcripts exactly one directory below `source_root`, sorted by path.
/// A missing root yields nothing.
pub fn discover_session_files(
    source_root: &Path,
    issues: &mut Vec<IngestIssue>,
) -> Vec<SessionFile> {
    if !source_root.is_dir() {
        return Vec::new();
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(source_root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let file_path = err
                    .path()
                    .map(|path| path.to_string_lossy().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                issues.push(IngestIssue {
                    file_path,
                    message: err.to_string(),
                });
                continue;
            }
        };
        if entry.file_type().is_file() && is_session_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort_by_cached_key(|path| path.to_string_lossy().to_string());

    let mut sessions = Vec::with_capacity(paths.len());
    for path in paths {
        let file_path = path.to_string_lossy().to_string();
        match SessionFile::from_path(path) {
            Some(session) => sessions.push(session),
            None => issues.push(IngestIssue {
                file_path,
                message: "unsupported characters in project or session name".to_string(),
            }),
        }
    }
    sessions
}

fn parse_file(session: &SessionFile) -> ParsedFile {
    let file_start = Instant::now();
    let project_path = extract_project_path(&session.path);
    let outcome = parse_session_file(&session.path, &session.project_slug, &session.session_id);
    ParsedFile::new(session, &project_path, outcome, file_start.elapsed())
}

/// Folds per-file results in discovery order. Failed files keep their
/// project entry but contribute no events.
fn merge_parsed(parsed_files: Vec<ParsedFile>, issues: &mut Vec<IngestIssue>) -> MergedFiles {
    let mut merged = MergedFiles {
        projects: Vec::with_capacity(parsed_files.len()),
        ..MergedFiles::default()
    };
    for parsed in parsed_files {
        merged.parse_total += parsed.parse_duration;
        merged.projects.push(parsed.project);
        if let Some(issue) = parsed.issue {
            tracing::warn!(
                file = %issue.file_path,
                error = %issue.message,
                "skipping session file"
            );
            issues.push(issue);
        }
        let Some(events) = parsed.events else {
            continue;
        };
        tracing::debug!(
            file = %parsed.file_path,
            events = events.usage.len(),
            bytes = events.bytes_read,
            read_ms = parsed.parse_duration.as_millis() as u64,
            "parsed session file"
        );
        merged.events.extend(events.usage);
        merged.live_events.extend(events.live);
    }
    merged
}

/// Stable chronological sort followed by removal of rows whose serialized
/// form has already been kept.
pub fn reconcile<T>(mut events: Vec<T>) -> Vec<T>
where
    T: TsvRecord + AsRef<UsageEvent>,
{
    events.sort_by(|a, b| compare_chronological(a.as_ref(), b.as_ref()));
    let mut seen = HashSet::with_capacity(events.len());
    events.retain(|event| seen.insert(Sha256::digest(event.encode().as_bytes())));
    events
}

/// Runs discovery, parsing, reconciliation and persistence in one pass.
pub fn sync(config: &SyncConfig) -> Result<SyncResult> {
    let sync_start = Instant::now();
    let store = ReportStore::open(&config.data_root)?;
    let mut result = SyncResult {
        source_root: config.source_root.to_string_lossy().to_string(),
        ..SyncResult::default()
    };

    let sessions = discover_session_files(&config.source_root, &mut result.issues);
    result.session_files = sessions.len();

    let parsed_files = sessions.par_iter().map(parse_file).collect::<Vec<_>>();
    let merged = merge_parsed(parsed_files, &mut result.issues);

    let all_events = reconcile(merged.events);
    let all_live_events = reconcile(merged.live_events);
    result.event_rows = all_events.len();
    result.live_event_rows = all_live_events.len();

    store.write_events(&all_events)?;
    store.write_live_events(&all_live_events)?;
    store.write_projects(&build_project_index(merged.projects))?;
    write_account_profile(&store, &config.account_file)?;

    let now = Utc::now();
    store.write_sync_status(&SyncStatus {
        last_sync_epoch: now.timestamp(),
        last_sync_iso: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        source_root: result.source_root.clone(),
        session_files: result.session_files,
        event_rows: result.event_rows,
        live_event_rows: result.live_event_rows,
    })?;

    tracing::info!(
        session_files = result.session_files,
        event_rows = result.event_rows,
        live_event_rows = result.live_event_rows,
        issues = result.issues.len(),
        read_ms = merged.parse_total.as_millis() as u64,
        total_ms = sync_start.elapsed().as_millis() as u64,
        "sync complete"
    );
    Ok(result)
}
