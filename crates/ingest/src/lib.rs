mod config;
mod parser;
mod paths;
mod pipeline;
mod reports;
mod totals;
mod types;

pub use config::SyncConfig;
pub use parser::{
    SessionEvents, clean_text, extract_project_path, parse_epoch, parse_session_file,
    project_path_from_reader, prompt_preview, session_events_from_reader,
};
pub use paths::{
    DATA_DIR_ENV, SOURCE_DIR_ENV, default_account_file, default_data_root, default_source_root,
};
pub use pipeline::{SessionFile, discover_session_files, reconcile, sync};
pub use reports::{build_project_index, extract_account_profile, write_account_profile};
pub use totals::{TimeWindow, summarize};
pub use types::{IngestError, IngestIssue, Result, SyncResult};
