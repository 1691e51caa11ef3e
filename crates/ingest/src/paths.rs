use std::path::PathBuf;

pub const SOURCE_DIR_ENV: &str = "CLAUDE_USAGE_SOURCE_DIR";
pub const DATA_DIR_ENV: &str = "CLAUDE_USAGE_DATA_DIR";

pub(crate) fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn home_dir() -> PathBuf {
    env_path("HOME").unwrap_or_else(|| PathBuf::from("."))
}

/// Where the assistant keeps one directory of transcripts per project.
pub fn default_source_root() -> PathBuf {
    env_path(SOURCE_DIR_ENV).unwrap_or_else(|| home_dir().join(".claude").join("projects"))
}

pub fn default_data_root() -> PathBuf {
    env_path(DATA_DIR_ENV).unwrap_or_else(|| home_dir().join("dev").join(".claude-usage"))
}

pub fn default_account_file() -> PathBuf {
    home_dir().join(".claude.json")
}
