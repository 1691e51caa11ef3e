use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths::{
    DATA_DIR_ENV, SOURCE_DIR_ENV, default_account_file, default_data_root, default_source_root,
    env_path,
};
use crate::types::{IngestError, Result};

/// Inputs and output location for a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub source_root: PathBuf,
    pub data_root: PathBuf,
    pub account_file: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            data_root: default_data_root(),
            account_file: default_account_file(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    source_root: Option<PathBuf>,
    data_root: Option<PathBuf>,
    account_file: Option<PathBuf>,
}

impl SyncConfig {
    pub fn new(
        source_root: impl Into<PathBuf>,
        data_root: impl Into<PathBuf>,
        account_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            data_root: data_root.into(),
            account_file: account_file.into(),
        }
    }

    /// Reads a TOML config file. Keys it sets replace the built-in defaults;
    /// the environment variables still take precedence. A missing file is
    /// the same as an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(IngestError::Config(format!(
                    "read config {}: {}",
                    path.display(),
                    err
                )));
            }
        };
        Self::from_toml(&contents)
            .map_err(|err| IngestError::Config(format!("parse config {}: {}", path.display(), err)))
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(contents)?;
        let defaults = Self::default();
        Ok(Self {
            source_root: env_path(SOURCE_DIR_ENV)
                .or(file.source_root)
                .unwrap_or(defaults.source_root),
            data_root: env_path(DATA_DIR_ENV)
                .or(file.data_root)
                .unwrap_or(defaults.data_root),
            account_file: file.account_file.unwrap_or(defaults.account_file),
        })
    }
}
