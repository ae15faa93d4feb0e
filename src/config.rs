//! Configuration. Two sources:
//!
//! - Account and course records, JSON files in the config directory (`user.json`, `classes.json`).
//! - Optional tool settings. Search order: ./clipfetch.toml, then
//!   $XDG_CONFIG_HOME/clipfetch/config.toml (or ~/.config/clipfetch/config.toml).

use crate::model::Credentials;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const USER_FILE: &str = "user.json";
pub const CLASSES_FILE: &str = "classes.json";
/// `number` value meaning "not known yet; look it up after login".
pub const UNKNOWN_NUMBER: i64 = -1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Cannot write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Course '{name}' is not present in classes.json.")]
    UnknownCourse { name: String },

    #[error("Cannot determine current directory: {0}")]
    CurrentDir(std::io::Error),
}

/// Contents of `user.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Student number used in listing URLs, or [`UNKNOWN_NUMBER`].
    pub number: i64,
    pub name: String,
    pub password: String,
}

impl UserRecord {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            identifier: self.name.clone(),
            secret: self.password.clone(),
        }
    }

    /// The student number, if it has been filled in.
    pub fn known_number(&self) -> Option<u64> {
        u64::try_from(self.number).ok()
    }
}

/// One entry of `classes.json`, keyed by the course identifier given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClassRecord {
    pub semester: u32,
    pub code: u64,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&s).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_user(config_dir: &Path) -> Result<UserRecord, ConfigError> {
    read_json(&config_dir.join(USER_FILE))
}

pub fn load_classes(config_dir: &Path) -> Result<HashMap<String, ClassRecord>, ConfigError> {
    read_json(&config_dir.join(CLASSES_FILE))
}

/// Find a course by identifier.
pub fn find_class(
    classes: &HashMap<String, ClassRecord>,
    name: &str,
) -> Result<ClassRecord, ConfigError> {
    classes
        .get(name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownCourse {
            name: name.to_string(),
        })
}

/// Overwrite `user.json` (used after the student number is discovered).
pub fn save_user(config_dir: &Path, user: &UserRecord) -> Result<(), ConfigError> {
    let path = config_dir.join(USER_FILE);
    let write_err = |source| ConfigError::Write {
        path: path.clone(),
        source,
    };
    let data = serde_json::to_vec_pretty(user)
        .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    std::fs::write(&path, data).map_err(write_err)
}

/// Tool settings file contents. All fields optional; only present keys override defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Settings {
    /// Portal root URL. Defaults to the production portal.
    pub portal_url: Option<String>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Timeout in seconds for login and listing requests.
    pub timeout_secs: Option<u64>,
    /// Extra attempts after a timed-out request.
    pub timeout_retries: Option<u32>,
    /// Default directory for `user.json` and `classes.json` when --config is not set.
    pub config_dir: Option<PathBuf>,
    /// Default output root when --files is not set.
    pub files_dir: Option<PathBuf>,
}

/// Search order: (1) ./clipfetch.toml, (2) $XDG_CONFIG_HOME/clipfetch/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_settings() -> Result<Option<Settings>, ConfigError> {
    let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
    let mut paths = vec![cwd.join("clipfetch.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("clipfetch").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            return parse_settings_file(path).map(Some);
        }
    }
    Ok(None)
}

fn parse_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&s).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}
