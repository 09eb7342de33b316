use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::metadata::TVMAZE_API_BASE;

/// Runtime settings, read from `config.toml` and then overridden by the
/// `TVR_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store_path: PathBuf,
    /// Glob selecting the index files.
    pub binaries_pattern: String,
    pub covers_dir: PathBuf,
    pub metadata_url: String,
    pub fetch_timeout_secs: u64,
    pub fetch_workers: usize,
    /// Minimum gap between two provider requests.
    pub fetch_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let dir = get_config_dir_path();
        Self {
            store_path: dir.join("shows.json"),
            binaries_pattern: dir.join("binaries").join("*.txt").to_string_lossy().into_owned(),
            covers_dir: dir.join("covers"),
            metadata_url: TVMAZE_API_BASE.to_string(),
            fetch_timeout_secs: 10,
            fetch_workers: 4,
            fetch_interval_ms: 500,
        }
    }
}

impl Config {
    /// Loads `explicit`, else `$TVR_CONFIG`, else the default location. Only
    /// an explicitly named file has to exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match (explicit, env::var_os("TVR_CONFIG")) {
            (Some(path), _) => (path.to_path_buf(), true),
            (None, Some(path)) => (PathBuf::from(path), true),
            (None, None) => (get_config_path(), false),
        };

        let config: Config = if path.exists() || required {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            Config::default()
        };
        tracing::debug!(path = %path.display(), "loaded config");

        Ok(config.apply_env(|key| env::var(key).ok()))
    }

    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("TVR_STORE_PATH") {
            self.store_path = PathBuf::from(path);
        }
        if let Some(pattern) = lookup("TVR_BINARIES_PATTERN") {
            self.binaries_pattern = pattern;
        }
        if let Some(dir) = lookup("TVR_COVERS_DIR") {
            self.covers_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("TVR_METADATA_URL") {
            self.metadata_url = url;
        }
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}

fn get_config_dir_path() -> PathBuf {
    xdir::config()
        .map(|path| path.join("tvr"))
        // If the standard path could not be found (e.g.`$HOME` is not set),
        // default to the current directory.
        .unwrap_or_default()
}

fn get_config_path() -> PathBuf {
    get_config_dir_path().join("config.toml")
}
