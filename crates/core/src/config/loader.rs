//! Configuration file discovery

use std::path::{Path, PathBuf};

use super::ConfigFile;
use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = ".comliner.json";

/// Finds and merges `.comliner.json` files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current directory
    pub fn load() -> Result<ConfigFile> {
        let cwd = std::env::current_dir()?;
        Self::load_from_path(&cwd)
    }

    /// Walk up from `path` to `$HOME` (or the filesystem root), merging
    /// every config file found. Nearer files override farther ones.
    pub fn load_from_path(path: &Path) -> Result<ConfigFile> {
        let home = std::env::var("HOME").ok().map(PathBuf::from);
        Self::load_between(path, home.as_deref())
    }

    /// Like [`ConfigLoader::load_from_path`] with an explicit stop directory
    pub fn load_between(path: &Path, stop: Option<&Path>) -> Result<ConfigFile> {
        let files = Self::discover(path, stop);
        if files.is_empty() {
            tracing::debug!("No {} found above {:?}", CONFIG_FILE_NAME, path);
            return Ok(ConfigFile::default());
        }

        let mut merged = ConfigFile::default();
        // farthest first
        for file in files.iter().rev() {
            merged.merge(Self::load_file(file)?);
        }
        tracing::debug!("Merged {} config file(s)", files.len());
        Ok(merged)
    }

    /// Load exactly one file
    pub fn load_file(path: &Path) -> Result<ConfigFile> {
        tracing::debug!("Loading config from {:?}", path);
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        ConfigFile::from_json(&contents).map_err(|e| {
            tracing::error!("Failed to parse config {:?}: {}", path, e);
            Error::ConfigError(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Config files from `path` upwards, nearest first
    pub fn discover(path: &Path, stop: Option<&Path>) -> Vec<PathBuf> {
        let mut check_path = if path.is_file() {
            path.parent().unwrap_or(path)
        } else {
            path
        };

        let mut found = Vec::new();
        loop {
            let candidate = check_path.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                found.push(candidate);
            }
            if stop == Some(check_path) {
                break;
            }
            match check_path.parent() {
                Some(parent) => check_path = parent,
                None => break,
            }
        }
        found
    }

    /// Path a new config file for `dir` is written to
    pub fn path_for(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE_NAME)
    }
}
