//! File-backed store: every root is a JSON document
//!
//! Nested objects are groups and all other values are datasets, so
//! `results.json/fit/slope` addresses `{"fit": {"slope": ...}}` inside
//! `results.json`.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::{AddressableStore, OpenMode, StoreError, StoreHandle, StoreResult, TreeHandle, TreeSink};

/// Store that reads and rewrites JSON files
#[derive(Debug, Clone, Default)]
pub struct JsonFileStore {
    base_dir: Option<PathBuf>,
}

impl JsonFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative roots against `base_dir` instead of the working
    /// directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, root: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(root),
            None => PathBuf::from(root),
        }
    }
}

struct FileSink {
    path: PathBuf,
    staged: Option<PathBuf>,
}

impl FileSink {
    fn new(path: PathBuf) -> Self {
        Self { path, staged: None }
    }
}

impl TreeSink for FileSink {
    fn stage(&mut self, _root: &str, tree: Value) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(&tree)?;
        let tmp = temp_path(&self.path);
        if let Err(e) = fs::write(&tmp, content + "\n") {
            // a partial temp file may have been left behind
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        self.staged = Some(tmp);
        Ok(())
    }

    fn publish(&mut self, _root: &str) -> StoreResult<()> {
        if let Some(tmp) = self.staged.take() {
            if let Err(e) = fs::rename(&tmp, &self.path) {
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(tmp) = self.staged.take() {
            tracing::debug!("Discarding staged {}", tmp.display());
            let _ = fs::remove_file(tmp);
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl AddressableStore for JsonFileStore {
    fn open(&self, root: &str, mode: OpenMode) -> StoreResult<Box<dyn StoreHandle>> {
        let path = self.path_for(root);
        let tree = if path.is_file() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&content).map_err(|e| StoreError::Open {
                    root: root.to_string(),
                    reason: format!("not a JSON document ({})", e),
                })?
            }
        } else if mode == OpenMode::ReadWrite && !path.exists() {
            Value::Object(Default::default())
        } else {
            return Err(StoreError::Open {
                root: root.to_string(),
                reason: "no such file".to_string(),
            });
        };

        tracing::debug!("Opened {} ({:?})", path.display(), mode);
        Ok(Box::new(TreeHandle::new(root, tree, mode, FileSink::new(path))))
    }

    fn name(&self) -> &'static str {
        "json-file"
    }
}
