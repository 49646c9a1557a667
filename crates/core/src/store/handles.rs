//! The handles one iteration holds open

use serde_json::Value;
use std::collections::BTreeMap;

use super::{AddressableStore, OpenMode, StoreError, StoreHandle, StoreResult, root_key};

/// Open handles keyed by [`root_key`]. Each root is opened at most once per
/// iteration and shared by every mapping that names it, however it is
/// spelled.
#[derive(Default)]
pub struct HandleSet {
    handles: BTreeMap<String, Box<dyn StoreHandle>>,
}

impl HandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `root` unless it is already open
    pub fn open(&mut self, store: &dyn AddressableStore, root: &str, mode: OpenMode) -> StoreResult<()> {
        let key = root_key(root);
        if !self.handles.contains_key(&key) {
            let handle = store.open(&key, mode)?;
            self.handles.insert(key, handle);
        }
        Ok(())
    }

    fn get(&self, root: &str) -> StoreResult<&dyn StoreHandle> {
        self.handles
            .get(&root_key(root))
            .map(|h| h.as_ref())
            .ok_or_else(|| not_open(root))
    }

    pub fn exists(&self, root: &str, subpath: &str) -> StoreResult<bool> {
        self.get(root)?.exists(subpath)
    }

    pub fn read(&self, root: &str, subpath: &str) -> StoreResult<Option<Value>> {
        self.get(root)?.read(subpath)
    }

    pub fn write(&mut self, root: &str, subpath: &str, value: Value) -> StoreResult<()> {
        self.handles
            .get_mut(&root_key(root))
            .ok_or_else(|| not_open(root))?
            .write(subpath, value)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Commit buffered writes of every handle. All roots are staged first;
    /// if any cannot be staged, nothing is published and every staged root
    /// is discarded.
    pub fn commit(mut self) -> StoreResult<()> {
        for (root, handle) in self.handles.iter_mut() {
            if let Err(e) = handle.prepare() {
                tracing::warn!("Failed to stage writes to {}: {}", root, e);
                return Err(e);
            }
        }

        let mut first_error = None;
        for (root, handle) in self.handles {
            if let Err(e) = handle.commit() {
                tracing::warn!("Failed to commit {}: {}", root, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn not_open(root: &str) -> StoreError {
    StoreError::Open {
        root: root.to_string(),
        reason: "root was not opened for this iteration".to_string(),
    }
}
