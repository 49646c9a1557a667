//! In-memory store, one JSON tree per root

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    AddressableStore, OpenMode, StoreError, StoreHandle, StoreResult, TreeHandle, TreeSink, tree,
};

/// Store whose roots live in a shared map. Clones share the same roots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    roots: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method seeding a root with a tree
    pub fn with_root(self, root: impl Into<String>, tree: Value) -> Self {
        if let Ok(mut roots) = self.roots.lock() {
            roots.insert(root.into(), tree);
        }
        self
    }

    /// Current content of one dataset
    pub fn dataset(&self, root: &str, subpath: &str) -> Option<Value> {
        let roots = self.roots.lock().ok()?;
        roots.get(root).and_then(|t| tree::lookup(t, subpath)).cloned()
    }

    /// Snapshot of a whole root
    pub fn snapshot(&self, root: &str) -> Option<Value> {
        self.roots.lock().ok()?.get(root).cloned()
    }
}

struct MemorySink {
    roots: Arc<Mutex<HashMap<String, Value>>>,
    staged: Option<Value>,
}

impl TreeSink for MemorySink {
    fn stage(&mut self, _root: &str, tree: Value) -> StoreResult<()> {
        self.staged = Some(tree);
        Ok(())
    }

    fn publish(&mut self, root: &str) -> StoreResult<()> {
        let Some(tree) = self.staged.take() else {
            return Ok(());
        };
        let mut roots = self.roots.lock().map_err(|_| StoreError::Poisoned)?;
        roots.insert(root.to_string(), tree);
        Ok(())
    }
}

impl AddressableStore for MemoryStore {
    fn open(&self, root: &str, mode: OpenMode) -> StoreResult<Box<dyn StoreHandle>> {
        let existing = {
            let roots = self.roots.lock().map_err(|_| StoreError::Poisoned)?;
            roots.get(root).cloned()
        };
        let tree = match (existing, mode) {
            (Some(tree), _) => tree,
            (None, OpenMode::ReadWrite) => Value::Object(Default::default()),
            (None, OpenMode::Read) => {
                return Err(StoreError::Open {
                    root: root.to_string(),
                    reason: "no such root".to_string(),
                });
            }
        };
        let sink = MemorySink {
            roots: Arc::clone(&self.roots),
            staged: None,
        };
        Ok(Box::new(TreeHandle::new(root, tree, mode, sink)))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_writes_are_invisible_until_close() {
        let store = MemoryStore::new().with_root("a", json!({"raw": 1}));
        let mut handle = store.open("a", OpenMode::ReadWrite).unwrap();
        handle.write("out", json!(2)).unwrap();
        assert!(handle.exists("out").unwrap());
        assert_eq!(store.dataset("a", "out"), None);

        handle.close().unwrap();
        assert_eq!(store.dataset("a", "out"), Some(json!(2)));
    }

    #[test]
    fn test_dropped_handle_discards_writes() {
        let store = MemoryStore::new().with_root("a", json!({}));
        {
            let mut handle = store.open("a", OpenMode::ReadWrite).unwrap();
            handle.write("out", json!(2)).unwrap();
        }
        assert_eq!(store.snapshot("a"), Some(json!({})));
    }

    #[test]
    fn test_open_modes() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.open("missing", OpenMode::Read),
            Err(StoreError::Open { .. })
        ));

        let mut handle = store.open("new", OpenMode::ReadWrite).unwrap();
        handle.write("x/y", json!(true)).unwrap();
        handle.close().unwrap();
        assert_eq!(store.dataset("new", "x/y"), Some(json!(true)));

        let mut handle = store.open("new", OpenMode::Read).unwrap();
        assert_eq!(handle.read("x/y").unwrap(), Some(json!(true)));
        assert!(matches!(
            handle.write("x/z", json!(1)),
            Err(StoreError::ReadOnly { .. })
        ));
    }
}
