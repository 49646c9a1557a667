//! The addressable store interface
//!
//! A store maps a root (usually a file path given on the command line) to a
//! hierarchical tree of datasets addressed by slash-separated paths. The
//! engine consumes stores only through [`AddressableStore`] and
//! [`StoreHandle`].
//!
//! Handles buffer their writes; nothing reaches the underlying store until
//! [`StoreHandle::close`] commits. Commits happen in two phases: every
//! handle of an iteration is prepared (staged) before any is published, so
//! a root that cannot be staged leaves the others untouched. Dropping a
//! handle discards its writes, staged or not.

pub mod handles;
pub mod json_file;
pub mod memory;
pub mod tree;

use serde_json::Value;
use std::io;
use std::path::{Component, Path, PathBuf};

pub use handles::HandleSet;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Errors raised by store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cannot open \"{root}\": {reason}")]
    Open { root: String, reason: String },

    #[error("\"{root}\" was opened read-only")]
    ReadOnly { root: String },

    #[error("\"{path}\" is not a group")]
    NotAGroup { path: String },

    #[error("invalid dataset path \"{0}\"")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// How a root is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpenMode {
    /// The root must already exist; writes are rejected
    Read,
    /// A missing root is created on commit
    ReadWrite,
}

/// An open root
pub trait StoreHandle: Send {
    fn root(&self) -> &str;

    fn exists(&self, subpath: &str) -> StoreResult<bool>;

    /// Read a dataset; `None` when nothing exists at `subpath`
    fn read(&self, subpath: &str) -> StoreResult<Option<Value>>;

    fn write(&mut self, subpath: &str, value: Value) -> StoreResult<()>;

    /// Stage buffered writes without making them visible
    fn prepare(&mut self) -> StoreResult<()>;

    /// Publish staged writes and release the handle
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Prepare and commit in one step
    fn close(mut self: Box<Self>) -> StoreResult<()> {
        self.prepare()?;
        self.commit()
    }
}

/// Opens roots into handles
pub trait AddressableStore: Send + Sync {
    fn open(&self, root: &str, mode: OpenMode) -> StoreResult<Box<dyn StoreHandle>>;

    /// Short name used in log output
    fn name(&self) -> &'static str;
}

/// Destination of buffered writes, implemented by each concrete store.
/// A sink dropped between `stage` and `publish` discards the staged tree.
pub(crate) trait TreeSink: Send {
    fn stage(&mut self, root: &str, tree: Value) -> StoreResult<()>;

    fn publish(&mut self, root: &str) -> StoreResult<()>;
}

/// A handle over an in-memory copy of one root's tree
pub(crate) struct TreeHandle<S: TreeSink> {
    root: String,
    tree: Value,
    mode: OpenMode,
    dirty: bool,
    staged: bool,
    sink: S,
}

impl<S: TreeSink> TreeHandle<S> {
    pub(crate) fn new(root: &str, tree: Value, mode: OpenMode, sink: S) -> Self {
        Self {
            root: root.to_string(),
            tree,
            mode,
            dirty: false,
            staged: false,
            sink,
        }
    }
}

impl<S: TreeSink> StoreHandle for TreeHandle<S> {
    fn root(&self) -> &str {
        &self.root
    }

    fn exists(&self, subpath: &str) -> StoreResult<bool> {
        Ok(tree::lookup(&self.tree, subpath).is_some())
    }

    fn read(&self, subpath: &str) -> StoreResult<Option<Value>> {
        Ok(tree::lookup(&self.tree, subpath).cloned())
    }

    fn write(&mut self, subpath: &str, value: Value) -> StoreResult<()> {
        if self.mode == OpenMode::Read {
            return Err(StoreError::ReadOnly {
                root: self.root.clone(),
            });
        }
        tree::insert(&mut self.tree, subpath, value)?;
        self.dirty = true;
        Ok(())
    }

    fn prepare(&mut self) -> StoreResult<()> {
        if !self.dirty || self.staged {
            return Ok(());
        }
        tracing::debug!("Staging writes to {}", self.root);
        self.sink.stage(&self.root, self.tree.clone())?;
        self.staged = true;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        if !self.staged {
            return Ok(());
        }
        tracing::debug!("Committing writes to {}", self.root);
        self.sink.publish(&self.root)
    }
}

/// Canonical key of a root: `./a.json`, `a.json` and `b/../a.json` name the
/// same root. Purely lexical; symlinks are not followed.
pub fn root_key(root: &str) -> String {
    let mut key = PathBuf::new();
    for component in Path::new(root).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(key.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    key.pop();
                } else if !key.has_root() {
                    key.push("..");
                }
            }
            other => key.push(other.as_os_str()),
        }
    }
    if key.as_os_str().is_empty() {
        return root.to_string();
    }
    key.to_string_lossy().into_owned()
}
