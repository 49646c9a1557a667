//! Binding resolution
//!
//! Turns a [`MappingSpec`] into a concrete value for one iteration. The
//! resolver reads through handles the driver has already opened and never
//! writes, so resolving the same spec against the same context always gives
//! the same answer.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::mapping::MappingSpec;
use crate::report::SkipReason;
use crate::store::HandleSet;

/// Option values supplied on the command line, keyed by name
pub type Options = BTreeMap<String, Value>;

/// What to do when a referenced input dataset does not exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OmissionPolicy {
    /// Fail the iteration with `MissingDataset`
    #[default]
    Fail,
    /// Drop the argument and fall back to the option or function default
    OmitArgument,
    /// Skip the current source
    SkipSource,
    /// Skip the current source and every later source sharing its root
    SkipFile,
}

crate::impl_case_insensitive_deserialize!(
    OmissionPolicy,
    Fail => ["fail"],
    OmitArgument => ["omit-argument", "omit_argument", "omit"],
    SkipSource => ["skip-source", "skip_source", "skip"],
    SkipFile => ["skip-file", "skip_file", "skip-whole-file"],
);

impl std::str::FromStr for OmissionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|e| Error::ConfigError(format!("invalid omission policy: {}", e)))
    }
}

/// Per-iteration data: the source's positional arguments, the option values
/// and the handles opened for this source
pub struct ExecutionContext<'a> {
    pub source_index: usize,
    pub args: Vec<String>,
    pub opts: &'a Options,
    pub handles: HandleSet,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(source_index: usize, args: Vec<String>, opts: &'a Options) -> Self {
        Self {
            source_index,
            args,
            opts,
            handles: HandleSet::new(),
        }
    }

    /// The positional argument at `index`
    pub fn arg(&self, index: usize) -> Result<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .ok_or(Error::IndexOutOfRange {
                index,
                available: self.args.len(),
            })
    }

    /// The root every `#` reference of this source points at
    pub fn primary_root(&self) -> Result<&str> {
        self.arg(0)
    }

    /// The arguments selected by a slice, clamped to what is available
    pub fn slice(&self, start: Option<usize>, end: Option<usize>) -> &[String] {
        let len = self.args.len();
        let end = end.unwrap_or(len).min(len);
        let start = start.unwrap_or(0).min(end);
        &self.args[start..end]
    }
}

/// Outcome of resolving one mapping
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Value(Value),
    /// The dataset was missing and the policy omits the argument
    Omitted { root: String, subpath: String },
    /// The dataset was missing and the policy skips the source
    Skip(SkipReason),
}

/// Resolve `spec` against `ctx`.
///
/// `default` is the declared default of the parameter the spec is bound
/// to; an option reference falls back to it when the option is absent.
pub fn resolve(
    spec: &MappingSpec,
    ctx: &ExecutionContext<'_>,
    policy: OmissionPolicy,
    default: Option<&Value>,
) -> Result<Resolved> {
    match spec {
        MappingSpec::Literal(value) => Ok(Resolved::Value(value.clone())),
        MappingSpec::PositionalRef(index) => {
            Ok(Resolved::Value(Value::String(ctx.arg(*index)?.to_string())))
        }
        MappingSpec::PositionalSubpathRef { index, subpath } => {
            let root = ctx.arg(*index)?;
            read_dataset(ctx, root, subpath, policy)
        }
        MappingSpec::PositionalSlice {
            start,
            end,
            subpath,
        } => {
            let selected = ctx.slice(*start, *end);
            let Some(subpath) = subpath else {
                return Ok(Resolved::Value(Value::Array(
                    selected.iter().cloned().map(Value::String).collect(),
                )));
            };
            let mut values = Vec::with_capacity(selected.len());
            for root in selected {
                match read_dataset(ctx, root, subpath, policy)? {
                    Resolved::Value(value) => values.push(value),
                    // a missing member is dropped from the list
                    Resolved::Omitted { .. } => {}
                    skip @ Resolved::Skip(_) => return Ok(skip),
                }
            }
            Ok(Resolved::Value(Value::Array(values)))
        }
        MappingSpec::OptionRef(name) => match ctx.opts.get(name).or(default) {
            Some(value) => Ok(Resolved::Value(value.clone())),
            None => Err(Error::UnknownOption(name.clone())),
        },
        MappingSpec::SelfOutputRef { .. } => Err(Error::malformed(
            spec.to_string(),
            "self references are only valid in output mappings",
        )),
    }
}

fn read_dataset(
    ctx: &ExecutionContext<'_>,
    root: &str,
    subpath: &str,
    policy: OmissionPolicy,
) -> Result<Resolved> {
    if let Some(value) = ctx.handles.read(root, subpath)? {
        return Ok(Resolved::Value(value));
    }

    tracing::debug!("Dataset {}/{} not found, policy {:?}", root, subpath, policy);
    let root = root.to_string();
    let subpath = subpath.to_string();
    match policy {
        OmissionPolicy::Fail => Err(Error::MissingDataset { root, subpath }),
        OmissionPolicy::OmitArgument => Ok(Resolved::Omitted { root, subpath }),
        OmissionPolicy::SkipSource | OmissionPolicy::SkipFile => {
            Ok(Resolved::Skip(SkipReason::MissingDataset { root, subpath }))
        }
    }
}
