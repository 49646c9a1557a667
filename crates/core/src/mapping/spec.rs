//! The mapping-string micro-grammar
//!
//! A mapping string binds one function parameter or output slot to a value
//! source. Strings starting with `$`, `%` or `#` are references; everything
//! else is a literal.
//!
//! | syntax            | meaning                                         |
//! |-------------------|-------------------------------------------------|
//! | `$N`              | positional argument `N`                          |
//! | `$N/sub/path`     | dataset `sub/path` inside the root named by `$N` |
//! | `$@`, `$a:b`      | a slice of positional arguments (all-at-once)    |
//! | `%name`           | the value of option `name`                       |
//! | `#`               | standard output (output mappings only)           |
//! | `#/sub/path`      | dataset inside the current source's root         |

use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};

/// Prefixes reserved for references. A literal may not start with one.
pub const RESERVED_PREFIXES: [char; 3] = ['$', '%', '#'];

/// A parsed mapping string
#[derive(Debug, Clone, PartialEq)]
pub enum MappingSpec {
    /// A fixed value
    Literal(Value),
    /// The positional argument itself (`$N`)
    PositionalRef(usize),
    /// A dataset inside the store rooted at a positional argument (`$N/subpath`)
    PositionalSubpathRef { index: usize, subpath: String },
    /// A range of positional arguments (`$@`, `$:`, `$a:`, `$:b`, `$a:b`),
    /// optionally addressing the same dataset in each of them
    PositionalSlice {
        start: Option<usize>,
        end: Option<usize>,
        subpath: Option<String>,
    },
    /// An option value (`%name`)
    OptionRef(String),
    /// The current source's own root (`#/subpath`), or standard output when
    /// the subpath is empty (`#`). Only valid in output mappings.
    SelfOutputRef { subpath: String },
}

impl MappingSpec {
    /// Parse a raw mapping string.
    ///
    /// Strings beginning with a reserved prefix must match one of the
    /// reference shapes exactly; anything else fails with `MalformedMapping`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.chars().next() {
            Some('$') => parse_positional(raw, &raw[1..]),
            Some('%') => parse_option(raw, &raw[1..]),
            Some('#') => parse_self(raw, &raw[1..]),
            _ => Ok(MappingSpec::Literal(Value::String(raw.to_string()))),
        }
    }

    /// Build a spec from a configuration value. Only strings are parsed;
    /// any other JSON value is taken as a literal.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(raw) => Self::parse(raw),
            other => Ok(MappingSpec::Literal(other.clone())),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, MappingSpec::Literal(_))
    }

    /// The highest positional index this spec refers to, if any
    pub fn max_positional_index(&self) -> Option<usize> {
        match self {
            MappingSpec::PositionalRef(index) => Some(*index),
            MappingSpec::PositionalSubpathRef { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_slice(&self) -> bool {
        matches!(self, MappingSpec::PositionalSlice { .. })
    }

    /// Whether this spec addresses a dataset inside a store
    pub fn has_subpath(&self) -> bool {
        match self {
            MappingSpec::PositionalSubpathRef { .. } => true,
            MappingSpec::PositionalSlice { subpath, .. } => subpath.is_some(),
            MappingSpec::SelfOutputRef { subpath } => !subpath.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for MappingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingSpec::Literal(Value::String(s)) => write!(f, "{}", s),
            MappingSpec::Literal(value) => write!(f, "{}", value),
            MappingSpec::PositionalRef(index) => write!(f, "${}", index),
            MappingSpec::PositionalSubpathRef { index, subpath } => {
                write!(f, "${}/{}", index, subpath)
            }
            MappingSpec::PositionalSlice {
                start,
                end,
                subpath,
            } => {
                match (start, end) {
                    (None, None) => write!(f, "$@")?,
                    (start, end) => {
                        write!(f, "$")?;
                        if let Some(start) = start {
                            write!(f, "{}", start)?;
                        }
                        write!(f, ":")?;
                        if let Some(end) = end {
                            write!(f, "{}", end)?;
                        }
                    }
                }
                if let Some(subpath) = subpath {
                    write!(f, "/{}", subpath)?;
                }
                Ok(())
            }
            MappingSpec::OptionRef(name) => write!(f, "%{}", name),
            MappingSpec::SelfOutputRef { subpath } if subpath.is_empty() => write!(f, "#"),
            MappingSpec::SelfOutputRef { subpath } => write!(f, "#/{}", subpath),
        }
    }
}

fn split_subpath<'a>(raw: &str, rest: &'a str) -> Result<(&'a str, Option<&'a str>)> {
    match rest.split_once('/') {
        Some((_, "")) => Err(Error::malformed(raw, "empty dataset path after '/'")),
        Some((head, subpath)) => Ok((head, Some(subpath))),
        None => Ok((rest, None)),
    }
}

fn parse_index(raw: &str, digits: &str) -> Result<usize> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::malformed(
            raw,
            format!("expected an argument index, found '{}'", digits),
        ));
    }
    digits
        .parse::<usize>()
        .map_err(|_| Error::malformed(raw, "argument index too large"))
}

fn parse_bound(raw: &str, digits: &str) -> Result<Option<usize>> {
    if digits.is_empty() {
        Ok(None)
    } else {
        parse_index(raw, digits).map(Some)
    }
}

fn parse_positional(raw: &str, rest: &str) -> Result<MappingSpec> {
    let (head, subpath) = split_subpath(raw, rest)?;
    let subpath = subpath.map(str::to_string);

    if head == "@" {
        return Ok(MappingSpec::PositionalSlice {
            start: None,
            end: None,
            subpath,
        });
    }

    if let Some((start, end)) = head.split_once(':') {
        let start = parse_bound(raw, start)?;
        let end = parse_bound(raw, end)?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(Error::malformed(
                    raw,
                    format!("slice start {} is past its end {}", s, e),
                ));
            }
        }
        return Ok(MappingSpec::PositionalSlice {
            start,
            end,
            subpath,
        });
    }

    let index = parse_index(raw, head)?;
    Ok(match subpath {
        Some(subpath) => MappingSpec::PositionalSubpathRef { index, subpath },
        None => MappingSpec::PositionalRef(index),
    })
}

fn parse_option(raw: &str, name: &str) -> Result<MappingSpec> {
    if name.is_empty() {
        return Err(Error::malformed(raw, "missing option name after '%'"));
    }
    if name.contains('/') {
        return Err(Error::malformed(raw, "option references take no dataset path"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(Error::malformed(
            raw,
            format!("invalid character '{}' in option name", bad),
        ));
    }
    Ok(MappingSpec::OptionRef(name.to_string()))
}

fn parse_self(raw: &str, rest: &str) -> Result<MappingSpec> {
    match rest {
        "" => Ok(MappingSpec::SelfOutputRef {
            subpath: String::new(),
        }),
        "/" => Err(Error::malformed(raw, "empty dataset path after '/'")),
        _ => match rest.strip_prefix('/') {
            Some(subpath) => Ok(MappingSpec::SelfOutputRef {
                subpath: subpath.to_string(),
            }),
            None => Err(Error::malformed(
                raw,
                "self references are '#' or '#/<dataset path>'",
            )),
        },
    }
}
