//! Value conversions applied around an invocation
//!
//! A preprocessor turns a bound argument into the shape the function
//! expects; a postprocessor reshapes one output slot before it is routed.
//! Conversions are written in configuration as short expressions:
//!
//! | expression              | effect                                          |
//! |-------------------------|-------------------------------------------------|
//! | `float`, `int`, `str`, `bool` | convert a scalar                          |
//! | `list_of(T)`            | convert every item of a list                    |
//! | `tuple_of(T)`           | same as `list_of(T)`                            |
//! | `items_of(key)`         | pick `key` from every item of a list            |
//! | `items_of(key, value)`  | as above, `value` (JSON) when `key` is absent   |
//! | `sentence`              | join the items of a list with spaces            |
//! | `a \| b`                | apply `a`, then `b`                             |

use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::signature::InvocationError;

/// Scalar target types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Float,
    Int,
    Str,
    Bool,
}

impl ValueType {
    pub fn convert(self, value: Value) -> std::result::Result<Value, InvocationError> {
        let converted = match (self, &value) {
            (ValueType::Float, Value::Number(n)) => n.as_f64().and_then(Number::from_f64),
            (ValueType::Float, Value::String(s)) => {
                s.trim().parse::<f64>().ok().and_then(Number::from_f64)
            }
            (ValueType::Float, Value::Bool(b)) => Number::from_f64(if *b { 1.0 } else { 0.0 }),
            (ValueType::Int, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(Number::from),
            (ValueType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Number::from),
            (ValueType::Int, Value::Bool(b)) => Some(Number::from(i64::from(*b))),
            (ValueType::Str, Value::String(_)) => return Ok(value),
            (ValueType::Str, other) => return Ok(Value::String(other.to_string())),
            (ValueType::Bool, Value::Bool(_)) => return Ok(value),
            (ValueType::Bool, Value::Number(n)) => {
                return Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)));
            }
            (ValueType::Bool, Value::String(s)) => {
                return match s.trim().to_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                    "false" | "no" | "off" | "0" | "" => Ok(Value::Bool(false)),
                    _ => Err(cannot_convert(&value, self)),
                };
            }
            _ => None,
        };
        converted
            .map(Value::Number)
            .ok_or_else(|| cannot_convert(&value, self))
    }
}

fn cannot_convert(value: &Value, target: ValueType) -> InvocationError {
    InvocationError::new(format!("cannot convert {} to {}", value, target))
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::Str => "str",
            ValueType::Bool => "bool",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "float" | "f64" | "number" => Ok(ValueType::Float),
            "int" | "i64" | "integer" => Ok(ValueType::Int),
            "str" | "string" => Ok(ValueType::Str),
            "bool" | "boolean" => Ok(ValueType::Bool),
            other => Err(Error::ConfigError(format!("unknown type '{}'", other))),
        }
    }
}

type ConvertFn = dyn Fn(Value) -> std::result::Result<Value, InvocationError> + Send + Sync;

/// A conversion of one value
#[derive(Clone)]
pub enum Conversion {
    To(ValueType),
    ListOf(ValueType),
    ItemsOf { key: String, default: Option<Value> },
    Sentence,
    Chain(Vec<Conversion>),
    Custom(Arc<ConvertFn>),
}

impl Conversion {
    /// Wrap a closure
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, InvocationError> + Send + Sync + 'static,
    {
        Conversion::Custom(Arc::new(func))
    }

    pub fn apply(&self, value: Value) -> std::result::Result<Value, InvocationError> {
        match self {
            Conversion::To(target) => target.convert(value),
            Conversion::ListOf(target) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| target.convert(item))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Err(InvocationError::new(format!("expected a list, got {}", other))),
            },
            Conversion::ItemsOf { key, default } => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        item_of(item, key).or_else(|| default.clone()).ok_or_else(|| {
                            InvocationError::new(format!("item {} has no '{}'", item, key))
                        })
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Err(InvocationError::new(format!("expected a list, got {}", other))),
            },
            Conversion::Sentence => match value {
                Value::Array(items) => Ok(Value::String(
                    items.iter().map(word).collect::<Vec<_>>().join(" "),
                )),
                other => Ok(Value::String(word(&other))),
            },
            Conversion::Chain(steps) => steps.iter().try_fold(value, |value, step| step.apply(value)),
            Conversion::Custom(func) => func(value),
        }
    }
}

fn item_of(item: &Value, key: &str) -> Option<Value> {
    match item {
        Value::Object(map) => map.get(key).cloned(),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)).cloned(),
        _ => None,
    }
}

fn word(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl FromStr for Conversion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let steps: Vec<&str> = s.split('|').map(str::trim).collect();
        if steps.len() > 1 {
            return steps
                .into_iter()
                .map(parse_step)
                .collect::<Result<Vec<_>>>()
                .map(Conversion::Chain);
        }
        parse_step(s.trim())
    }
}

fn parse_step(step: &str) -> Result<Conversion> {
    let invalid = |reason: &str| Error::ConfigError(format!("invalid conversion '{}': {}", step, reason));

    let Some((name, rest)) = step.split_once('(') else {
        return match step {
            "sentence" => Ok(Conversion::Sentence),
            "" => Err(invalid("empty")),
            scalar => Ok(Conversion::To(scalar.parse()?)),
        };
    };
    let inner = rest
        .strip_suffix(')')
        .ok_or_else(|| invalid("missing ')'"))?
        .trim();

    match name.trim() {
        "list_of" | "tuple_of" => Ok(Conversion::ListOf(inner.parse()?)),
        "items_of" => {
            let (key, default) = match inner.split_once(',') {
                Some((key, default)) => {
                    let default = default.trim();
                    let value = serde_json::from_str(default)
                        .unwrap_or_else(|_| Value::String(default.to_string()));
                    (key.trim(), Some(value))
                }
                None => (inner, None),
            };
            if key.is_empty() {
                return Err(invalid("items_of needs a key"));
            }
            Ok(Conversion::ItemsOf {
                key: key.to_string(),
                default,
            })
        }
        _ => Err(invalid("unknown conversion")),
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::To(target) => write!(f, "{}", target),
            Conversion::ListOf(target) => write!(f, "list_of({})", target),
            Conversion::ItemsOf { key, default: None } => write!(f, "items_of({})", key),
            Conversion::ItemsOf {
                key,
                default: Some(default),
            } => write!(f, "items_of({}, {})", key, default),
            Conversion::Sentence => write!(f, "sentence"),
            Conversion::Chain(steps) => {
                let steps: Vec<String> = steps.iter().map(ToString::to_string).collect();
                write!(f, "{}", steps.join(" | "))
            }
            Conversion::Custom(_) => write!(f, "<custom>"),
        }
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conversion({})", self)
    }
}

impl PartialEq for Conversion {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Conversion::Custom(a), Conversion::Custom(b)) => Arc::ptr_eq(a, b),
            (Conversion::Custom(_), _) | (_, Conversion::Custom(_)) => false,
            (a, b) => a.to_string() == b.to_string(),
        }
    }
}
