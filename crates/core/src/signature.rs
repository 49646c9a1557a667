//! Parameter descriptor tables for wrapped functions
//!
//! A wrapped function is registered together with an explicit [`Signature`]
//! listing its parameters (name, default) and its output slots. The engine
//! never inspects the function itself.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::convert::Conversion;

/// A single formal parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    /// `None` marks the parameter as required
    pub default: Option<Value>,
    /// Applied to the bound value before the call
    pub preproc: Option<Conversion>,
}

impl Parameter {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            preproc: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
            preproc: None,
        }
    }

    pub fn with_preproc(mut self, conversion: Conversion) -> Self {
        self.preproc = Some(conversion);
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Declared parameters and output slots of a wrapped function
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Parameter>,
    pub outputs: Vec<String>,
    /// Output-slot key (name or index) to the conversion applied to that slot
    pub postprocs: BTreeMap<String, Conversion>,
}

impl Signature {
    /// A signature with no parameters and a single output slot named `result`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            outputs: vec!["result".to_string()],
            postprocs: BTreeMap::new(),
        }
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    /// Replace the output slots
    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Convert one output slot after the call
    pub fn postproc(mut self, slot: impl Into<String>, conversion: Conversion) -> Self {
        self.postprocs.insert(slot.into(), conversion);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Resolve an output-mapping key (slot name or decimal index) to a slot
    /// position
    pub fn output_index(&self, key: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o == key).or_else(|| {
            key.parse::<usize>()
                .ok()
                .filter(|index| *index < self.outputs.len())
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &param.default {
                Some(default) => write!(f, "{}={}", param.name, default)?,
                None => write!(f, "{}", param.name)?,
            }
        }
        write!(f, ")")?;
        match self.outputs.len() {
            0 => Ok(()),
            1 => write!(f, " -> {}", self.outputs[0]),
            _ => write!(f, " -> ({})", self.outputs.join(", ")),
        }
    }
}

/// Error raised by a wrapped function. The message is reported unmodified.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct InvocationError {
    pub message: String,
}

impl InvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Resolved arguments for one invocation, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.values
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Fetch an argument, failing the invocation if it is absent
    pub fn require(&self, name: &str) -> Result<&Value, InvocationError> {
        self.get(name)
            .ok_or_else(|| InvocationError::new(format!("argument '{}' not supplied", name)))
    }

    /// Fetch a numeric argument. Numeric strings are accepted, since
    /// positional arguments and option values arrive as text.
    pub fn number(&self, name: &str) -> Result<f64, InvocationError> {
        as_number(self.require(name)?)
            .ok_or_else(|| InvocationError::new(format!("argument '{}' is not a number", name)))
    }

    /// Fetch an array of numbers
    pub fn numbers(&self, name: &str) -> Result<Vec<f64>, InvocationError> {
        match self.require(name)? {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    as_number(item).ok_or_else(|| {
                        InvocationError::new(format!("argument '{}' holds a non-number", name))
                    })
                })
                .collect(),
            other => as_number(other).map(|n| vec![n]).ok_or_else(|| {
                InvocationError::new(format!("argument '{}' is not a list of numbers", name))
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Convert a computed number back to JSON, keeping integral values integral
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// A function the engine can invoke
pub trait WrappedFunction: Send + Sync {
    fn signature(&self) -> &Signature;

    fn call(&self, args: &Arguments) -> Result<Value, InvocationError>;
}

type CallFn = dyn Fn(&Arguments) -> Result<Value, InvocationError> + Send + Sync;

/// A closure registered together with its signature
pub struct FnFunction {
    signature: Signature,
    func: Box<CallFn>,
}

impl FnFunction {
    pub fn new<F>(signature: Signature, func: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        Self {
            signature,
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunction")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

impl WrappedFunction for FnFunction {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: &Arguments) -> Result<Value, InvocationError> {
        (self.func)(args)
    }
}
