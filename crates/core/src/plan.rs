//! Call plans and output plans
//!
//! A [`CallPlan`] is derived once per tool invocation from a function's
//! [`Signature`] and the input mapping. It decides, per parameter, whether the
//! value comes from a mapping or from the option-then-default fallback.
//! [`OutputPlan`] does the same for the function's output slots.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::convert::Conversion;
use crate::error::{Error, Result};
use crate::mapping::{InputMapping, MappingSpec, OutputMapping};
use crate::report::SkipReason;
use crate::resolver::{ExecutionContext, OmissionPolicy, Options, Resolved, resolve};
use crate::signature::{Arguments, InvocationError, Signature};
use crate::store::OpenMode;

/// Where a parameter's value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSource {
    /// An input-mapping entry, which outranks options and defaults
    Mapped(MappingSpec),
    /// The option of the same name, else the function default
    OptionOrDefault,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedParam {
    pub name: String,
    pub default: Option<Value>,
    pub source: ParamSource,
    pub preproc: Option<Conversion>,
}

/// Per-parameter binding decisions, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    pub function: String,
    pub params: Vec<PlannedParam>,
}

/// Arguments for one invocation, or the reason the source is skipped
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Bound(Arguments),
    Skip(SkipReason),
}

impl CallPlan {
    /// Build the plan.
    ///
    /// Named entries bind their parameter; `positional` entries bind the
    /// remaining required parameters in declaration order, then the remaining
    /// optional ones. A required parameter left without a mapping must be
    /// supplied as an option.
    pub fn build(signature: &Signature, mapping: &InputMapping, opts: &Options) -> Result<Self> {
        for name in mapping.named.keys() {
            if signature.get(name).is_none() {
                return Err(Error::UnknownParameter(name.clone()));
            }
        }

        // unnamed required parameters take positional entries first
        let unnamed = signature
            .params
            .iter()
            .filter(|p| !mapping.named.contains_key(&p.name));
        let order: Vec<&str> = unnamed
            .clone()
            .filter(|p| p.is_required())
            .chain(unnamed.filter(|p| !p.is_required()))
            .map(|p| p.name.as_str())
            .collect();
        let mut positional: BTreeMap<&str, &String> = BTreeMap::new();
        for (name, raw) in order.iter().copied().zip(&mapping.positional) {
            positional.insert(name, raw);
        }

        let mut params = Vec::with_capacity(signature.params.len());
        for param in &signature.params {
            let spec = match mapping.named.get(&param.name) {
                Some(value) => Some(input_spec(MappingSpec::from_value(value)?)?),
                None => match positional.get(param.name.as_str()) {
                    Some(raw) => Some(input_spec(MappingSpec::parse(raw)?)?),
                    None => None,
                },
            };

            let source = match spec {
                Some(spec) => ParamSource::Mapped(spec),
                None if param.is_required() && !opts.contains_key(&param.name) => {
                    return Err(Error::MissingRequiredParameter(param.name.clone()));
                }
                None => ParamSource::OptionOrDefault,
            };
            params.push(PlannedParam {
                name: param.name.clone(),
                default: param.default.clone(),
                source,
                preproc: param.preproc.clone(),
            });
        }

        let leftover: Vec<&String> = mapping.positional.iter().skip(order.len()).collect();
        if !leftover.is_empty() {
            return Err(Error::ConfigError(format!(
                "{} positional mapping(s) left over after binding every parameter of '{}': {}",
                leftover.len(),
                signature.name,
                leftover
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let plan = Self {
            function: signature.name.clone(),
            params,
        };
        tracing::debug!("Built call plan: {}", plan);
        Ok(plan)
    }

    /// Replace the conversion of one parameter
    pub fn set_preproc(&mut self, name: &str, conversion: Conversion) -> Result<()> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::UnknownParameter(name.to_string()))?;
        param.preproc = Some(conversion);
        Ok(())
    }

    pub fn has_conversions(&self) -> bool {
        self.params.iter().any(|p| p.preproc.is_some())
    }

    /// Apply each parameter's conversion to its bound value
    pub fn preprocess(&self, args: &mut Arguments) -> std::result::Result<(), InvocationError> {
        for param in &self.params {
            let Some(conversion) = &param.preproc else {
                continue;
            };
            if let Some(value) = args.get_mut(&param.name) {
                let raw = std::mem::take(value);
                *value = conversion.apply(raw).map_err(|e| {
                    InvocationError::new(format!("parameter '{}': {}", param.name, e))
                })?;
            }
        }
        Ok(())
    }

    fn specs(&self) -> impl Iterator<Item = &MappingSpec> {
        self.params.iter().filter_map(|p| match &p.source {
            ParamSource::Mapped(spec) => Some(spec),
            ParamSource::OptionOrDefault => None,
        })
    }

    pub fn max_positional_index(&self) -> Option<usize> {
        self.specs().filter_map(MappingSpec::max_positional_index).max()
    }

    pub fn uses_slices(&self) -> bool {
        self.specs().any(MappingSpec::is_slice)
    }

    /// Roots the plan reads datasets from, for the given arguments
    pub fn input_roots(&self, args: &[String]) -> Result<Vec<String>> {
        let mut roots = Vec::new();
        for spec in self.specs() {
            match spec {
                MappingSpec::PositionalSubpathRef { index, .. } => {
                    let root = args.get(*index).ok_or(Error::IndexOutOfRange {
                        index: *index,
                        available: args.len(),
                    })?;
                    roots.push(root.clone());
                }
                MappingSpec::PositionalSlice {
                    start,
                    end,
                    subpath: Some(_),
                } => {
                    let end = end.unwrap_or(args.len()).min(args.len());
                    let start = start.unwrap_or(0).min(end);
                    roots.extend(args[start..end].iter().cloned());
                }
                _ => {}
            }
        }
        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    /// Materialize the arguments for one iteration.
    ///
    /// Priority per parameter: input mapping, then option, then default.
    /// An omitted dataset falls through to the option and default.
    pub fn bind(&self, ctx: &ExecutionContext<'_>, policy: OmissionPolicy) -> Result<Binding> {
        let mut args = Arguments::new();
        for param in &self.params {
            let value = match &param.source {
                ParamSource::Mapped(spec) => {
                    match resolve(spec, ctx, policy, param.default.as_ref())? {
                        Resolved::Value(value) => value,
                        Resolved::Skip(reason) => return Ok(Binding::Skip(reason)),
                        Resolved::Omitted { root, subpath } => {
                            match fallback(param, ctx.opts) {
                                Some(value) => {
                                    tracing::debug!(
                                        "Omitted {}/{} for '{}', using fallback",
                                        root,
                                        subpath,
                                        param.name
                                    );
                                    value
                                }
                                None => return Err(Error::MissingDataset { root, subpath }),
                            }
                        }
                    }
                }
                ParamSource::OptionOrDefault => fallback(param, ctx.opts)
                    .ok_or_else(|| Error::MissingRequiredParameter(param.name.clone()))?,
            };
            args.push(param.name.clone(), value);
        }
        Ok(Binding::Bound(args))
    }
}

fn fallback(param: &PlannedParam, opts: &Options) -> Option<Value> {
    opts.get(&param.name).or(param.default.as_ref()).cloned()
}

fn input_spec(spec: MappingSpec) -> Result<MappingSpec> {
    match spec {
        MappingSpec::SelfOutputRef { .. } => Err(Error::malformed(
            spec.to_string(),
            "self references are only valid in output mappings",
        )),
        spec => Ok(spec),
    }
}

impl fmt::Display for CallPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match (&param.source, &param.default) {
                (ParamSource::Mapped(spec), _) => write!(f, "{}={}", param.name, spec)?,
                (ParamSource::OptionOrDefault, Some(default)) => {
                    write!(f, "{}=%{}|{}", param.name, param.name, default)?
                }
                (ParamSource::OptionOrDefault, None) => write!(f, "{}=%{}", param.name, param.name)?,
            }
        }
        write!(f, ")")
    }
}

/// Where one output slot goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Dataset { root: String, subpath: String },
    Stdout,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Dataset { root, subpath } => write!(f, "{}/{}", root, subpath),
            Destination::Stdout => write!(f, "<stdout>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub slot: usize,
    pub name: String,
    pub spec: MappingSpec,
}

/// Output-slot routing, immutable once built
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPlan {
    pub slots: Vec<String>,
    pub targets: Vec<OutputTarget>,
    /// One entry per slot
    pub postprocs: Vec<Option<Conversion>>,
}

impl OutputPlan {
    pub fn build(signature: &Signature, mapping: &OutputMapping) -> Result<Self> {
        let mut targets = Vec::with_capacity(mapping.entries.len());
        for (key, raw) in &mapping.entries {
            let slot = signature
                .output_index(key)
                .ok_or_else(|| Error::UnknownOutput(key.clone()))?;
            let spec = MappingSpec::parse(raw)?;
            match spec {
                MappingSpec::PositionalSubpathRef { .. } | MappingSpec::SelfOutputRef { .. } => {}
                _ => {
                    return Err(Error::malformed(
                        raw.clone(),
                        "output destinations are '$N/<path>', '#/<path>' or '#'",
                    ));
                }
            }
            targets.push(OutputTarget {
                slot,
                name: signature.outputs[slot].clone(),
                spec,
            });
        }
        targets.sort_by_key(|t| t.slot);
        let mut plan = Self {
            slots: signature.outputs.clone(),
            targets,
            postprocs: vec![None; signature.outputs.len().max(1)],
        };
        for (key, conversion) in &signature.postprocs {
            plan.set_postproc(signature, key, conversion.clone())?;
        }
        Ok(plan)
    }

    /// Replace the conversion of one output slot
    pub fn set_postproc(
        &mut self,
        signature: &Signature,
        key: &str,
        conversion: Conversion,
    ) -> Result<()> {
        let slot = signature
            .output_index(key)
            .ok_or_else(|| Error::UnknownOutput(key.to_string()))?;
        self.postprocs[slot] = Some(conversion);
        Ok(())
    }

    pub fn has_conversions(&self) -> bool {
        self.postprocs.iter().any(Option::is_some)
    }

    /// Apply the slot conversions to a return value. A multi-slot result is
    /// split first and comes back as a list in slot order.
    pub fn postprocess(&self, value: Value) -> Result<Value> {
        if !self.has_conversions() {
            return Ok(value);
        }
        let convert = |slot: usize, value: Value| match &self.postprocs[slot] {
            Some(conversion) => conversion.apply(value).map_err(|e| {
                let name = self.slots.get(slot).map(String::as_str).unwrap_or("result");
                Error::from(InvocationError::new(format!("output '{}': {}", name, e)))
            }),
            None => Ok(value),
        };
        if self.slots.len() <= 1 {
            return convert(0, value);
        }
        self.split(value)?
            .into_iter()
            .enumerate()
            .map(|(slot, value)| convert(slot, value))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn max_positional_index(&self) -> Option<usize> {
        self.targets
            .iter()
            .filter_map(|t| t.spec.max_positional_index())
            .max()
    }

    /// Concrete destinations for a source's arguments, in slot order
    pub fn destinations(&self, args: &[String]) -> Result<Vec<(usize, Destination)>> {
        self.targets
            .iter()
            .map(|target| {
                let destination = match &target.spec {
                    MappingSpec::PositionalSubpathRef { index, subpath } => Destination::Dataset {
                        root: arg(args, *index)?.to_string(),
                        subpath: subpath.clone(),
                    },
                    MappingSpec::SelfOutputRef { subpath } if subpath.is_empty() => {
                        Destination::Stdout
                    }
                    MappingSpec::SelfOutputRef { subpath } => Destination::Dataset {
                        root: arg(args, 0)?.to_string(),
                        subpath: subpath.clone(),
                    },
                    other => {
                        return Err(Error::malformed(other.to_string(), "not an output destination"));
                    }
                };
                Ok((target.slot, destination))
            })
            .collect()
    }

    /// Roots written by this plan, each to be opened for writing
    pub fn output_roots(&self, args: &[String]) -> Result<Vec<(String, OpenMode)>> {
        let mut roots: Vec<(String, OpenMode)> = self
            .destinations(args)?
            .into_iter()
            .filter_map(|(_, d)| match d {
                Destination::Dataset { root, .. } => Some((root, OpenMode::ReadWrite)),
                Destination::Stdout => None,
            })
            .collect();
        roots.sort();
        roots.dedup();
        Ok(roots)
    }

    /// Split a return value into one value per declared slot
    pub fn split(&self, value: Value) -> Result<Vec<Value>> {
        match self.slots.len() {
            0 => Ok(Vec::new()),
            1 => Ok(vec![value]),
            n => match value {
                Value::Array(items) if items.len() == n => Ok(items),
                Value::Array(items) => Err(Error::OutputShape(format!(
                    "expected {} values ({}), got {}",
                    n,
                    self.slots.join(", "),
                    items.len()
                ))),
                Value::Object(mut map) => self
                    .slots
                    .iter()
                    .map(|slot| {
                        map.remove(slot).ok_or_else(|| {
                            Error::OutputShape(format!("result has no field '{}'", slot))
                        })
                    })
                    .collect(),
                other => Err(Error::OutputShape(format!(
                    "expected {} values ({}), got {}",
                    n,
                    self.slots.join(", "),
                    other
                ))),
            },
        }
    }
}

fn arg(args: &[String], index: usize) -> Result<&str> {
    args.get(index)
        .map(String::as_str)
        .ok_or(Error::IndexOutOfRange {
            index,
            available: args.len(),
        })
}

impl fmt::Display for OutputPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.targets.is_empty() {
            return write!(f, "<stdout>");
        }
        let entries: Vec<String> = self
            .targets
            .iter()
            .map(|t| format!("{}={}", t.name, t.spec))
            .collect();
        write!(f, "{}", entries.join(", "))
    }
}
