//! Input and output mapping configuration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::spec::{MappingSpec, RESERVED_PREFIXES};
use crate::error::{Error, Result};
use crate::resolver::Options;
use crate::signature::Signature;

/// Parameter name to mapping, plus mapping strings for automatically
/// numbered parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputMapping {
    /// Explicit entries keyed by parameter name. Strings are parsed as
    /// mapping strings, other JSON values are literals.
    #[serde(default)]
    pub named: BTreeMap<String, Value>,
    /// Applied in order to the parameters that have no named entry
    #[serde(default)]
    pub positional: Vec<String>,
}

impl InputMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method for a named mapping string
    pub fn map(mut self, param: impl Into<String>, mapping: impl Into<String>) -> Self {
        self.named.insert(param.into(), Value::String(mapping.into()));
        self
    }

    /// Builder method for a named literal
    pub fn literal(mut self, param: impl Into<String>, value: Value) -> Self {
        self.named.insert(param.into(), value);
        self
    }

    /// Builder method for a positional mapping string
    pub fn positional(mut self, mapping: impl Into<String>) -> Self {
        self.positional.push(mapping.into());
        self
    }

    /// Fill in positional entries when none are configured: required
    /// parameters without a named entry are bound to `$0`, `$1`, ... in
    /// order. A required parameter given in `opts` is bound to its option
    /// (`%name`) instead and takes no argument. Fails when a named entry
    /// already refers to the argument a parameter would get.
    pub fn with_auto_positional(mut self, signature: &Signature, opts: &Options) -> Result<Self> {
        if !self.positional.is_empty() {
            return Ok(self);
        }
        let taken: Vec<usize> = self
            .named
            .values()
            .filter_map(|value| MappingSpec::from_value(value).ok())
            .filter_map(|spec| spec.max_positional_index())
            .collect();

        let mut index = 0;
        for param in signature.params.iter().filter(|p| p.is_required()) {
            if self.named.contains_key(&param.name) {
                index += 1;
                continue;
            }
            if opts.contains_key(&param.name) {
                self.named
                    .insert(param.name.clone(), Value::String(format!("%{}", param.name)));
                continue;
            }
            if taken.contains(&index) {
                return Err(Error::ConfigError(format!(
                    "required parameter '{}' has no input mapping and ${} is already mapped",
                    param.name, index
                )));
            }
            self.positional.push(format!("${}", index));
            index += 1;
        }
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }

    /// Patch entries from a `name=mapping,name=mapping` string
    pub fn apply_overrides(&mut self, overrides: &str) -> Result<()> {
        for (name, raw) in split_overrides(overrides, "--inmap")? {
            self.named.insert(name, parse_override_value(&raw));
        }
        Ok(())
    }
}

/// Output slot to destination mapping string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputMapping {
    pub entries: BTreeMap<String, String>,
}

impl OutputMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method for an output entry
    pub fn map(mut self, slot: impl Into<String>, mapping: impl Into<String>) -> Self {
        self.entries.insert(slot.into(), mapping.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patch entries from a `slot=mapping,...` string; `slot=null` removes
    /// the entry
    pub fn apply_overrides(&mut self, overrides: &str) -> Result<()> {
        for (slot, raw) in split_overrides(overrides, "--outmap")? {
            if raw == "null" || raw.is_empty() {
                self.entries.remove(&slot);
            } else {
                self.entries.insert(slot, raw);
            }
        }
        Ok(())
    }
}

fn split_overrides(overrides: &str, flag: &str) -> Result<Vec<(String, String)>> {
    overrides
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(3, '=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(mapping), None) if !name.trim().is_empty() => {
                    Ok((name.trim().to_string(), mapping.trim().to_string()))
                }
                _ => Err(Error::ConfigError(format!(
                    "{} expects name=mapping pairs separated by ',', got '{}'",
                    flag, pair
                ))),
            }
        })
        .collect()
}

/// Interpret an override value. References stay strings; anything that
/// reads as JSON becomes that value; the rest is a plain string.
pub fn parse_override_value(raw: &str) -> Value {
    if raw.starts_with(RESERVED_PREFIXES) {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Parameter;
    use serde_json::json;

    #[test]
    fn test_auto_positional_numbers_required_params() {
        let sig = Signature::new("f")
            .param(Parameter::required("a"))
            .param(Parameter::optional("k", json!(1)))
            .param(Parameter::required("b"));
        let mapping = InputMapping::new().with_auto_positional(&sig, &Options::new()).unwrap();
        assert_eq!(mapping.positional, vec!["$0".to_string(), "$1".to_string()]);
        assert!(mapping.named.is_empty());

        let mapping = InputMapping::new()
            .map("a", "$1/x")
            .with_auto_positional(&sig, &Options::new());
        assert!(mapping.is_err());

        let mapping = InputMapping::new()
            .map("a", "$0/x")
            .with_auto_positional(&sig, &Options::new())
            .unwrap();
        assert_eq!(mapping.positional, vec!["$1".to_string()]);

        // explicit positional entries are left alone
        let mapping = InputMapping::new()
            .positional("$0/y")
            .with_auto_positional(&sig, &Options::new())
            .unwrap();
        assert_eq!(mapping.positional, vec!["$0/y".to_string()]);
    }

    #[test]
    fn test_auto_positional_leaves_options_to_their_parameters() {
        let sig = Signature::new("f")
            .param(Parameter::required("a"))
            .param(Parameter::required("b"));
        let mut opts = Options::new();
        opts.insert("a".into(), json!(3));

        let mapping = InputMapping::new().with_auto_positional(&sig, &opts).unwrap();
        assert_eq!(mapping.named["a"], json!("%a"));
        assert_eq!(mapping.positional, vec!["$0".to_string()]);

        // an explicit entry still wins over the option
        let mapping = InputMapping::new()
            .map("a", "$0/x")
            .with_auto_positional(&sig, &opts)
            .unwrap();
        assert_eq!(mapping.named["a"], json!("$0/x"));
        assert_eq!(mapping.positional, vec!["$1".to_string()]);
    }

    #[test]
    fn test_inmap_overrides() {
        let mut mapping = InputMapping::new().map("x", "$0/raw");
        mapping
            .apply_overrides("x=$1/other, factor=3,label=hello")
            .unwrap();
        assert_eq!(mapping.named["x"], json!("$1/other"));
        assert_eq!(mapping.named["factor"], json!(3));
        assert_eq!(mapping.named["label"], json!("hello"));

        assert!(mapping.apply_overrides("novalue").is_err());
        assert!(mapping.apply_overrides("a=b=c").is_err());
    }

    #[test]
    fn test_outmap_overrides_remove_with_null() {
        let mut mapping = OutputMapping::new()
            .map("result", "$0/out")
            .map("extra", "#");
        mapping.apply_overrides("extra=null,result=#/copy").unwrap();
        assert_eq!(mapping.entries.len(), 1);
        assert_eq!(mapping.entries["result"], "#/copy");
    }

    #[test]
    fn test_output_mapping_serializes_as_plain_object() {
        let mapping: OutputMapping = serde_json::from_value(json!({"r": "$0/x"})).unwrap();
        assert_eq!(mapping.entries["r"], "$0/x");
    }
}
