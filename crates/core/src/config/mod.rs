//! Tool configuration
//!
//! A `.comliner.json` file holds defaults shared by every function plus
//! per-function layers:
//!
//! ```json
//! {
//!   "missing": "skip-source",
//!   "functions": {
//!     "scale": {
//!       "inmap": { "x": "$0/data/raw" },
//!       "outmap": { "result": "$0/data/scaled" },
//!       "preproc": { "x": "float" },
//!       "close_gaps": true
//!     }
//!   }
//! }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::convert::Conversion;
use crate::execution::{ExecutionMode, OverwritePolicy, RunOptions};
use crate::mapping::{InputMapping, OutputMapping};
use crate::resolver::{OmissionPolicy, Options};

pub use loader::{CONFIG_FILE_NAME, ConfigLoader};

/// Settings for running one function. Unset fields fall back to the
/// enclosing layer, then to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Parameter name to mapping string or literal JSON value
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub inmap: BTreeMap<String, Value>,

    /// Mapping strings for parameters without an `inmap` entry
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub positional: Vec<String>,

    /// Output slot to destination
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outmap: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<OmissionPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<OverwritePolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_gaps: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExecutionMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_separator: Option<String>,

    /// Default option values, overridden by options given on the command line
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,

    /// Parameter name to conversion expression, applied before the call
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub preproc: BTreeMap<String, String>,

    /// Output slot to conversion expression, applied after the call
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub postproc: BTreeMap<String, String>,
}

impl ToolConfig {
    /// Layer `other` on top of `self`
    pub fn merge(&mut self, other: ToolConfig) {
        self.inmap.extend(other.inmap);
        if !other.positional.is_empty() {
            self.positional = other.positional;
        }
        self.outmap.extend(other.outmap);
        self.options.extend(other.options);
        self.preproc.extend(other.preproc);
        self.postproc.extend(other.postproc);

        if other.missing.is_some() {
            self.missing = other.missing;
        }
        if other.overwrite.is_some() {
            self.overwrite = other.overwrite;
        }
        if other.close_gaps.is_some() {
            self.close_gaps = other.close_gaps;
        }
        if other.parallel.is_some() {
            self.parallel = other.parallel;
        }
        if other.threads.is_some() {
            self.threads = other.threads;
        }
        if other.mode.is_some() {
            self.mode = other.mode;
        }
        if other.stdout_separator.is_some() {
            self.stdout_separator = other.stdout_separator;
        }
    }

    /// The configured input mapping, before automatic numbering
    pub fn input_mapping(&self) -> InputMapping {
        InputMapping {
            named: self.inmap.clone(),
            positional: self.positional.clone(),
        }
    }

    pub fn output_mapping(&self) -> OutputMapping {
        OutputMapping {
            entries: self.outmap.clone(),
        }
    }

    /// Parsed `preproc` entries
    pub fn preprocs(&self) -> crate::Result<Vec<(String, Conversion)>> {
        parse_conversions(&self.preproc)
    }

    /// Parsed `postproc` entries
    pub fn postprocs(&self) -> crate::Result<Vec<(String, Conversion)>> {
        parse_conversions(&self.postproc)
    }

    pub fn default_options(&self) -> Options {
        self.options.clone()
    }

    pub fn run_options(&self) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            mode: self.mode,
            omission: self.missing.unwrap_or(defaults.omission),
            overwrite: self.overwrite.unwrap_or(defaults.overwrite),
            close_gaps: self.close_gaps.unwrap_or(defaults.close_gaps),
            parallel: self.parallel.unwrap_or(defaults.parallel),
            threads: self.threads,
            stdout_separator: self
                .stdout_separator
                .clone()
                .unwrap_or(defaults.stdout_separator),
        }
    }
}

fn parse_conversions(entries: &BTreeMap<String, String>) -> crate::Result<Vec<(String, Conversion)>> {
    entries
        .iter()
        .map(|(key, expr)| Ok((key.clone(), expr.parse()?)))
        .collect()
}

/// Content of one configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Settings shared by every function
    #[serde(flatten)]
    pub defaults: ToolConfig,

    /// Per-function layers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, ToolConfig>,
}

impl ConfigFile {
    pub fn from_json(contents: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Layer `other` (a more specific file) on top of `self`
    pub fn merge(&mut self, other: ConfigFile) {
        self.defaults.merge(other.defaults);
        for (name, layer) in other.functions {
            self.functions.entry(name).or_default().merge(layer);
        }
    }

    /// Effective configuration of one function
    pub fn for_function(&self, name: &str) -> ToolConfig {
        let mut config = self.defaults.clone();
        if let Some(layer) = self.functions.get(name) {
            config.merge(layer.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_aliases() {
        let file = ConfigFile::from_json(
            r##"{
                "missing": "Skip",
                "functions": {
                    "scale": {
                        "inmap": {"x": "$0/raw", "factor": 3},
                        "outmap": {"result": "#/scaled"},
                        "overwrite": "replace",
                        "mode": "dependent"
                    }
                }
            }"##,
        )
        .unwrap();
        assert_eq!(file.defaults.missing, Some(OmissionPolicy::SkipSource));

        let config = file.for_function("scale");
        assert_eq!(config.missing, Some(OmissionPolicy::SkipSource));
        assert_eq!(config.overwrite, Some(OverwritePolicy::Overwrite));
        assert_eq!(config.inmap["factor"], json!(3));
        assert_eq!(config.output_mapping().entries["result"], "#/scaled");

        let options = config.run_options();
        assert_eq!(options.mode, Some(ExecutionMode::Dependent));
        assert_eq!(options.omission, OmissionPolicy::SkipSource);
        assert_eq!(options.stdout_separator, " ");
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let err = ConfigFile::from_json(r#"{"missing": "whatever"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown variant 'whatever'"));
    }

    #[test]
    fn test_merge_prefers_the_more_specific_layer() {
        let mut base = ConfigFile::from_json(
            r#"{"close_gaps": true, "functions": {"f": {"inmap": {"a": "$0"}, "threads": 2}}}"#,
        )
        .unwrap();
        let near = ConfigFile::from_json(
            r#"{"close_gaps": false, "functions": {"f": {"inmap": {"b": "$1"}}}}"#,
        )
        .unwrap();
        base.merge(near);

        let config = base.for_function("f");
        assert_eq!(config.close_gaps, Some(false));
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.inmap.len(), 2);

        // functions without a layer get the defaults
        assert_eq!(base.for_function("g").close_gaps, Some(false));
    }

    #[test]
    fn test_conversions_are_layered_and_parsed() {
        let mut base = ConfigFile::from_json(
            r#"{"preproc": {"values": "list_of(int)"}, "functions": {"mean": {"postproc": {"result": "str"}}}}"#,
        )
        .unwrap();
        let near = ConfigFile::from_json(
            r#"{"functions": {"mean": {"preproc": {"values": "list_of(float)"}}}}"#,
        )
        .unwrap();
        base.merge(near);

        let config = base.for_function("mean");
        assert_eq!(
            config.preprocs().unwrap(),
            vec![("values".to_string(), "list_of(float)".parse().unwrap())]
        );
        assert_eq!(config.postprocs().unwrap()[0].1.to_string(), "str");

        let broken = ToolConfig {
            postproc: BTreeMap::from([("result".to_string(), "list_of(".to_string())]),
            ..Default::default()
        };
        let err = broken.postprocs().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigError);
    }

    #[test]
    fn test_serialization_skips_unset_fields() {
        let mut file = ConfigFile::default();
        file.functions.insert(
            "touch".to_string(),
            ToolConfig {
                close_gaps: Some(true),
                ..Default::default()
            },
        );
        insta::assert_snapshot!(file.to_json().unwrap(), @r#"
        {
          "functions": {
            "touch": {
              "close_gaps": true
            }
          }
        }
        "#);
    }
}
