//! Run options organized by concern

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::resolver::OmissionPolicy;

/// Whether successive sources may share state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Strictly in order, fail-fast
    Dependent,
    /// No data dependency between sources; may run in parallel
    Independent,
}

crate::impl_case_insensitive_deserialize!(
    ExecutionMode,
    Dependent => ["dependent", "dep", "sequential"],
    Independent => ["independent", "indep"],
);

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Dependent => write!(f, "dependent"),
            ExecutionMode::Independent => write!(f, "independent"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|e| Error::ConfigError(format!("invalid execution mode: {}", e)))
    }
}

/// What to do when an output destination already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Fail the iteration with `DatasetExists`
    #[default]
    Fail,
    Overwrite,
    /// Leave the existing dataset untouched
    Keep,
}

crate::impl_case_insensitive_deserialize!(
    OverwritePolicy,
    Fail => ["fail", "error"],
    Overwrite => ["overwrite", "replace"],
    Keep => ["keep", "keep-existing", "keep_existing"],
);

impl FromStr for OverwritePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.to_string()))
            .map_err(|e| Error::ConfigError(format!("invalid overwrite policy: {}", e)))
    }
}

/// Options controlling one run of the execution driver
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Overrides the mode inferred from the mappings
    pub mode: Option<ExecutionMode>,
    pub omission: OmissionPolicy,
    pub overwrite: OverwritePolicy,
    /// Skip sources whose outputs all exist already
    pub close_gaps: bool,
    /// Run independent sources on a worker pool
    pub parallel: bool,
    /// Worker pool size; `None` lets rayon decide
    pub threads: Option<usize>,
    /// Separator between values printed on one stdout line
    pub stdout_separator: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: None,
            omission: OmissionPolicy::default(),
            overwrite: OverwritePolicy::default(),
            close_gaps: false,
            parallel: false,
            threads: None,
            stdout_separator: " ".to_string(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_omission(mut self, omission: OmissionPolicy) -> Self {
        self.omission = omission;
        self
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_close_gaps(mut self, close_gaps: bool) -> Self {
        self.close_gaps = close_gaps;
        self
    }

    pub fn with_parallel(mut self, threads: Option<usize>) -> Self {
        self.parallel = true;
        self.threads = threads;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(Error::ConfigError(
                "the worker pool needs at least one thread".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Dependent".parse::<ExecutionMode>().unwrap(), ExecutionMode::Dependent);
        assert_eq!("indep".parse::<ExecutionMode>().unwrap(), ExecutionMode::Independent);
        assert!("sometimes".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Independent.to_string(), "independent");
    }

    #[test]
    fn test_overwrite_policy_parsing() {
        assert_eq!("REPLACE".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Overwrite);
        assert_eq!(
            "keep-existing".parse::<OverwritePolicy>().unwrap(),
            OverwritePolicy::Keep
        );
        assert_eq!(OverwritePolicy::default(), OverwritePolicy::Fail);
    }

    #[test]
    fn test_builder_and_validation() {
        let options = RunOptions::new()
            .with_mode(ExecutionMode::Dependent)
            .with_close_gaps(true)
            .with_parallel(Some(0));
        assert_eq!(options.mode, Some(ExecutionMode::Dependent));
        assert!(options.close_gaps);
        assert!(options.validate().is_err());
        assert!(RunOptions::new().validate().is_ok());
    }
}
