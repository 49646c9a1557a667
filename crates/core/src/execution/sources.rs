//! Splitting the positional arguments into iteration sources

use std::fmt;

use super::options::ExecutionMode;
use crate::error::{Error, Result};
use crate::mapping::MappingSpec;
use crate::plan::{CallPlan, OutputPlan};

/// The positional arguments of one iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Position in the input order
    pub index: usize,
    pub args: Vec<String>,
}

impl Source {
    pub fn new(index: usize, args: Vec<String>) -> Self {
        Self { index, args }
    }

    /// Identifier shown in reports
    pub fn label(&self) -> String {
        if self.args.is_empty() {
            format!("<source {}>", self.index)
        } else {
            self.args.join(" ")
        }
    }

    /// The root `#/...` destinations write into
    pub fn primary_root(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Ordered sources and the mode they run in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePlan {
    pub mode: ExecutionMode,
    pub sources: Vec<Source>,
}

impl SourcePlan {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Derive the iteration list from the positional arguments.
///
/// - any slice reference: one source holding every argument, dependent
/// - no positional reference: one source per argument, independent
/// - highest index 0: one source per argument, independent
/// - highest index `N-1`: consecutive chunks of `N` arguments, dependent
pub fn plan_sources(args: &[String], call: &CallPlan, output: &OutputPlan) -> Result<SourcePlan> {
    if call.uses_slices() {
        tracing::debug!("Slice reference found, running once over {} arguments", args.len());
        return Ok(SourcePlan {
            mode: ExecutionMode::Dependent,
            sources: vec![Source::new(0, args.to_vec())],
        });
    }

    let max_index = [call.max_positional_index(), output_max_index(output)]
        .into_iter()
        .flatten()
        .max();

    let plan = match max_index {
        None if args.is_empty() => SourcePlan {
            mode: ExecutionMode::Independent,
            sources: vec![Source::new(0, Vec::new())],
        },
        None | Some(0) => {
            if args.is_empty() {
                return Err(Error::InvalidArguments(
                    "expected at least one argument".to_string(),
                ));
            }
            SourcePlan {
                mode: ExecutionMode::Independent,
                sources: args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| Source::new(i, vec![arg.clone()]))
                    .collect(),
            }
        }
        Some(max) => {
            let chunk = max + 1;
            if args.is_empty() || args.len() % chunk != 0 {
                return Err(Error::InvalidArguments(format!(
                    "expected a non-zero multiple of {} arguments, got {}",
                    chunk,
                    args.len()
                )));
            }
            SourcePlan {
                mode: ExecutionMode::Dependent,
                sources: args
                    .chunks(chunk)
                    .enumerate()
                    .map(|(i, chunk)| Source::new(i, chunk.to_vec()))
                    .collect(),
            }
        }
    };

    tracing::debug!("Planned {} {} source(s)", plan.len(), plan.mode);
    Ok(plan)
}

/// `#/...` writes into argument 0, so it counts as a reference to it
fn output_max_index(output: &OutputPlan) -> Option<usize> {
    let self_refs = output.targets.iter().filter_map(|t| match &t.spec {
        MappingSpec::SelfOutputRef { subpath } if !subpath.is_empty() => Some(0),
        _ => None,
    });
    output.max_positional_index().into_iter().chain(self_refs).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{InputMapping, OutputMapping};
    use crate::resolver::Options;
    use crate::signature::{Parameter, Signature};

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn plan(inmap: InputMapping, outmap: OutputMapping, items: &[&str]) -> Result<SourcePlan> {
        let sig = Signature::new("f")
            .param(Parameter::optional("a", serde_json::json!(0)))
            .param(Parameter::optional("b", serde_json::json!(0)));
        let call = CallPlan::build(&sig, &inmap, &Options::new())?;
        let output = OutputPlan::build(&sig, &outmap)?;
        plan_sources(&args(items), &call, &output)
    }

    #[test]
    fn test_no_references() {
        let p = plan(InputMapping::new(), OutputMapping::new(), &["x", "y", "z"]).unwrap();
        assert_eq!(p.mode, ExecutionMode::Independent);
        assert_eq!(p.len(), 3);
        assert_eq!(p.sources[2], Source::new(2, args(&["z"])));

        let p = plan(InputMapping::new(), OutputMapping::new(), &[]).unwrap();
        assert_eq!(p.sources, vec![Source::new(0, vec![])]);
    }

    #[test]
    fn test_single_index_is_independent() {
        let p = plan(InputMapping::new().map("a", "$0/x"), OutputMapping::new(), &["f", "g"]).unwrap();
        assert_eq!(p.mode, ExecutionMode::Independent);
        assert_eq!(p.len(), 2);

        let err = plan(InputMapping::new().map("a", "$0"), OutputMapping::new(), &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));

        let p = plan(InputMapping::new(), OutputMapping::new().map("result", "#/out"), &["f"]).unwrap();
        assert_eq!(p.mode, ExecutionMode::Independent);
    }

    #[test]
    fn test_chunks_are_dependent() {
        let inmap = InputMapping::new().map("a", "$0/x").map("b", "$1/y");
        let p = plan(inmap.clone(), OutputMapping::new(), &["a1", "b1", "a2", "b2"]).unwrap();
        assert_eq!(p.mode, ExecutionMode::Dependent);
        assert_eq!(p.sources[1], Source::new(1, args(&["a2", "b2"])));
        assert_eq!(p.sources[1].label(), "a2 b2");

        assert!(plan(inmap.clone(), OutputMapping::new(), &["a1", "b1", "a2"]).is_err());
        assert!(plan(inmap, OutputMapping::new(), &[]).is_err());

        // output references count too
        let p = plan(
            InputMapping::new().map("a", "$0/x"),
            OutputMapping::new().map("result", "$1/out"),
            &["in", "out"],
        )
        .unwrap();
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_slices_run_once() {
        let p = plan(InputMapping::new().map("a", "$@/x"), OutputMapping::new(), &["f", "g", "h"]).unwrap();
        assert_eq!(p.mode, ExecutionMode::Dependent);
        assert_eq!(p.sources, vec![Source::new(0, args(&["f", "g", "h"]))]);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Source::new(3, vec![]).label(), "<source 3>");
        assert_eq!(Source::new(0, args(&["a.json"])).primary_root(), Some("a.json"));
    }
}
