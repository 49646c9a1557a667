//! Per-iteration outcomes and their aggregation

use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, ErrorKind};
use crate::execution::ExecutionMode;

/// Why an iteration did not invoke the function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Every output destination already existed (gap-closing)
    AlreadyComplete,
    /// An input dataset was missing and the omission policy skips
    MissingDataset { root: String, subpath: String },
    /// An earlier iteration skipped this root as a whole
    FileSkipped { root: String },
    /// An earlier iteration failed in dependent mode
    AbortedByPriorFailure,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyComplete => write!(f, "outputs already exist"),
            SkipReason::MissingDataset { root, subpath } => {
                write!(f, "missing dataset {}/{}", root, subpath)
            }
            SkipReason::FileSkipped { root } => write!(f, "{} skipped by an earlier iteration", root),
            SkipReason::AbortedByPriorFailure => write!(f, "aborted after an earlier failure"),
        }
    }
}

/// Result of one iteration
#[derive(Debug)]
pub enum ExecutionOutcome {
    Succeeded(Value),
    Skipped(SkipReason),
    Failed(Error),
}

impl ExecutionOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ExecutionOutcome::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed(_))
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            ExecutionOutcome::Skipped(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionOutcome::Failed(e) => Some(e.kind()),
            _ => None,
        }
    }
}

/// Time spent in each phase of an iteration
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IterationTimings {
    pub load: Duration,
    pub preproc: Duration,
    pub call: Duration,
    pub postproc: Duration,
    pub save: Duration,
    pub total: Duration,
}

/// Outcome of one source, recorded once and never mutated
#[derive(Debug)]
pub struct IterationRecord {
    /// Position of the source in the input order
    pub index: usize,
    /// Source identifier shown to the user
    pub source: String,
    pub outcome: ExecutionOutcome,
    pub timings: IterationTimings,
    /// Line destined for standard output, if the output mapping produced one
    pub stdout: Option<String>,
}

impl IterationRecord {
    pub fn skipped(index: usize, source: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            index,
            source: source.into(),
            outcome: ExecutionOutcome::Skipped(reason),
            timings: IterationTimings::default(),
            stdout: None,
        }
    }
}

/// Run-level hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    First,
    Last,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::First => write!(f, "first"),
            HookStage::Last => write!(f, "last"),
        }
    }
}

#[derive(Debug)]
pub struct HookFailure {
    pub stage: HookStage,
    pub error: Error,
}

/// Aggregated outcomes of a run, in source order
#[derive(Debug)]
pub struct ExecutionReport {
    pub mode: ExecutionMode,
    pub records: Vec<IterationRecord>,
    pub elapsed: Duration,
    /// Time spent in the `first` hook, when one ran
    pub first: Option<Duration>,
    /// Time spent in the `last` hook, when one ran
    pub last: Option<Duration>,
    pub hook_failure: Option<HookFailure>,
}

impl ExecutionReport {
    pub fn new(mode: ExecutionMode, mut records: Vec<IterationRecord>, elapsed: Duration) -> Self {
        records.sort_by_key(|r| r.index);
        Self {
            mode,
            records,
            elapsed,
            first: None,
            last: None,
            hook_failure: None,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn succeeded_count(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_succeeded()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_skipped()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_failed()).count()
    }

    /// True when no iteration and no hook failed
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0 && self.hook_failure.is_none()
    }

    /// Process exit status for this report
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn failures(&self) -> impl Iterator<Item = &IterationRecord> {
        self.records.iter().filter(|r| r.outcome.is_failed())
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &ExecutionOutcome> {
        self.records.iter().map(|r| &r.outcome)
    }

    /// One-line count of outcomes
    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} skipped, {} failed",
            self.succeeded_count(),
            self.skipped_count(),
            self.failed_count()
        )
    }

    /// One line per failed iteration: source, error kind, message. A failed
    /// hook comes first.
    pub fn failure_lines(&self) -> Vec<String> {
        let hook = self
            .hook_failure
            .iter()
            .map(|h| format!("{} hook: {}: {}", h.stage, h.error.kind(), h.error));
        hook.chain(self.failures().filter_map(|r| match &r.outcome {
            ExecutionOutcome::Failed(e) => Some(format!("{}: {}: {}", r.source, e.kind(), e)),
            _ => None,
        }))
        .collect()
    }

    /// Per-iteration phase timings as an aligned table
    pub fn timings_table(&self) -> String {
        let width = self
            .records
            .iter()
            .map(|r| r.source.len())
            .max()
            .unwrap_or(0)
            .max("source".len());
        let mut table = format!(
            "{:<width$}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}\n",
            "source",
            "load",
            "preproc",
            "call",
            "postproc",
            "save",
            "total",
            width = width
        );
        for r in &self.records {
            let t = &r.timings;
            table.push_str(&format!(
                "{:<width$}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}\n",
                r.source,
                format_duration(t.load),
                format_duration(t.preproc),
                format_duration(t.call),
                format_duration(t.postproc),
                format_duration(t.save),
                format_duration(t.total),
                width = width
            ));
        }
        for (stage, duration) in [(HookStage::First, self.first), (HookStage::Last, self.last)] {
            if let Some(duration) = duration {
                table.push_str(&format!("{} hook: {}\n", stage, format_duration(duration)));
            }
        }
        table.push_str(&format!("elapsed: {}", format_duration(self.elapsed)));
        table
    }
}

fn format_duration(d: Duration) -> String {
    format!("{:.3}ms", d.as_secs_f64() * 1000.0)
}
