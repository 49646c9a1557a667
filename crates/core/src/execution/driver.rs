//! The execution driver
//!
//! Runs the wrapped function once per source. Every iteration opens its own
//! handles, binds its arguments, invokes the function and routes the result
//! through the output plan. Nothing is shared between iterations except the
//! immutable plans, so independent sources can run on worker threads.

use serde_json::Value;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use super::options::{ExecutionMode, OverwritePolicy, RunOptions};
use super::scheduler;
use super::sources::{Source, SourcePlan, plan_sources};
use crate::convert::Conversion;
use crate::error::{Error, Result};
use crate::mapping::{InputMapping, OutputMapping};
use crate::plan::{Binding, CallPlan, Destination, OutputPlan};
use crate::report::{
    ExecutionOutcome, ExecutionReport, HookFailure, HookStage, IterationRecord, IterationTimings,
    SkipReason,
};
use crate::resolver::{ExecutionContext, OmissionPolicy, Options};
use crate::signature::{InvocationError, WrappedFunction};
use crate::store::{AddressableStore, OpenMode, root_key};

type HookFn = dyn Fn() -> std::result::Result<(), InvocationError> + Send + Sync;

/// Executes a wrapped function over planned sources
pub struct ExecutionDriver<'a> {
    function: &'a dyn WrappedFunction,
    store: &'a dyn AddressableStore,
    call_plan: CallPlan,
    output_plan: OutputPlan,
    opts: Options,
    options: RunOptions,
    first: Option<Box<HookFn>>,
    last: Option<Box<HookFn>>,
}

/// What a finished iteration produced
struct Completed {
    value: Value,
    stdout: Option<String>,
}

impl<'a> ExecutionDriver<'a> {
    /// Build the call and output plans. Every configuration error surfaces
    /// here, before any store is touched.
    pub fn new(
        function: &'a dyn WrappedFunction,
        store: &'a dyn AddressableStore,
        inmap: &InputMapping,
        outmap: &OutputMapping,
        opts: Options,
        options: RunOptions,
    ) -> Result<Self> {
        options.validate()?;
        let signature = function.signature();
        let call_plan = CallPlan::build(signature, inmap, &opts)?;
        let output_plan = OutputPlan::build(signature, outmap)?;
        tracing::debug!(
            "Driver for {} over {} store: outputs {}",
            signature.name,
            store.name(),
            output_plan
        );
        Ok(Self {
            function,
            store,
            call_plan,
            output_plan,
            opts,
            options,
            first: None,
            last: None,
        })
    }

    /// Convert a parameter's bound value before each call
    pub fn with_preproc(mut self, param: &str, conversion: Conversion) -> Result<Self> {
        self.call_plan.set_preproc(param, conversion)?;
        Ok(self)
    }

    /// Convert an output slot (name or index) after each call
    pub fn with_postproc(mut self, slot: &str, conversion: Conversion) -> Result<Self> {
        self.output_plan
            .set_postproc(self.function.signature(), slot, conversion)?;
        Ok(self)
    }

    /// Run `hook` once before the first source. If it fails, no source runs.
    pub fn on_first<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> std::result::Result<(), InvocationError> + Send + Sync + 'static,
    {
        self.first = Some(Box::new(hook));
        self
    }

    /// Run `hook` once after the last source
    pub fn on_last<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> std::result::Result<(), InvocationError> + Send + Sync + 'static,
    {
        self.last = Some(Box::new(hook));
        self
    }

    pub fn call_plan(&self) -> &CallPlan {
        &self.call_plan
    }

    pub fn output_plan(&self) -> &OutputPlan {
        &self.output_plan
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Split the arguments into sources, honoring a mode override
    pub fn plan_sources(&self, args: &[String]) -> Result<SourcePlan> {
        let mut plan = plan_sources(args, &self.call_plan, &self.output_plan)?;
        if let Some(mode) = self.options.mode {
            if mode != plan.mode {
                tracing::info!("Running {} sources although {} was inferred", mode, plan.mode);
            }
            plan.mode = mode;
        }
        Ok(plan)
    }

    /// Plan and execute in one step
    pub fn run(&self, args: &[String]) -> Result<ExecutionReport> {
        let plan = self.plan_sources(args)?;
        Ok(self.execute(&plan))
    }

    pub fn execute(&self, plan: &SourcePlan) -> ExecutionReport {
        let start = Instant::now();
        let first = self.run_hook(HookStage::First);
        let first_failed = matches!(first, Some((_, Err(_))));

        let records = if first_failed {
            plan.sources
                .iter()
                .map(|s| {
                    IterationRecord::skipped(s.index, s.label(), SkipReason::AbortedByPriorFailure)
                })
                .collect()
        } else {
            self.run_sources(plan)
        };
        let last = if first_failed {
            None
        } else {
            self.run_hook(HookStage::Last)
        };

        let mut report = ExecutionReport::new(plan.mode, records, start.elapsed());
        report.first = first.as_ref().map(|(elapsed, _)| *elapsed);
        report.last = last.as_ref().map(|(elapsed, _)| *elapsed);
        for (stage, hook) in [(HookStage::First, first), (HookStage::Last, last)] {
            if let Some((_, Err(error))) = hook {
                report.hook_failure = Some(HookFailure { stage, error });
            }
        }
        tracing::info!("{}: {}", self.call_plan.function, report.summary());
        report
    }

    fn run_hook(&self, stage: HookStage) -> Option<(Duration, Result<()>)> {
        let hook = match stage {
            HookStage::First => self.first.as_ref()?,
            HookStage::Last => self.last.as_ref()?,
        };
        let start = Instant::now();
        let result = hook().map_err(Error::from);
        if let Err(e) = &result {
            tracing::warn!("{} hook failed: {}", stage, e);
        }
        Some((start.elapsed(), result))
    }

    fn run_sources(&self, plan: &SourcePlan) -> Vec<IterationRecord> {
        match plan.mode {
            ExecutionMode::Dependent => self.run_sequential(&plan.sources, true),
            ExecutionMode::Independent if self.options.parallel && plan.len() > 1 => {
                match scheduler::run_parallel(self, &plan.sources, self.options.threads) {
                    Ok(records) => records,
                    Err(e) => {
                        tracing::warn!("Falling back to sequential execution: {}", e);
                        self.run_sequential(&plan.sources, false)
                    }
                }
            }
            ExecutionMode::Independent => self.run_sequential(&plan.sources, false),
        }
    }

    /// Run sources one after another. With `fail_fast`, the first failure
    /// marks every later source as aborted.
    pub(crate) fn run_sequential(&self, sources: &[Source], fail_fast: bool) -> Vec<IterationRecord> {
        let mut records = Vec::with_capacity(sources.len());
        let mut skipped_roots = BTreeSet::new();
        let mut aborted = false;

        for source in sources {
            if aborted {
                records.push(IterationRecord::skipped(
                    source.index,
                    source.label(),
                    SkipReason::AbortedByPriorFailure,
                ));
                continue;
            }
            if let Some(root) = source.args.iter().find(|a| skipped_roots.contains(&root_key(a))) {
                records.push(IterationRecord::skipped(
                    source.index,
                    source.label(),
                    SkipReason::FileSkipped { root: root.clone() },
                ));
                continue;
            }

            let record = self.run_source(source);
            if self.options.omission == OmissionPolicy::SkipFile {
                if let Some(SkipReason::MissingDataset { root, .. }) = record.outcome.skip_reason() {
                    skipped_roots.insert(root_key(root));
                }
            }
            if fail_fast && record.outcome.is_failed() {
                tracing::warn!("{} failed, aborting remaining sources", record.source);
                aborted = true;
            }
            records.push(record);
        }
        records
    }

    /// Run one iteration from opening its handles to committing its writes
    pub(crate) fn run_source(&self, source: &Source) -> IterationRecord {
        let start = Instant::now();
        let mut timings = IterationTimings::default();
        let outcome = match self.iterate(source, &mut timings, start) {
            Ok(Ok(completed)) => {
                timings.total = start.elapsed();
                return IterationRecord {
                    index: source.index,
                    source: source.label(),
                    outcome: ExecutionOutcome::Succeeded(completed.value),
                    timings,
                    stdout: completed.stdout,
                };
            }
            Ok(Err(reason)) => ExecutionOutcome::Skipped(reason),
            Err(e) => ExecutionOutcome::Failed(e),
        };
        timings.total = start.elapsed();

        match &outcome {
            ExecutionOutcome::Skipped(reason) => tracing::debug!("{} skipped: {}", source, reason),
            ExecutionOutcome::Failed(e) => tracing::warn!("{} failed: {}", source, e),
            ExecutionOutcome::Succeeded(_) => {}
        }
        IterationRecord {
            index: source.index,
            source: source.label(),
            outcome,
            timings,
            stdout: None,
        }
    }

    fn iterate(
        &self,
        source: &Source,
        timings: &mut IterationTimings,
        start: Instant,
    ) -> Result<std::result::Result<Completed, SkipReason>> {
        let mut ctx = ExecutionContext::new(source.index, source.args.clone(), &self.opts);

        // destination roots first, so a root used both ways is writable
        let destinations = self.output_plan.destinations(&source.args)?;
        for (root, mode) in self.output_plan.output_roots(&source.args)? {
            ctx.handles.open(self.store, &root, mode)?;
        }
        for root in self.call_plan.input_roots(&source.args)? {
            ctx.handles.open(self.store, &root, OpenMode::Read)?;
        }

        if self.options.close_gaps && self.outputs_complete(&ctx, &destinations)? {
            return Ok(Err(SkipReason::AlreadyComplete));
        }

        let mut args = match self.call_plan.bind(&ctx, self.options.omission)? {
            Binding::Bound(args) => args,
            Binding::Skip(reason) => return Ok(Err(reason)),
        };
        timings.load = start.elapsed();

        let preproc_start = Instant::now();
        self.call_plan.preprocess(&mut args)?;
        timings.preproc = preproc_start.elapsed();

        let call_start = Instant::now();
        let value = self.function.call(&args)?;
        timings.call = call_start.elapsed();

        let postproc_start = Instant::now();
        let value = self.output_plan.postprocess(value)?;
        timings.postproc = postproc_start.elapsed();

        let save_start = Instant::now();
        let stdout = self.route(&mut ctx, &destinations, &value)?;
        ctx.handles.commit()?;
        timings.save = save_start.elapsed();

        Ok(Ok(Completed { value, stdout }))
    }

    /// True when there is at least one dataset destination and all of them
    /// exist
    fn outputs_complete(
        &self,
        ctx: &ExecutionContext<'_>,
        destinations: &[(usize, Destination)],
    ) -> Result<bool> {
        let mut any = false;
        for (_, destination) in destinations {
            if let Destination::Dataset { root, subpath } = destination {
                if !ctx.handles.exists(root, subpath)? {
                    return Ok(false);
                }
                any = true;
            }
        }
        Ok(any)
    }

    /// Write the result to its destinations, returning the stdout line
    fn route(
        &self,
        ctx: &mut ExecutionContext<'_>,
        destinations: &[(usize, Destination)],
        value: &Value,
    ) -> Result<Option<String>> {
        let separator = &self.options.stdout_separator;
        if self.output_plan.is_empty() {
            return Ok(match value {
                Value::Null => None,
                value => Some(format_stdout(value, separator)),
            });
        }

        let values = self.output_plan.split(value.clone())?;
        let mut printed = Vec::new();
        for (slot, destination) in destinations {
            let Some(value) = values.get(*slot) else {
                continue;
            };
            match destination {
                Destination::Stdout => printed.push(format_stdout(value, separator)),
                Destination::Dataset { root, subpath } => {
                    if ctx.handles.exists(root, subpath)? {
                        match self.options.overwrite {
                            OverwritePolicy::Fail => {
                                return Err(Error::DatasetExists {
                                    root: root.clone(),
                                    subpath: subpath.clone(),
                                });
                            }
                            OverwritePolicy::Keep => {
                                tracing::warn!("Keeping existing dataset {}", destination);
                                continue;
                            }
                            OverwritePolicy::Overwrite => {
                                tracing::debug!("Overwriting {}", destination);
                            }
                        }
                    }
                    ctx.handles.write(root, subpath, value.clone())?;
                }
            }
        }

        Ok(if printed.is_empty() {
            None
        } else {
            Some(printed.join(separator))
        })
    }
}

/// Render a value as one stdout line. Strings print bare; arrays print their
/// items joined by `separator`.
pub fn format_stdout(value: &Value, separator: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| format_stdout(item, separator))
            .collect::<Vec<_>>()
            .join(separator),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::signature::{Arguments, FnFunction, InvocationError, Parameter, Signature, number_value};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn double(calls: Arc<AtomicUsize>) -> FnFunction {
        FnFunction::new(
            Signature::new("double").param(Parameter::required("x")),
            move |a: &Arguments| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(number_value(a.number("x")? * 2.0))
            },
        )
    }

    fn data_mappings() -> (InputMapping, OutputMapping) {
        (
            InputMapping::new().map("x", "$0/data/raw"),
            OutputMapping::new().map("result", "$0/data/processed"),
        )
    }

    #[test]
    fn test_doubles_into_the_same_file() {
        let store = MemoryStore::new().with_root("f", json!({"data": {"raw": 7}}));
        let func = double(Arc::default());
        let (inmap, outmap) = data_mappings();
        let driver =
            ExecutionDriver::new(&func, &store, &inmap, &outmap, Options::new(), RunOptions::new())
                .unwrap();

        let report = driver.run(&args(&["f"])).unwrap();
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(store.dataset("f", "data/processed"), Some(json!(14)));
    }

    #[test]
    fn test_missing_dataset_leaves_store_untouched() {
        let store = MemoryStore::new().with_root("f", json!({"data": {}}));
        let func = double(Arc::default());
        let (inmap, outmap) = data_mappings();
        let driver =
            ExecutionDriver::new(&func, &store, &inmap, &outmap, Options::new(), RunOptions::new())
                .unwrap();

        let report = driver.run(&args(&["f"])).unwrap();
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.records[0].outcome.error_kind(), Some(ErrorKind::MissingDataset));
        assert_eq!(store.snapshot("f"), Some(json!({"data": {}})));
    }

    #[test]
    fn test_gap_closing_is_idempotent() {
        let store = MemoryStore::new()
            .with_root("a", json!({"data": {"raw": 1}}))
            .with_root("b", json!({"data": {"raw": 2}}));
        let calls = Arc::new(AtomicUsize::new(0));
        let func = double(Arc::clone(&calls));
        let (inmap, outmap) = data_mappings();
        let options = RunOptions::new().with_close_gaps(true);
        let driver =
            ExecutionDriver::new(&func, &store, &inmap, &outmap, Options::new(), options).unwrap();

        let first = driver.run(&args(&["a", "b"])).unwrap();
        assert_eq!(first.succeeded_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let second = driver.run(&args(&["a", "b"])).unwrap();
        assert_eq!(second.skipped_count(), 2);
        assert!(second
            .outcomes()
            .all(|o| o.skip_reason() == Some(&SkipReason::AlreadyComplete)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stdout_only_outputs_are_never_complete() {
        let store = MemoryStore::new();
        let func = FnFunction::new(Signature::new("hello"), |_: &Arguments| Ok(json!("hi")));
        let options = RunOptions::new().with_close_gaps(true);
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new(),
            &OutputMapping::new().map("result", "#"),
            Options::new(),
            options,
        )
        .unwrap();
        let report = driver.run(&[]).unwrap();
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.records[0].stdout.as_deref(), Some("hi"));
    }

    #[test]
    fn test_dependent_mode_fails_fast() {
        let store = MemoryStore::new()
            .with_root("a", json!({}))
            .with_root("b", json!({"x": 1}))
            .with_root("c", json!({"x": 1}));
        let func = double(Arc::default());
        let options = RunOptions::new().with_mode(ExecutionMode::Dependent);
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("x", "$0/x"),
            &OutputMapping::new(),
            Options::new(),
            options,
        )
        .unwrap();

        let report = driver.run(&args(&["a", "b", "c"])).unwrap();
        assert!(report.records[0].outcome.is_failed());
        for record in &report.records[1..] {
            assert_eq!(
                record.outcome.skip_reason(),
                Some(&SkipReason::AbortedByPriorFailure)
            );
        }
    }

    #[test]
    fn test_independent_mode_continues_after_failure() {
        let store = MemoryStore::new()
            .with_root("a", json!({}))
            .with_root("b", json!({"x": 1}));
        let func = double(Arc::default());
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("x", "$0/x"),
            &OutputMapping::new(),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap();

        let report = driver.run(&args(&["a", "b"])).unwrap();
        assert_eq!(report.mode, ExecutionMode::Independent);
        assert!(report.records[0].outcome.is_failed());
        assert!(report.records[1].outcome.is_succeeded());
        assert_eq!(report.records[1].stdout.as_deref(), Some("2"));
    }

    #[test]
    fn test_zero_arity_runs_once_per_source() {
        let store = MemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let func = FnFunction::new(Signature::new("tick"), move |_: &Arguments| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new(),
            &OutputMapping::new(),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap();

        let report = driver.run(&args(&["one", "two", "three"])).unwrap();
        assert_eq!(report.succeeded_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(report.records.iter().all(|r| r.stdout.is_none()));
    }

    #[test]
    fn test_overwrite_policies() {
        let seeded = || MemoryStore::new().with_root("f", json!({"data": {"raw": 3, "processed": 0}}));
        let func = double(Arc::default());
        let (inmap, outmap) = data_mappings();
        let run = |store: &MemoryStore, policy: OverwritePolicy| {
            let options = RunOptions::new().with_overwrite(policy);
            ExecutionDriver::new(&func, store, &inmap, &outmap, Options::new(), options)
                .unwrap()
                .run(&args(&["f"]))
                .unwrap()
        };

        let store = seeded();
        let report = run(&store, OverwritePolicy::Fail);
        assert_eq!(report.records[0].outcome.error_kind(), Some(ErrorKind::DatasetExists));
        assert_eq!(store.dataset("f", "data/processed"), Some(json!(0)));

        let store = seeded();
        assert!(run(&store, OverwritePolicy::Keep).is_success());
        assert_eq!(store.dataset("f", "data/processed"), Some(json!(0)));

        let store = seeded();
        assert!(run(&store, OverwritePolicy::Overwrite).is_success());
        assert_eq!(store.dataset("f", "data/processed"), Some(json!(6)));
    }

    #[test]
    fn test_skip_file_suppresses_later_sources_of_the_same_root() {
        let store = MemoryStore::new()
            .with_root("a", json!({"x": 1}))
            .with_root("b", json!({"y": 2}));
        let func = FnFunction::new(
            Signature::new("add")
                .param(Parameter::required("x"))
                .param(Parameter::required("y")),
            |a: &Arguments| Ok(number_value(a.number("x")? + a.number("y")?)),
        );
        let options = RunOptions::new().with_omission(OmissionPolicy::SkipFile);
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("x", "$0/x").map("y", "$1/y"),
            &OutputMapping::new(),
            Options::new(),
            options,
        )
        .unwrap();

        // sources are (b, a) and (a, b); b/x does not exist
        let report = driver.run(&args(&["b", "a", "a", "b"])).unwrap();
        assert_eq!(
            report.records[0].outcome.skip_reason(),
            Some(&SkipReason::MissingDataset {
                root: "b".into(),
                subpath: "x".into()
            })
        );
        assert_eq!(
            report.records[1].outcome.skip_reason(),
            Some(&SkipReason::FileSkipped { root: "b".into() })
        );
    }

    #[test]
    fn test_multiple_outputs_split_between_store_and_stdout() {
        let store = MemoryStore::new().with_root("f", json!({"v": [3, 1, 2]}));
        let func = FnFunction::new(
            Signature::new("bounds")
                .param(Parameter::required("values"))
                .outputs(["min", "max"]),
            |a: &Arguments| {
                let values = a.numbers("values")?;
                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                Ok(json!([number_value(min), number_value(max)]))
            },
        );
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("values", "$0/v"),
            &OutputMapping::new().map("min", "#/stats/min").map("max", "#"),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap();

        let report = driver.run(&args(&["f"])).unwrap();
        assert!(report.is_success());
        assert_eq!(store.dataset("f", "stats/min"), Some(json!(1)));
        assert_eq!(report.records[0].stdout.as_deref(), Some("3"));
    }

    #[test]
    fn test_invocation_error_is_passed_through() {
        let store = MemoryStore::new();
        let func = FnFunction::new(Signature::new("fail"), |_: &Arguments| {
            Err(InvocationError::new("division by zero"))
        });
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new(),
            &OutputMapping::new(),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap();
        let report = driver.run(&[]).unwrap();
        assert_eq!(report.failure_lines(), vec!["<source 0>: InvocationError: division by zero"]);
    }

    #[test]
    fn test_configuration_errors_surface_before_running() {
        let store = MemoryStore::new();
        let func = double(Arc::default());
        let result = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("x", "%"),
            &OutputMapping::new(),
            Options::new(),
            RunOptions::new(),
        );
        assert!(matches!(result, Err(e) if e.is_configuration()));
    }

    #[test]
    fn test_conversions_wrap_the_call() {
        let store = MemoryStore::new().with_root("f", json!({"v": ["3", "1", "2.5"]}));
        let func = FnFunction::new(
            Signature::new("bounds")
                .param(Parameter::required("values").with_preproc("list_of(float)".parse().unwrap()))
                .outputs(["min", "max"]),
            |a: &Arguments| {
                let Some(Value::Array(items)) = a.get("values") else {
                    return Err(InvocationError::new("values is not a list"));
                };
                let values: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
                if values.len() != items.len() {
                    return Err(InvocationError::new("values were not converted"));
                }
                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                Ok(json!({"min": min, "max": max}))
            },
        );
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("values", "$0/v"),
            &OutputMapping::new().map("min", "#/min").map("max", "#"),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap()
        .with_postproc("max", "int".parse().unwrap())
        .unwrap()
        .with_postproc("min", "str".parse().unwrap())
        .unwrap();

        let report = driver.run(&args(&["f"])).unwrap();
        assert!(report.is_success());
        assert_eq!(store.dataset("f", "min"), Some(json!("1.0")));
        assert_eq!(report.records[0].stdout.as_deref(), Some("3"));
        assert!(matches!(
            &report.records[0].outcome,
            ExecutionOutcome::Succeeded(value) if *value == json!(["1.0", 3])
        ));

        let store = MemoryStore::new().with_root("f", json!({"v": ["x"]}));
        let report = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("values", "$0/v"),
            &OutputMapping::new().map("min", "#/min"),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap()
        .run(&args(&["f"]))
        .unwrap();
        assert_eq!(
            report.failure_lines(),
            vec!["f: InvocationError: parameter 'values': cannot convert \"x\" to float"]
        );
        assert_eq!(store.snapshot("f"), Some(json!({"v": ["x"]})));
    }

    #[test]
    fn test_unknown_conversion_targets_are_rejected() {
        let store = MemoryStore::new();
        let func = double(Arc::default());
        let (inmap, outmap) = data_mappings();
        let driver =
            || ExecutionDriver::new(&func, &store, &inmap, &outmap, Options::new(), RunOptions::new());
        let err = driver().unwrap().with_preproc("y", Conversion::Sentence).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownParameter);
        let err = driver().unwrap().with_postproc("total", Conversion::Sentence).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::UnknownOutput);
    }

    #[test]
    fn test_first_and_last_hooks_bracket_the_run() {
        let store = MemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let func = double(Arc::clone(&calls));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (before, after) = (Arc::clone(&order), Arc::clone(&order));
        let counter = Arc::clone(&calls);
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("x", "$0"),
            &OutputMapping::new(),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap()
        .on_first(move || {
            before.lock().unwrap().push(format!("first:{}", counter.load(Ordering::SeqCst)));
            Ok(())
        })
        .on_last(move || {
            after.lock().unwrap().push("last".to_string());
            Ok(())
        });

        let report = driver.run(&args(&["1", "2"])).unwrap();
        assert!(report.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*order.lock().unwrap(), vec!["first:0", "last"]);
        assert!(report.first.is_some() && report.last.is_some());
    }

    #[test]
    fn test_failed_first_hook_runs_nothing() {
        let store = MemoryStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let func = double(Arc::clone(&calls));
        let last_ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&last_ran);
        let driver = ExecutionDriver::new(
            &func,
            &store,
            &InputMapping::new().map("x", "$0"),
            &OutputMapping::new(),
            Options::new(),
            RunOptions::new(),
        )
        .unwrap()
        .on_first(|| Err(InvocationError::new("no connection")))
        .on_last(move || {
            flag.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = driver.run(&args(&["1", "2"])).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(last_ran.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped_count(), 2);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failure_lines(), vec!["first hook: InvocationError: no connection"]);
        assert!(report.last.is_none());
    }

    #[test]
    fn test_format_stdout() {
        assert_eq!(format_stdout(&json!("a b"), ","), "a b");
        assert_eq!(format_stdout(&json!([1, "x", 2.5]), ","), "1,x,2.5");
        assert_eq!(format_stdout(&json!({"k": 1}), " "), r#"{"k":1}"#);
    }
}
