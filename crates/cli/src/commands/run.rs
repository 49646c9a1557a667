use anyhow::{Context, Result};
use comliner_core::{
    AddressableStore, ConfigLoader, Conversion, ExecutionDriver, InputMapping, JsonFileStore,
    Options, OutputMapping, OverwritePolicy, RunOptions, WrappedFunction,
};
use tracing::{debug, info};

use crate::cli::RunArgs;
use crate::display::print_report;
use crate::registry::Registry;

/// Everything needed to build a driver: the function plus its mappings and
/// options after config files and command-line flags are merged
pub struct Setup<'r> {
    pub function: &'r dyn WrappedFunction,
    pub inmap: InputMapping,
    pub outmap: OutputMapping,
    pub opts: Options,
    pub options: RunOptions,
    pub preprocs: Vec<(String, Conversion)>,
    pub postprocs: Vec<(String, Conversion)>,
}

impl<'r> Setup<'r> {
    pub fn driver<'a>(
        &'a self,
        store: &'a dyn AddressableStore,
    ) -> comliner_core::Result<ExecutionDriver<'a>> {
        let mut driver = ExecutionDriver::new(
            self.function,
            store,
            &self.inmap,
            &self.outmap,
            self.opts.clone(),
            self.options.clone(),
        )?;
        for (param, conversion) in &self.preprocs {
            driver = driver.with_preproc(param, conversion.clone())?;
        }
        for (slot, conversion) in &self.postprocs {
            driver = driver.with_postproc(slot, conversion.clone())?;
        }
        Ok(driver)
    }
}

/// Resolve the function and merge configuration layers: built-in defaults,
/// `.comliner.json` files, then command-line flags
pub fn prepare<'r>(args: &RunArgs, registry: &'r Registry) -> Result<Setup<'r>> {
    let function = registry.get(&args.function).with_context(|| {
        format!(
            "unknown function '{}' (available: {})",
            args.function,
            registry.names().join(", ")
        )
    })?;

    let file = match &args.config {
        Some(path) => ConfigLoader::load_file(path)?,
        None => ConfigLoader::load()?,
    };
    let config = file.for_function(&args.function);
    debug!("Configuration for {}: {:?}", args.function, config);

    let mut opts = config.default_options();
    opts.extend(args.opts.iter().cloned());

    let mut inmap = config.input_mapping();
    if let Some(overrides) = &args.inmap {
        inmap.apply_overrides(overrides)?;
    }
    let inmap = inmap.with_auto_positional(function.signature(), &opts)?;

    let mut outmap = config.output_mapping();
    if let Some(overrides) = &args.outmap {
        outmap.apply_overrides(overrides)?;
    }

    let mut preprocs = config.preprocs()?;
    preprocs.extend(args.preproc.iter().cloned());
    let mut postprocs = config.postprocs()?;
    postprocs.extend(args.postproc.iter().cloned());

    let mut options = config.run_options();
    if args.overwrite {
        options.overwrite = OverwritePolicy::Overwrite;
    }
    if args.keep_existing {
        options.overwrite = OverwritePolicy::Keep;
    }
    if let Some(missing) = &args.missing {
        options.omission = missing.parse()?;
    }
    if args.close_gaps {
        options.close_gaps = true;
    }
    if args.parallel {
        options.parallel = true;
    }
    if let Some(jobs) = args.jobs {
        options.threads = Some(jobs);
    }
    if let Some(mode) = &args.mode {
        options.mode = Some(mode.parse()?);
    }
    if let Some(separator) = &args.outsep {
        options.stdout_separator = separator.clone();
    }

    Ok(Setup {
        function,
        inmap,
        outmap,
        opts,
        options,
        preprocs,
        postprocs,
    })
}

pub fn run_command(args: &RunArgs) -> Result<i32> {
    let registry = Registry::builtin();
    let setup = prepare(args, &registry)?;
    let store = JsonFileStore::new();
    let driver = setup.driver(&store)?;

    let plan = driver.plan_sources(&args.args)?;
    info!(
        "Running {} over {} {} source(s)",
        args.function,
        plan.len(),
        plan.mode
    );
    let report = driver.execute(&plan);
    print_report(&report, args.timings);

    Ok(report.exit_code())
}
