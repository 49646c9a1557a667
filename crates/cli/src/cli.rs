use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use comliner_core::Conversion;
use serde_json::Value;
use std::path::PathBuf;

use crate::commands::{info_command, init_command, list_command, run_command};
use crate::utils::{parse_conversion, parse_key_value};

#[derive(Parser, Debug)]
#[command(name = "comliner")]
#[command(version, about, long_about = None, propagate_version = true)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a function over the given arguments
    #[command(visible_alias = "r")]
    Run(RunArgs),
    /// Show the call plan, output plan and sources without running anything
    #[command(visible_alias = "i")]
    Info(RunArgs),
    /// List the available functions
    #[command(visible_alias = "ls")]
    List,
    /// Write a configuration skeleton for a function
    Init {
        /// Function to configure
        function: String,

        /// Directory to write the configuration to (defaults to the current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Replace an existing configuration for the function
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments shared by `run` and `info`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Function to invoke
    pub function: String,

    /// Positional arguments, usually store roots (files)
    pub args: Vec<String>,

    /// Option value passed to the function (repeatable). Also satisfies a
    /// required parameter of the same name, which then takes no argument
    #[arg(short = 'o', long = "opt", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub opts: Vec<(String, Value)>,

    /// Modify the input mapping (e.g. x=$0/raw,factor=3)
    #[arg(long, value_name = "MAPPINGS")]
    pub inmap: Option<String>,

    /// Modify the output mapping (e.g. result=$0/out; slot=null removes an entry)
    #[arg(long, value_name = "MAPPINGS")]
    pub outmap: Option<String>,

    /// Convert a parameter before the call (repeatable, e.g. values=list_of(float))
    #[arg(long, value_name = "NAME=CONVERSION", value_parser = parse_conversion)]
    pub preproc: Vec<(String, Conversion)>,

    /// Convert an output slot after the call (repeatable, e.g. result=int)
    #[arg(long, value_name = "SLOT=CONVERSION", value_parser = parse_conversion)]
    pub postproc: Vec<(String, Conversion)>,

    /// Configuration file to use instead of discovering .comliner.json
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overwrite existing output datasets
    #[arg(short = 'O', long, conflicts_with = "keep_existing")]
    pub overwrite: bool,

    /// Leave existing output datasets untouched
    #[arg(long)]
    pub keep_existing: bool,

    /// What to do about missing input datasets (fail, omit, skip, skip-file)
    #[arg(short = 'M', long, value_name = "POLICY")]
    pub missing: Option<String>,

    /// Skip sources whose outputs all exist already
    #[arg(short = 'G', long)]
    pub close_gaps: bool,

    /// Run independent sources in parallel
    #[arg(short = 'P', long)]
    pub parallel: bool,

    /// Number of worker threads for --parallel
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Force the execution mode (dependent, independent)
    #[arg(long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Print per-source timings to stderr
    #[arg(short = 'T', long)]
    pub timings: bool,

    /// Separator between values printed on one line
    #[arg(long, value_name = "SEP")]
    pub outsep: Option<String>,
}

impl Commands {
    /// Execute the command, returning the process exit status
    pub fn execute(self) -> Result<i32> {
        match self {
            Commands::Run(args) => run_command(&args),
            Commands::Info(args) => info_command(&args),
            Commands::List => list_command(),
            Commands::Init {
                function,
                cwd,
                force,
            } => init_command(&function, cwd.as_deref(), force),
        }
    }
}
