//! comliner-core - turn a function into a command-line tool
//!
//! This crate provides:
//! - A small grammar of mapping strings binding parameters to positional
//!   arguments, datasets inside addressable stores, options and literals
//! - Call and output plans derived once from a function's declared signature
//! - An execution driver iterating the function over its sources, with
//!   gap-closing, omission and overwrite policies and optional parallelism
//! - Value conversions around each call and hooks around each run
//! - Reference stores (in memory, JSON files) and tool configuration
pub mod config;
pub mod convert;
pub mod error;
pub mod execution;
pub mod mapping;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod signature;
pub mod store;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{Error, ErrorKind, Result};

pub use config::{ConfigFile, ConfigLoader, ToolConfig};
pub use convert::{Conversion, ValueType};
pub use execution::{
    ExecutionDriver, ExecutionMode, OverwritePolicy, RunOptions, Source, SourcePlan, plan_sources,
};
pub use mapping::{InputMapping, MappingSpec, OutputMapping};
pub use plan::{Binding, CallPlan, Destination, OutputPlan};
pub use report::{
    ExecutionOutcome, ExecutionReport, HookFailure, HookStage, IterationRecord, IterationTimings,
    SkipReason,
};
pub use resolver::{ExecutionContext, OmissionPolicy, Options, Resolved, resolve};
pub use signature::{
    Arguments, FnFunction, InvocationError, Parameter, Signature, WrappedFunction, number_value,
};
pub use store::{AddressableStore, JsonFileStore, MemoryStore, OpenMode, StoreError, StoreHandle};
