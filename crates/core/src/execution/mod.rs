//! Iterating a wrapped function over its sources

pub mod driver;
pub mod options;
pub(crate) mod scheduler;
pub mod sources;

pub use driver::{ExecutionDriver, format_stdout};
pub use options::{ExecutionMode, OverwritePolicy, RunOptions};
pub use sources::{Source, SourcePlan, plan_sources};
