//! Mapping strings and mapping configuration

pub mod config;
pub mod spec;

pub use config::{InputMapping, OutputMapping, parse_override_value};
pub use spec::{MappingSpec, RESERVED_PREFIXES};
