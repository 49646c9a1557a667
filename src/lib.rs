//! comliner - turn plain functions into command-line tools
//!
//! Facade over [`comliner_core`]; see that crate for the engine itself.
pub use comliner_core::*;
