pub mod parser;

pub use parser::{parse_conversion, parse_key_value};
