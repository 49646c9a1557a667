pub mod report;

pub use report::{format_plan, print_plan, print_report};
