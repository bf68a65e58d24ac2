//! Output formatting module
//!
//! Renders live log events, task results and execution reports.

mod formatter;

pub use formatter::{write_report_to_file, OutputFormat, ResultFormatter};
