//! Report writers.
//!
//! This module handles everything that leaves the process:
//! - JSON reports (schema, writer and reader)
//! - Text summaries for stdout

pub mod json;
pub mod schema;
pub mod text;

// Re-export main functions
pub use json::{read_report, report_to_string, write_report};
pub use schema::{FamilySummary, KindSummary, Report};
pub use text::{render_call_sites, render_event_line, render_summary};
