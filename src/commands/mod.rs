//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod analyze;
pub mod models;
pub mod symbols;
pub mod utils;

// Re-export main command functions
pub use analyze::{execute_analyze, execute_analyze_with, validate_args};
pub use models::{AnalyzeArgs, SymbolsArgs};
pub use symbols::{dump_symbols, execute_symbols};
pub use utils::{display_version, validate_report_file};
