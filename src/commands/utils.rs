use crate::output::read_report;
use crate::utils::config::REPORT_SCHEMA_VERSION;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Validate a report JSON file
pub fn validate_report_file(file_path: PathBuf) -> Result<()> {
    println!("Validating report: {}", file_path.display());

    let report = read_report(&file_path)
        .with_context(|| format!("Invalid report {}", file_path.display()))?;

    println!("✓ Valid report JSON");
    println!("  Version: {}", report.version);
    println!("  Generated: {}", report.generated_at);
    println!("  Trace: {}", report.trace);
    println!("  Events parsed: {}", report.parse.parsed);
    println!("  Outstanding bytes: {}", report.outstanding_bytes());
    println!("  Call sites: {}", report.call_sites.len());

    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("kmem-trace v{}", env!("CARGO_PKG_VERSION"));
    println!("Report Schema: v{}", REPORT_SCHEMA_VERSION);
    println!();
    println!("Kernel memory ftrace post-processor: pairs page and slab allocations");
    println!("with their frees and attributes leaks to kernel functions.");
}
