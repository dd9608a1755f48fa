//! Analyze command implementation.
//!
//! The analyze command:
//! 1. Reads the trace log
//! 2. Parses it into events
//! 3. Correlates allocations with frees
//! 4. Optionally resolves call sites against kernel symbols
//! 5. Prints the summary and writes the JSON report

use super::models::AnalyzeArgs;
use crate::aggregator::correlate;
use crate::output::{render_event_line, render_summary, write_report, Report};
use crate::parser::parse_trace_log;
use crate::symbols::{
    load_kernel_symbols, resolve_events, summarize_call_sites, BinaryInspector, SystemInspector,
};
use crate::utils::error::TraceError;
use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;
use std::time::Instant;

/// Execute the analyze command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * Unreadable trace log
/// * Unreadable symbol table or kernel image (when symbols are requested)
/// * Report write failures
pub fn execute_analyze(args: AnalyzeArgs) -> Result<Report> {
    let inspector = SystemInspector::new(args.reader);
    execute_analyze_with(args, &inspector)
}

/// Same as [`execute_analyze`] with a caller-supplied binary inspector
pub fn execute_analyze_with(args: AnalyzeArgs, inspector: &dyn BinaryInspector) -> Result<Report> {
    let start_time = Instant::now();
    let config = args.analysis_config();

    info!("Analyzing trace: {}", args.trace.display());

    info!("Step 1/5: Reading trace log...");
    let text = read_trace(&args.trace).context("Failed to load trace log")?;

    info!("Step 2/5: Parsing events...");
    let parsed = parse_trace_log(&text, &config);
    debug!("Parse stats: {:?}", parsed.stats);

    info!("Step 3/5: Correlating allocations and frees...");
    let memory = correlate(parsed.events, config.duplicate_policy);

    let mut call_sites = Vec::new();
    let mut event_lines = Vec::new();
    if args.wants_symbols() {
        info!("Step 4/5: Resolving call sites...");
        let symbols = load_kernel_symbols(&args.symbol_sources(), inspector)
            .context("Failed to build kernel symbol index")?;

        call_sites = summarize_call_sites(&memory, &symbols);
        call_sites.truncate(args.top_call_sites);

        if args.verbose {
            event_lines = resolve_events(&memory, &symbols)
                .iter()
                .map(render_event_line)
                .collect();
        }
    } else {
        info!("Step 4/5: Skipping call-site resolution (no symbols requested)");
        if args.verbose {
            event_lines = memory
                .live_events()
                .into_iter()
                .map(|e| {
                    format!(
                        "line {}: {} live address={:#x} size={}",
                        e.line_index, e.kind, e.address, e.size
                    )
                })
                .collect();
        }
    }

    info!("Step 5/5: Writing output...");
    let report = Report::build(
        args.trace.display().to_string(),
        args.pid,
        parsed.stats,
        &memory,
        call_sites,
    );

    for line in &event_lines {
        println!("{}", line);
    }
    if !event_lines.is_empty() {
        println!();
    }
    print!("{}", render_summary(&report));

    if let Some(output_json) = &args.output_json {
        write_report(&report, output_json).context("Failed to write report JSON")?;
        info!("✓ Report written to: {}", output_json.display());
    }

    info!(
        "Analysis completed in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(report)
}

fn read_trace(path: &Path) -> Result<String, TraceError> {
    std::fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate analyze arguments before running anything
///
/// **Public** - called from main.rs
pub fn validate_args(args: &AnalyzeArgs) -> Result<()> {
    if args.trace.as_os_str().is_empty() {
        anyhow::bail!("Trace path cannot be empty");
    }

    if args.page_size == 0 {
        anyhow::bail!("page_size must be greater than 0");
    }

    if args.top_call_sites == 0 {
        anyhow::bail!("top must be greater than 0");
    }

    if let Some(kernel_elf) = &args.kernel_elf {
        if !kernel_elf.exists() {
            anyhow::bail!("Kernel image not found: {}", kernel_elf.display());
        }
    }

    Ok(())
}
