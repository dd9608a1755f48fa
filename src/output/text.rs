//! Human-readable summaries printed to stdout.

use super::schema::{FamilySummary, Report};
use crate::symbols::{CallSiteSummary, ResolvedEvent};
use std::fmt::Write as _;

/// Render the headline summary of a report
pub fn render_summary(report: &Report) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Trace: {}", report.trace);
    if let Some(pid) = report.pid {
        let _ = writeln!(out, "Pid filter: {}", pid);
    }
    let _ = writeln!(
        out,
        "Lines: {} parsed of {} ({} short, {} malformed, {} untracked, {} filtered)",
        report.parse.parsed,
        report.parse.lines,
        report.parse.short_lines,
        report.parse.field_errors,
        report.parse.unknown_kinds,
        report.parse.filtered
    );
    out.push('\n');

    let _ = writeln!(
        out,
        "{:<28} {:>10} {:>14} {:>14} {:>14} {:>8} {:>10}",
        "EVENT", "COUNT", "ALLOCATED", "FREED", "OUTSTANDING", "LIVE", "UNMATCHED"
    );
    for kind in &report.kinds {
        let _ = writeln!(
            out,
            "{:<28} {:>10} {:>14} {:>14} {:>14} {:>8} {:>10}",
            kind.kind,
            kind.events,
            kind.allocated_bytes,
            kind.freed_bytes,
            kind.outstanding_bytes,
            kind.live_allocations,
            kind.unmatched_frees
        );
    }
    out.push('\n');

    for family in &report.families {
        out.push_str(&render_family(family));
    }
    let _ = writeln!(out, "Total outstanding bytes: {}", report.outstanding_bytes());

    if !report.call_sites.is_empty() {
        out.push('\n');
        out.push_str(&render_call_sites(&report.call_sites));
    }

    out
}

fn render_family(family: &FamilySummary) -> String {
    let name = match family.family {
        Some(family) => format!("{:?}", family).to_lowercase(),
        None => "all".to_string(),
    };
    let mut line = format!(
        "{} allocator: {} allocs ({} bytes), {} frees ({} bytes), {} outstanding bytes in {} live allocations",
        name,
        family.allocations,
        family.allocated_bytes,
        family.frees,
        family.freed_bytes,
        family.outstanding_bytes,
        family.live_allocations
    );
    if family.overwrites > 0 {
        let _ = write!(line, ", {} overwritten", family.overwrites);
    }
    if family.unmatched_frees > 0 {
        let _ = write!(line, ", {} unmatched frees", family.unmatched_frees);
    }
    line.push('\n');
    line
}

/// Table of the top call sites
pub fn render_call_sites(call_sites: &[CallSiteSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<40} {:<16} {:>8} {:>8} {:>14} {:>14}",
        "FUNCTION", "MODULE", "ALLOCS", "FREES", "ALLOCATED", "OUTSTANDING"
    );
    for site in call_sites {
        let module = site
            .module
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "?".to_string());
        let _ = writeln!(
            out,
            "{:<40} {:<16} {:>8} {:>8} {:>14} {:>14}",
            site.function,
            module,
            site.allocations,
            site.frees,
            site.allocated_bytes,
            site.outstanding_bytes
        );
    }
    out
}

/// One line per resolved event, used in verbose mode
pub fn render_event_line(event: &ResolvedEvent) -> String {
    match &event.module {
        Some(module) if event.is_resolved() => format!(
            "line {}: {} size={} call_site={:#x} {} [{}]",
            event.line_index,
            event.kind,
            event.size,
            event.call_site,
            event.function,
            module
        ),
        _ => format!(
            "line {}: {} size={} call_site={:#x} <unresolved>",
            event.line_index, event.kind, event.size, event.call_site
        ),
    }
}
