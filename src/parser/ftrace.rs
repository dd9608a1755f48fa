//! Main parser for ftrace kmem/page-allocator text output.
//!
//! Turns raw lines such as
//!
//! ```text
//! bash-1234  [001] d..1  3281.425462: mm_page_alloc: page=ffffea0004b1e000 pfn=1230712 order=0 migratetype=0 gfp_flags=GFP_KERNEL
//! bash-1234  [001] ....  3281.425470: kmalloc: call_site=ffffffff8123abcd ptr=ffff888112a3c800 bytes_req=96 bytes_alloc=128 gfp_flags=GFP_KERNEL
//! ```
//!
//! into [`Event`]s. Lines that cannot be decoded are counted and skipped.

use super::event::{order_to_bytes, Event, EventKind, Family};
use crate::utils::config::{AnalysisConfig, HeaderSkip};
use crate::utils::error::ParseFailure;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Non-semantic columns in front of the event name: task-pid, cpu, flags, timestamp
const FRAMEWORK_COLUMNS: usize = 4;

/// Placeholder the kernel prints for null pointers, dropped before parsing
const NULL_TOKEN: &str = "(null)";

// Fixed positions (after the framework columns) of the page allocator fields
const PFN_POSITION: usize = 2;
const ORDER_POSITION: usize = 3;

const PFN_KEY: &str = "pfn=";
const ORDER_KEY: &str = "order=";
const PTR_KEY: &str = "ptr=";
const CALL_SITE_KEY: &str = "call_site=";
const BYTES_ALLOC_KEY: &str = "bytes_alloc=";

/// Counters describing how the log body was consumed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Lines in the body (after the header)
    pub lines: usize,
    pub header_lines: usize,
    pub parsed: usize,
    pub short_lines: usize,
    pub field_errors: usize,
    /// Decoded lines whose event we do not track
    pub unknown_kinds: usize,
    /// Lines dropped by the pid filter
    pub filtered: usize,
}

/// Events in log order plus bookkeeping
#[derive(Debug, Clone, Default)]
pub struct ParsedTrace {
    pub events: Vec<Event>,
    pub stats: ParseStats,
}

/// Parse one trace line
///
/// **Public** - main entry point for line decoding
///
/// # Arguments
/// * `line` - Raw line from the log body
/// * `line_index` - 1-based position of the line in the log body
///
/// # Errors
/// * `ParseFailure::ShortLine` - empty line or not enough columns
/// * `ParseFailure::FieldError` - a required key/value field is missing or malformed
pub fn parse_line(line: &str, line_index: usize) -> Result<Event, ParseFailure> {
    parse_line_with_page_size(line, line_index, crate::utils::config::PAGE_SIZE)
}

/// Same as [`parse_line`] with an explicit page size for order conversion
pub fn parse_line_with_page_size(
    line: &str,
    line_index: usize,
    page_size: u64,
) -> Result<Event, ParseFailure> {
    let line = line.trim_start();
    if line.is_empty() {
        return Err(ParseFailure::ShortLine);
    }

    let tokens: Vec<&str> = line
        .split(' ')
        .filter(|t| !t.is_empty() && *t != NULL_TOKEN)
        .collect();
    if tokens.len() < FRAMEWORK_COLUMNS {
        return Err(ParseFailure::ShortLine);
    }

    let pid = task_pid(tokens[0]);
    let fields = &tokens[FRAMEWORK_COLUMNS..];
    let Some(name) = fields.first() else {
        return Err(ParseFailure::ShortLine);
    };

    let kind = EventKind::from_trace_name(name.trim_end_matches(':'));
    let mut event = Event::bare(kind, line_index);
    event.pid = pid;

    match event.kind.family() {
        Some(Family::Page) => {
            let pfn = fixed_field(fields, PFN_POSITION, PFN_KEY, 10)?;
            let order = fixed_field(fields, ORDER_POSITION, ORDER_KEY, 10)?;
            event.address = pfn;
            event.size = order_to_bytes(order, page_size);
        }
        Some(Family::Slab) => {
            event.address = keyed_field(fields, PTR_KEY, 16)?;
            event.call_site = Some(keyed_field(fields, CALL_SITE_KEY, 16)?);
            if event.kind.is_alloc() {
                event.size = keyed_field(fields, BYTES_ALLOC_KEY, 10)?;
            }
        }
        None => {}
    }

    Ok(event)
}

/// Parse a whole trace log
///
/// **Public** - used by commands to turn a capture into events
///
/// Skips the header according to `config.header_skip`, applies the pid
/// filter, and decodes every remaining line. Undecodable lines are counted in
/// the returned stats, never reported as errors.
pub fn parse_trace_log(text: &str, config: &AnalysisConfig) -> ParsedTrace {
    let lines: Vec<&str> = text.lines().collect();
    let header_lines = header_length(&lines, config.header_skip);
    let body = &lines[header_lines.min(lines.len())..];

    info!(
        "Skipping {} header lines, parsing {} trace lines",
        header_lines,
        body.len()
    );

    let mut parsed = ParsedTrace {
        events: Vec::with_capacity(body.len()),
        stats: ParseStats {
            lines: body.len(),
            header_lines: header_lines.min(lines.len()),
            ..Default::default()
        },
    };

    for (i, line) in body.iter().enumerate() {
        let line_index = i + 1;

        if let Some(wanted) = config.pid {
            let task = line.split_whitespace().next().unwrap_or_default();
            if task_pid(task) != Some(wanted) {
                parsed.stats.filtered += 1;
                continue;
            }
        }

        match parse_line_with_page_size(line, line_index, config.page_size) {
            Ok(event) => {
                if event.kind.family().is_none() {
                    parsed.stats.unknown_kinds += 1;
                }
                parsed.stats.parsed += 1;
                parsed.events.push(event);
            }
            Err(ParseFailure::ShortLine) => {
                parsed.stats.short_lines += 1;
            }
            Err(e) => {
                debug!("Skipping line {}: {}", line_index, e);
                parsed.stats.field_errors += 1;
            }
        }
    }

    debug!(
        "Parsed {} events ({} short, {} malformed, {} untracked, {} filtered)",
        parsed.stats.parsed,
        parsed.stats.short_lines,
        parsed.stats.field_errors,
        parsed.stats.unknown_kinds,
        parsed.stats.filtered
    );

    parsed
}

/// Number of header lines to drop from the front of the log
fn header_length(lines: &[&str], skip: HeaderSkip) -> usize {
    match skip {
        HeaderSkip::Lines(n) => n,
        HeaderSkip::Auto => lines
            .iter()
            .position(|line| looks_like_event_line(line))
            .unwrap_or(lines.len()),
    }
}

/// Check whether a line has the `<task>-<pid> [<cpu>] <flags> <timestamp>: <event>:` shape
///
/// **Public** - used for header auto-detection
pub fn looks_like_event_line(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() <= FRAMEWORK_COLUMNS {
        return false;
    }

    let cpu = tokens[1];
    let timestamp = tokens[3];
    let event = tokens[4];

    task_pid(tokens[0]).is_some()
        && cpu.starts_with('[')
        && cpu.ends_with(']')
        && timestamp
            .strip_suffix(':')
            .is_some_and(|ts| ts.parse::<f64>().is_ok())
        && event.len() > 1
        && event.ends_with(':')
}

/// Pid from a `<task>-<pid>` column. Task names may contain dashes.
fn task_pid(task: &str) -> Option<u32> {
    let (_, pid) = task.rsplit_once('-')?;
    pid.parse().ok()
}

/// Value of the key/value token at a fixed position
fn fixed_field(
    fields: &[&str],
    position: usize,
    key: &'static str,
    radix: u32,
) -> Result<u64, ParseFailure> {
    let token = fields
        .get(position)
        .ok_or_else(|| ParseFailure::field(key, "missing token"))?;
    value_of_key(token, key, radix)
}

/// Value of the first token carrying `key`
fn keyed_field(fields: &[&str], key: &'static str, radix: u32) -> Result<u64, ParseFailure> {
    let token = fields
        .iter()
        .find(|t| t.contains(key))
        .ok_or_else(|| ParseFailure::field(key, "not present"))?;
    value_of_key(token, key, radix)
}

/// Parse the value half of a `key=value` token
///
/// **Public** - shared helper for key/value decoding
///
/// The key is matched by substring containment. Values may carry a `0x`
/// prefix, which always means hexadecimal.
pub fn value_of_key(token: &str, key: &'static str, radix: u32) -> Result<u64, ParseFailure> {
    if !token.contains(key) {
        return Err(ParseFailure::field(key, format!("unexpected token `{}`", token)));
    }

    let value = token.split('=').nth(1).unwrap_or_default();
    if value.is_empty() {
        return Err(ParseFailure::field(key, "empty value"));
    }
    if value == NULL_TOKEN {
        return Ok(0);
    }

    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => u64::from_str_radix(value, radix),
    };
    parsed.map_err(|e| ParseFailure::field(key, format!("`{}`: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::DuplicatePolicy;

    const PAGE_ALLOC: &str = "  bash-1234  [001] d..1  3281.425462: mm_page_alloc: page=ffffea0004b1e000 pfn=1230712 order=1 migratetype=0 gfp_flags=GFP_KERNEL";
    const KMALLOC: &str = "bash-1234 [001] .... 3281.425470: kmalloc: call_site=ffffffff8123abcd ptr=ffff888112a3c800 bytes_req=96 bytes_alloc=128 gfp_flags=GFP_KERNEL";
    const KFREE: &str = "bash-1234 [001] .... 3281.425480: kfree: call_site=ffffffff8123beef ptr=ffff888112a3c800";

    #[test]
    fn test_parse_page_alloc() {
        let event = parse_line(PAGE_ALLOC, 7).unwrap();
        assert_eq!(event.kind, EventKind::PageAlloc);
        assert_eq!(event.address, 1230712);
        assert_eq!(event.size, 8192);
        assert_eq!(event.call_site, None);
        assert_eq!(event.line_index, 7);
        assert_eq!(event.pid, Some(1234));
    }

    #[test]
    fn test_parse_kmalloc() {
        let event = parse_line(KMALLOC, 1).unwrap();
        assert_eq!(event.kind, EventKind::Kmalloc);
        assert_eq!(event.address, 0xffff888112a3c800);
        assert_eq!(event.size, 128);
        assert_eq!(event.call_site, Some(0xffffffff8123abcd));
    }

    #[test]
    fn test_parse_kfree_needs_no_size() {
        let event = parse_line(KFREE, 2).unwrap();
        assert_eq!(event.kind, EventKind::Kfree);
        assert_eq!(event.address, 0xffff888112a3c800);
        assert_eq!(event.size, 0);
        assert_eq!(event.call_site, Some(0xffffffff8123beef));
    }

    #[test]
    fn test_empty_and_short_lines() {
        assert_eq!(parse_line("", 1), Err(ParseFailure::ShortLine));
        assert_eq!(parse_line("     ", 1), Err(ParseFailure::ShortLine));
        assert_eq!(parse_line("bash-1 [000] ....", 1), Err(ParseFailure::ShortLine));
        assert_eq!(
            parse_line("bash-1 [000] .... 1.0:", 1),
            Err(ParseFailure::ShortLine)
        );
    }

    #[test]
    fn test_leading_whitespace_is_stripped() {
        let event = parse_line(&format!("\t {}", KMALLOC), 3).unwrap();
        assert_eq!(event.kind, EventKind::Kmalloc);
        assert_eq!(event.pid, Some(1234));
        assert_eq!(event.size, 128);

        assert_eq!(parse_line(" \t ", 1), Err(ParseFailure::ShortLine));
    }

    #[test]
    fn test_null_tokens_are_dropped() {
        let line = "bash-1 [000] .... 1.0: kfree: call_site=ffffffff81000010 (null) ptr=0";
        let event = parse_line(line, 1).unwrap();
        assert_eq!(event.address, 0);

        let line = "bash-1 [000] .... 1.0: kfree: call_site=ffffffff81000010 ptr=(null)";
        assert_eq!(parse_line(line, 1).unwrap().address, 0);
    }

    #[test]
    fn test_unknown_kind_is_minimal() {
        let line = "bash-1 [000] .... 1.0: sched_switch: prev_comm=bash prev_pid=1";
        let event = parse_line(line, 3).unwrap();
        assert_eq!(event.kind, EventKind::Other("sched_switch".to_string()));
        assert_eq!(event.address, 0);
        assert_eq!(event.line_index, 3);
    }

    #[test]
    fn test_page_fields_are_positional() {
        // order and pfn swapped
        let line = "bash-1 [000] .... 1.0: mm_page_free: page=ffffea0000000000 order=0 pfn=10";
        assert!(matches!(
            parse_line(line, 1),
            Err(ParseFailure::FieldError { key: "pfn=", .. })
        ));
    }

    #[test]
    fn test_missing_bytes_alloc() {
        let line = "bash-1 [000] .... 1.0: kmalloc: call_site=ffffffff81000010 ptr=ffff888000001000 bytes_req=8";
        assert!(matches!(
            parse_line(line, 1),
            Err(ParseFailure::FieldError { key: "bytes_alloc=", .. })
        ));
    }

    #[test]
    fn test_symbolic_call_site_is_field_error() {
        let line = "bash-1 [000] .... 1.0: kfree: call_site=__kmalloc+0x12/0x40 ptr=ffff888000001000";
        assert!(matches!(
            parse_line(line, 1),
            Err(ParseFailure::FieldError { key: "call_site=", .. })
        ));
    }

    #[test]
    fn test_value_of_key() {
        assert_eq!(value_of_key("order=3", ORDER_KEY, 10), Ok(3));
        assert_eq!(value_of_key("pfn=0x1f", PFN_KEY, 10), Ok(0x1f));
        assert_eq!(value_of_key("ptr=ffff0000", PTR_KEY, 16), Ok(0xffff0000));
        assert!(value_of_key("order=", ORDER_KEY, 10).is_err());
        assert!(value_of_key("order", ORDER_KEY, 10).is_err());
        assert!(value_of_key("pfn=12", ORDER_KEY, 10).is_err());
        assert!(value_of_key("order=abc", ORDER_KEY, 10).is_err());
    }

    #[test]
    fn test_looks_like_event_line() {
        assert!(looks_like_event_line(KMALLOC));
        assert!(looks_like_event_line(PAGE_ALLOC));
        assert!(!looks_like_event_line("# tracer: nop"));
        assert!(!looks_like_event_line("#           TASK-PID     CPU#  ||||   TIMESTAMP  FUNCTION"));
        assert!(!looks_like_event_line(""));
    }

    #[test]
    fn test_task_pid() {
        assert_eq!(task_pid("bash-1234"), Some(1234));
        assert_eq!(task_pid("kworker/u16:2-mm-89"), Some(89));
        assert_eq!(task_pid("<idle>-0"), Some(0));
        assert_eq!(task_pid("bash"), None);
    }

    fn sample_log() -> String {
        let mut text = String::from("# tracer: nop\n#\n# entries-in-buffer/entries-written: 3/3   #P:4\n#\n");
        text.push_str(PAGE_ALLOC);
        text.push('\n');
        text.push_str("other-99 [002] .... 3281.5: kmalloc: call_site=ffffffff81000000 ptr=ffff888000002000 bytes_req=8 bytes_alloc=8\n");
        text.push_str("garbage\n");
        text.push_str(KMALLOC);
        text.push('\n');
        text
    }

    #[test]
    fn test_parse_trace_log_auto_header() {
        let parsed = parse_trace_log(&sample_log(), &AnalysisConfig::default());
        assert_eq!(parsed.stats.header_lines, 4);
        assert_eq!(parsed.stats.lines, 4);
        assert_eq!(parsed.stats.parsed, 3);
        assert_eq!(parsed.stats.short_lines, 1);
        assert_eq!(parsed.events[0].line_index, 1);
        assert_eq!(parsed.events[2].line_index, 4);
    }

    #[test]
    fn test_parse_trace_log_fixed_header() {
        let config = AnalysisConfig::default().with_header_skip(HeaderSkip::Lines(5));
        let parsed = parse_trace_log(&sample_log(), &config);
        assert_eq!(parsed.stats.header_lines, 5);
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.events[0].kind, EventKind::Kmalloc);
    }

    #[test]
    fn test_parse_trace_log_header_longer_than_log() {
        let config = AnalysisConfig::default().with_header_skip(HeaderSkip::Lines(100));
        let parsed = parse_trace_log(&sample_log(), &config);
        assert!(parsed.events.is_empty());
        assert_eq!(parsed.stats.lines, 0);
    }

    #[test]
    fn test_parse_trace_log_pid_filter() {
        let config = AnalysisConfig::default()
            .with_pid(Some(99))
            .with_duplicate_policy(DuplicatePolicy::Replace);
        let parsed = parse_trace_log(&sample_log(), &config);
        assert_eq!(parsed.events.len(), 1);
        assert_eq!(parsed.events[0].pid, Some(99));
        assert_eq!(parsed.stats.filtered, 3);
    }
}
