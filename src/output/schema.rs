//! JSON report schema.
//!
//! Defines the structure of report files written to disk. The schema is
//! versioned so readers can reject reports they do not understand.

use crate::aggregator::{AllocationTracker, FamilyTotals, MemoryEvents};
use crate::parser::{Family, ParseStats};
use crate::symbols::CallSiteSummary;
use crate::utils::config::REPORT_SCHEMA_VERSION;
use serde::{Deserialize, Serialize};

/// Top-level report structure written to JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version for compatibility checking
    pub version: String,

    /// RFC 3339 timestamp of when the report was generated
    pub generated_at: String,

    /// Trace log that was analyzed
    pub trace: String,

    /// Pid filter applied while parsing, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    pub parse: ParseStats,

    /// One entry per tracked event kind, in report order
    pub kinds: Vec<KindSummary>,

    /// Page then slab totals
    pub families: Vec<FamilySummary>,

    /// Functions ranked by outstanding bytes (empty without symbols)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_sites: Vec<CallSiteSummary>,
}

/// Counters of one event kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    /// Trace event name, e.g. `kmalloc`
    pub kind: String,
    pub events: u64,
    pub allocated_bytes: u64,
    pub freed_bytes: u64,
    pub outstanding_bytes: u64,
    pub live_allocations: u64,
    pub unmatched_frees: u64,
    pub failed_allocations: u64,
    pub overwrites: u64,
}

impl From<&AllocationTracker> for KindSummary {
    fn from(tracker: &AllocationTracker) -> Self {
        let is_alloc = tracker.kind().is_alloc();
        Self {
            kind: tracker.kind().trace_name().to_string(),
            events: tracker.count,
            allocated_bytes: tracker.allocated_bytes,
            freed_bytes: tracker.freed_bytes,
            outstanding_bytes: if is_alloc { tracker.outstanding_bytes() } else { 0 },
            live_allocations: tracker.live_count() as u64,
            unmatched_frees: tracker.unmatched_frees,
            failed_allocations: tracker.failed_allocations,
            overwrites: tracker.overwrites,
        }
    }
}

/// Totals of one allocator family
pub type FamilySummary = FamilyTotals;

impl Report {
    /// Assemble a report from correlated events
    ///
    /// **Public** - used by the analyze command
    pub fn build(
        trace: impl Into<String>,
        pid: Option<u32>,
        parse: ParseStats,
        memory: &MemoryEvents,
        call_sites: Vec<CallSiteSummary>,
    ) -> Self {
        Self {
            version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            trace: trace.into(),
            pid,
            parse,
            kinds: memory.trackers().map(KindSummary::from).collect(),
            families: [Family::Page, Family::Slab]
                .into_iter()
                .map(|family| memory.family_totals(family))
                .collect(),
            call_sites,
        }
    }

    /// Outstanding bytes across all families
    pub fn outstanding_bytes(&self) -> u64 {
        self.families
            .iter()
            .fold(0u64, |total, f| total.saturating_add(f.outstanding_bytes))
    }

    pub fn kind(&self, name: &str) -> Option<&KindSummary> {
        self.kinds.iter().find(|k| k.kind == name)
    }
}
