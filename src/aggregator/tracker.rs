//! Per-kind event tracker.
//!
//! One tracker exists per tracked event kind. Allocation trackers keep a
//! live-allocation index (address -> position of the most recent unmatched
//! allocation); free trackers only use the counters.

use crate::parser::{Event, EventKind, EventRef, Family};
use crate::utils::config::DuplicatePolicy;
use log::debug;
use std::collections::HashMap;

/// Events and byte totals for one event kind
#[derive(Debug, Clone)]
pub struct AllocationTracker {
    kind: EventKind,
    policy: DuplicatePolicy,
    events: Vec<Event>,
    /// address -> position in `events`
    live: HashMap<u64, usize>,

    /// Events recorded
    pub count: u64,
    pub allocated_bytes: u64,
    /// Bytes of matched allocations (original allocation size)
    pub freed_bytes: u64,
    pub matched_frees: u64,
    /// Frees that found no live allocation, including null-address frees
    pub unmatched_frees: u64,
    /// Allocations the kernel reported as failed: a null slab pointer, or a
    /// page allocation with pfn 0 or all-ones
    pub failed_allocations: u64,
    /// Live allocations displaced by a later allocation at the same address
    pub overwrites: u64,
    pub overwritten_bytes: u64,
}

impl AllocationTracker {
    pub fn new(kind: EventKind, policy: DuplicatePolicy) -> Self {
        Self {
            kind,
            policy,
            events: Vec::new(),
            live: HashMap::new(),
            count: 0,
            allocated_bytes: 0,
            freed_bytes: 0,
            matched_frees: 0,
            unmatched_frees: 0,
            failed_allocations: 0,
            overwrites: 0,
            overwritten_bytes: 0,
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// All recorded events, in log order
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, position: usize) -> Option<&Event> {
        self.events.get(position)
    }

    /// Record an allocation and make it the live entry for its address
    ///
    /// Returns the event's position, or `None` for a failed allocation,
    /// which is counted but not tracked.
    pub fn record_alloc(&mut self, event: Event) -> Option<usize> {
        if is_failed_alloc(&event) {
            debug!(
                "{}: failed allocation at line {} (address {:#x})",
                self.kind, event.line_index, event.address
            );
            self.failed_allocations = self.failed_allocations.saturating_add(1);
            return None;
        }

        let position = self.events.len();
        self.count = self.count.saturating_add(1);
        self.allocated_bytes = self.allocated_bytes.saturating_add(event.size);

        if let Some(previous) = self.live.insert(event.address, position) {
            let displaced = self.events[previous].size;
            debug!(
                "{}: address {:#x} allocated again at line {} while live since line {} ({:?})",
                self.kind, event.address, event.line_index, self.events[previous].line_index, self.policy
            );
            self.overwrites += 1;
            self.overwritten_bytes = self.overwritten_bytes.saturating_add(displaced);
        }

        self.events.push(event);
        Some(position)
    }

    /// Record a free event; returns its position
    pub fn record_free(&mut self, event: Event) -> usize {
        let position = self.events.len();
        self.count += 1;
        self.events.push(event);
        position
    }

    /// Remove and return the live allocation at `address`
    pub fn take_live(&mut self, address: u64) -> Option<usize> {
        self.live.remove(&address)
    }

    /// Mark an allocation as matched by `free`; returns the allocation size
    pub fn mark_freed(&mut self, position: usize, free: EventRef) -> u64 {
        let event = &mut self.events[position];
        event.paired = Some(free);
        self.freed_bytes = self.freed_bytes.saturating_add(event.size);
        self.matched_frees += 1;
        event.size
    }

    /// Link a recorded free to the allocation it released
    pub fn link_free(&mut self, position: usize, alloc: EventRef, alloc_size: u64) {
        self.events[position].paired = Some(alloc);
        self.freed_bytes = self.freed_bytes.saturating_add(alloc_size);
        self.matched_frees += 1;
    }

    pub fn mark_unmatched(&mut self) {
        self.unmatched_frees += 1;
    }

    /// Number of allocations still live
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Sum of sizes of allocations still live
    pub fn live_bytes(&self) -> u64 {
        self.live
            .values()
            .fold(0u64, |total, &p| total.saturating_add(self.events[p].size))
    }

    /// Whether the event at `position` is the live allocation for its address
    pub fn is_live(&self, position: usize) -> bool {
        self.events
            .get(position)
            .is_some_and(|e| self.live.get(&e.address) == Some(&position))
    }

    /// Whether the allocation at `position` counts toward
    /// [`outstanding_bytes`](Self::outstanding_bytes)
    pub fn is_outstanding(&self, position: usize) -> bool {
        match self.policy {
            DuplicatePolicy::Replace => self.is_live(position),
            DuplicatePolicy::CountAsLeak => self
                .events
                .get(position)
                .is_some_and(|e| e.kind.is_alloc() && e.paired.is_none()),
        }
    }

    /// Live allocations in log order
    pub fn live_events(&self) -> Vec<&Event> {
        let mut positions: Vec<usize> = self.live.values().copied().collect();
        positions.sort_unstable();
        positions.into_iter().map(|p| &self.events[p]).collect()
    }

    /// Bytes considered leaked or still in use at the end of the trace
    ///
    /// Under `Replace` this equals [`live_bytes`](Self::live_bytes); under
    /// `CountAsLeak` displaced allocations stay outstanding as well.
    pub fn outstanding_bytes(&self) -> u64 {
        let outstanding = self.allocated_bytes.saturating_sub(self.freed_bytes);
        match self.policy {
            DuplicatePolicy::Replace => outstanding.saturating_sub(self.overwritten_bytes),
            DuplicatePolicy::CountAsLeak => outstanding,
        }
    }
}

/// Null slab pointer, or the pfn a page allocator reports on failure
/// (`pfn=0xffffffffffffffff`, or `page=(null) pfn=0` on older kernels)
fn is_failed_alloc(event: &Event) -> bool {
    match event.kind.family() {
        Some(Family::Slab) => event.address == 0,
        Some(Family::Page) => event.address == 0 || event.address == u64::MAX,
        None => false,
    }
}
