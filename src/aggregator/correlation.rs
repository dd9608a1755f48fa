//! Replay of parsed events into per-kind trackers.
//!
//! Events are replayed in log order. Each allocation becomes the live entry
//! for its address; each free is matched against the live entries of its
//! candidate allocation kinds (see [`EventKind::free_candidates`]). The page
//! and slab families are tracked independently and never cross-match.

use super::tracker::AllocationTracker;
use crate::parser::{Event, EventKind, EventRef, Family};
use crate::utils::config::DuplicatePolicy;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Totals for one allocator family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyTotals {
    pub family: Option<Family>,
    pub allocations: u64,
    pub frees: u64,
    pub allocated_bytes: u64,
    pub freed_bytes: u64,
    pub outstanding_bytes: u64,
    pub live_allocations: u64,
    pub unmatched_frees: u64,
    pub overwrites: u64,
}

/// All trackers for one trace
#[derive(Debug, Clone)]
pub struct MemoryEvents {
    policy: DuplicatePolicy,
    trackers: HashMap<EventKind, AllocationTracker>,
    /// Events of kinds we do not track
    pub ignored: u64,
}

impl MemoryEvents {
    pub fn new(policy: DuplicatePolicy) -> Self {
        let trackers = EventKind::TRACKED
            .iter()
            .map(|kind| (kind.clone(), AllocationTracker::new(kind.clone(), policy)))
            .collect();
        Self {
            policy,
            trackers,
            ignored: 0,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Tracker for a kind; `None` for untracked kinds
    pub fn tracker(&self, kind: &EventKind) -> Option<&AllocationTracker> {
        self.trackers.get(kind)
    }

    /// Trackers in report order
    pub fn trackers(&self) -> impl Iterator<Item = &AllocationTracker> {
        EventKind::TRACKED
            .iter()
            .filter_map(move |kind| self.trackers.get(kind))
    }

    /// Feed one event
    pub fn record(&mut self, event: Event) {
        if event.kind.family().is_none() {
            self.ignored += 1;
            return;
        }

        if event.kind.is_alloc() {
            self.tracker_mut(&event.kind).record_alloc(event);
        } else {
            self.record_free(event);
        }
    }

    fn record_free(&mut self, event: Event) {
        let kind = event.kind.clone();
        let address = event.address;
        let line_index = event.line_index;
        let free_position = self.tracker_mut(&kind).record_free(event);

        // A null free is valid kernel behavior and never touches byte totals
        if address == 0 {
            self.tracker_mut(&kind).mark_unmatched();
            return;
        }

        for candidate in kind.free_candidates() {
            let alloc_tracker = self.tracker_mut(candidate);
            let Some(alloc_position) = alloc_tracker.take_live(address) else {
                continue;
            };

            let size = alloc_tracker.mark_freed(
                alloc_position,
                EventRef {
                    kind: kind.clone(),
                    position: free_position,
                },
            );
            self.tracker_mut(&kind).link_free(
                free_position,
                EventRef {
                    kind: candidate.clone(),
                    position: alloc_position,
                },
                size,
            );
            return;
        }

        debug!(
            "{} at line {}: no live allocation for {:#x}",
            kind, line_index, address
        );
        self.tracker_mut(&kind).mark_unmatched();
    }

    fn tracker_mut(&mut self, kind: &EventKind) -> &mut AllocationTracker {
        let policy = self.policy;
        self.trackers
            .entry(kind.clone())
            .or_insert_with(|| AllocationTracker::new(kind.clone(), policy))
    }

    /// Follow an event's pairing link
    pub fn paired_event(&self, event: &Event) -> Option<&Event> {
        let link = event.paired.as_ref()?;
        self.trackers.get(&link.kind)?.event(link.position)
    }

    /// Totals across every tracker of a family
    pub fn family_totals(&self, family: Family) -> FamilyTotals {
        let mut totals = FamilyTotals {
            family: Some(family),
            ..Default::default()
        };

        for tracker in self.trackers().filter(|t| t.kind().family() == Some(family)) {
            if tracker.kind().is_alloc() {
                totals.allocations += tracker.count;
                totals.allocated_bytes = totals.allocated_bytes.saturating_add(tracker.allocated_bytes);
                totals.freed_bytes = totals.freed_bytes.saturating_add(tracker.freed_bytes);
                totals.outstanding_bytes =
                    totals.outstanding_bytes.saturating_add(tracker.outstanding_bytes());
                totals.live_allocations += tracker.live_count() as u64;
                totals.overwrites += tracker.overwrites;
            } else {
                totals.frees += tracker.count;
                totals.unmatched_frees += tracker.unmatched_frees;
            }
        }

        totals
    }

    /// Live allocations of every kind, in log order
    pub fn live_events(&self) -> Vec<&Event> {
        let mut live: Vec<&Event> = self
            .trackers()
            .filter(|t| t.kind().is_alloc())
            .flat_map(|t| t.live_events())
            .collect();
        live.sort_by_key(|e| e.line_index);
        live
    }
}

/// Replay events into fresh trackers
///
/// **Public** - main entry point for correlation
pub fn correlate(events: impl IntoIterator<Item = Event>, policy: DuplicatePolicy) -> MemoryEvents {
    let mut memory = MemoryEvents::new(policy);
    for event in events {
        memory.record(event);
    }
    debug!(
        "Correlated events: {} ignored, {} live allocations",
        memory.ignored,
        memory.live_events().len()
    );
    memory
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, address: u64, size: u64, line: usize) -> Event {
        Event {
            kind,
            address,
            size,
            call_site: None,
            line_index: line,
            pid: None,
            paired: None,
        }
    }

    #[test]
    fn test_alloc_then_free_balances() {
        let memory = correlate(
            vec![
                event(EventKind::PageAlloc, 100, 8192, 1),
                event(EventKind::PageFreeBatched, 100, 4096, 2),
            ],
            DuplicatePolicy::Replace,
        );

        let alloc = memory.tracker(&EventKind::PageAlloc).unwrap();
        assert_eq!(alloc.allocated_bytes, 8192);
        assert_eq!(alloc.freed_bytes, 8192);
        assert_eq!(alloc.outstanding_bytes(), 0);

        // Free totals use the allocation's size, not the free line's
        let free = memory.tracker(&EventKind::PageFreeBatched).unwrap();
        assert_eq!(free.freed_bytes, 8192);
        assert_eq!(free.matched_frees, 1);
    }

    #[test]
    fn test_pairing_links_both_ways() {
        let memory = correlate(
            vec![
                event(EventKind::Kmalloc, 0x1000, 64, 1),
                event(EventKind::Kfree, 0x1000, 0, 2),
            ],
            DuplicatePolicy::Replace,
        );

        let alloc = &memory.tracker(&EventKind::Kmalloc).unwrap().events()[0];
        let free = memory.paired_event(alloc).unwrap();
        assert_eq!(free.kind, EventKind::Kfree);
        assert_eq!(free.line_index, 2);
        assert_eq!(memory.paired_event(free).unwrap().line_index, 1);
    }

    #[test]
    fn test_null_free_is_unmatched() {
        let memory = correlate(
            vec![
                event(EventKind::Kmalloc, 0x1000, 64, 1),
                event(EventKind::Kfree, 0, 0, 2),
            ],
            DuplicatePolicy::Replace,
        );
        let free = memory.tracker(&EventKind::Kfree).unwrap();
        assert_eq!(free.unmatched_frees, 1);
        assert_eq!(free.freed_bytes, 0);
        assert_eq!(memory.tracker(&EventKind::Kmalloc).unwrap().outstanding_bytes(), 64);
    }

    #[test]
    fn test_free_without_alloc_is_unmatched() {
        let memory = correlate(
            vec![event(EventKind::KmemCacheFree, 0x1000, 0, 1)],
            DuplicatePolicy::Replace,
        );
        let free = memory.tracker(&EventKind::KmemCacheFree).unwrap();
        assert_eq!(free.count, 1);
        assert_eq!(free.unmatched_frees, 1);
    }

    #[test]
    fn test_kfree_falls_through_to_node() {
        let memory = correlate(
            vec![
                event(EventKind::KmallocNode, 0x1000, 256, 1),
                event(EventKind::Kfree, 0x1000, 0, 2),
            ],
            DuplicatePolicy::Replace,
        );
        let node = memory.tracker(&EventKind::KmallocNode).unwrap();
        assert_eq!(node.freed_bytes, 256);
        assert_eq!(node.live_count(), 0);
    }

    #[test]
    fn test_kfree_prefers_plain_kmalloc() {
        let memory = correlate(
            vec![
                event(EventKind::KmallocNode, 0x1000, 256, 1),
                event(EventKind::Kmalloc, 0x1000, 64, 2),
                event(EventKind::Kfree, 0x1000, 0, 3),
            ],
            DuplicatePolicy::Replace,
        );
        assert_eq!(memory.tracker(&EventKind::Kmalloc).unwrap().freed_bytes, 64);
        assert_eq!(memory.tracker(&EventKind::KmallocNode).unwrap().live_count(), 1);
    }

    #[test]
    fn test_families_never_cross_match() {
        let memory = correlate(
            vec![
                event(EventKind::PageAlloc, 0x1000, 4096, 1),
                event(EventKind::Kfree, 0x1000, 0, 2),
            ],
            DuplicatePolicy::Replace,
        );
        assert_eq!(memory.tracker(&EventKind::PageAlloc).unwrap().live_count(), 1);
        assert_eq!(memory.tracker(&EventKind::Kfree).unwrap().unmatched_frees, 1);
    }

    #[test]
    fn test_kmem_cache_free_does_not_match_kmalloc() {
        let memory = correlate(
            vec![
                event(EventKind::Kmalloc, 0x1000, 64, 1),
                event(EventKind::KmemCacheFree, 0x1000, 0, 2),
            ],
            DuplicatePolicy::Replace,
        );
        assert_eq!(memory.tracker(&EventKind::Kmalloc).unwrap().live_count(), 1);
    }

    #[test]
    fn test_readdress_after_free_is_live_again() {
        let memory = correlate(
            vec![
                event(EventKind::Kmalloc, 0x1000, 64, 1),
                event(EventKind::Kfree, 0x1000, 0, 2),
                event(EventKind::Kmalloc, 0x1000, 32, 3),
            ],
            DuplicatePolicy::Replace,
        );
        let alloc = memory.tracker(&EventKind::Kmalloc).unwrap();
        assert_eq!(alloc.overwrites, 0);
        assert_eq!(alloc.outstanding_bytes(), 32);
        assert_eq!(memory.live_events()[0].line_index, 3);
    }

    #[test]
    fn test_family_totals() {
        let memory = correlate(
            vec![
                event(EventKind::Kmalloc, 0x1000, 64, 1),
                event(EventKind::KmemCacheAlloc, 0x2000, 32, 2),
                event(EventKind::Kfree, 0x1000, 0, 3),
                event(EventKind::Kfree, 0x9000, 0, 4),
                event(EventKind::PageAlloc, 7, 4096, 5),
            ],
            DuplicatePolicy::Replace,
        );

        let slab = memory.family_totals(Family::Slab);
        assert_eq!(slab.allocations, 2);
        assert_eq!(slab.frees, 2);
        assert_eq!(slab.allocated_bytes, 96);
        assert_eq!(slab.freed_bytes, 64);
        assert_eq!(slab.outstanding_bytes, 32);
        assert_eq!(slab.unmatched_frees, 1);

        let page = memory.family_totals(Family::Page);
        assert_eq!(page.outstanding_bytes, 4096);
        assert_eq!(page.live_allocations, 1);
    }

    #[test]
    fn test_untracked_kinds_are_ignored() {
        let memory = correlate(
            vec![Event::bare(EventKind::Other("sched_switch".to_string()), 1)],
            DuplicatePolicy::Replace,
        );
        assert_eq!(memory.ignored, 1);
        assert!(memory.live_events().is_empty());
    }
}
