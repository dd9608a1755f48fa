//! Typed memory events decoded from trace lines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Allocator an event belongs to. Families never cross-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Page,
    Slab,
}

/// Kind of trace event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    PageAlloc,
    PageAllocZoneLocked,
    PageFree,
    PageFreeBatched,
    Kmalloc,
    KmallocNode,
    KmemCacheAlloc,
    KmemCacheAllocNode,
    Kfree,
    KmemCacheFree,
    /// Any event name we do not track
    Other(String),
}

impl EventKind {
    /// Every tracked kind, in report order
    pub const TRACKED: &'static [EventKind] = &[
        EventKind::PageAlloc,
        EventKind::PageAllocZoneLocked,
        EventKind::PageFree,
        EventKind::PageFreeBatched,
        EventKind::Kmalloc,
        EventKind::KmallocNode,
        EventKind::KmemCacheAlloc,
        EventKind::KmemCacheAllocNode,
        EventKind::Kfree,
        EventKind::KmemCacheFree,
    ];

    /// Map a trace event name (without the trailing colon)
    pub fn from_trace_name(name: &str) -> Self {
        match name {
            "mm_page_alloc" => Self::PageAlloc,
            "mm_page_alloc_zone_locked" => Self::PageAllocZoneLocked,
            "mm_page_free" => Self::PageFree,
            "mm_page_free_batched" => Self::PageFreeBatched,
            "kmalloc" => Self::Kmalloc,
            "kmalloc_node" => Self::KmallocNode,
            "kmem_cache_alloc" => Self::KmemCacheAlloc,
            "kmem_cache_alloc_node" => Self::KmemCacheAllocNode,
            "kfree" => Self::Kfree,
            "kmem_cache_free" => Self::KmemCacheFree,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn trace_name(&self) -> &str {
        match self {
            Self::PageAlloc => "mm_page_alloc",
            Self::PageAllocZoneLocked => "mm_page_alloc_zone_locked",
            Self::PageFree => "mm_page_free",
            Self::PageFreeBatched => "mm_page_free_batched",
            Self::Kmalloc => "kmalloc",
            Self::KmallocNode => "kmalloc_node",
            Self::KmemCacheAlloc => "kmem_cache_alloc",
            Self::KmemCacheAllocNode => "kmem_cache_alloc_node",
            Self::Kfree => "kfree",
            Self::KmemCacheFree => "kmem_cache_free",
            Self::Other(name) => name,
        }
    }

    /// `None` for untracked kinds
    pub fn family(&self) -> Option<Family> {
        match self {
            Self::PageAlloc | Self::PageAllocZoneLocked | Self::PageFree | Self::PageFreeBatched => {
                Some(Family::Page)
            }
            Self::Kmalloc
            | Self::KmallocNode
            | Self::KmemCacheAlloc
            | Self::KmemCacheAllocNode
            | Self::Kfree
            | Self::KmemCacheFree => Some(Family::Slab),
            Self::Other(_) => None,
        }
    }

    pub fn is_alloc(&self) -> bool {
        matches!(
            self,
            Self::PageAlloc
                | Self::PageAllocZoneLocked
                | Self::Kmalloc
                | Self::KmallocNode
                | Self::KmemCacheAlloc
                | Self::KmemCacheAllocNode
        )
    }

    pub fn is_free(&self) -> bool {
        matches!(
            self,
            Self::PageFree | Self::PageFreeBatched | Self::Kfree | Self::KmemCacheFree
        )
    }

    /// Allocation kinds a free of this kind may pair with, tried in order.
    ///
    /// Plain and node-local allocations are interchangeable from the
    /// allocator's point of view, so a free falls through to the node variant.
    pub fn free_candidates(&self) -> &'static [EventKind] {
        match self {
            Self::PageFree | Self::PageFreeBatched => PAGE_FREE_CANDIDATES,
            Self::Kfree => KFREE_CANDIDATES,
            Self::KmemCacheFree => CACHE_FREE_CANDIDATES,
            _ => &[],
        }
    }
}

const PAGE_FREE_CANDIDATES: &[EventKind] = &[EventKind::PageAlloc, EventKind::PageAllocZoneLocked];
const KFREE_CANDIDATES: &[EventKind] = &[EventKind::Kmalloc, EventKind::KmallocNode];
const CACHE_FREE_CANDIDATES: &[EventKind] =
    &[EventKind::KmemCacheAlloc, EventKind::KmemCacheAllocNode];

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trace_name())
    }
}

/// Non-owning link to an event held by a tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub kind: EventKind,
    /// Position in that tracker's event sequence
    pub position: usize,
}

/// A single allocation or free taken from the trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Page-frame number for page events, pointer value for slab events
    pub address: u64,
    /// Bytes allocated (alloc kinds) or the size carried by the free line
    pub size: u64,
    /// Caller address, slab family only
    pub call_site: Option<u64>,
    /// 1-based position in the log body
    pub line_index: usize,
    pub pid: Option<u32>,
    /// Matching free (for an alloc) or alloc (for a free), once correlated
    pub paired: Option<EventRef>,
}

impl Event {
    /// Event with only kind and position set, used for untracked kinds
    pub fn bare(kind: EventKind, line_index: usize) -> Self {
        Self {
            kind,
            address: 0,
            size: 0,
            call_site: None,
            line_index,
            pid: None,
            paired: None,
        }
    }
}

/// Bytes covered by a page allocation of `order`
pub fn order_to_bytes(order: u64, page_size: u64) -> u64 {
    order.saturating_add(1).saturating_mul(page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_to_bytes() {
        assert_eq!(order_to_bytes(0, 4096), 4096);
        assert_eq!(order_to_bytes(1, 4096), 8192);
        assert_eq!(order_to_bytes(2, 4096), 12288);
    }

    #[test]
    fn test_trace_name_roundtrip() {
        for kind in EventKind::TRACKED.iter() {
            assert_eq!(&EventKind::from_trace_name(kind.trace_name()), kind);
        }
        assert_eq!(
            EventKind::from_trace_name("sched_switch"),
            EventKind::Other("sched_switch".to_string())
        );
    }

    #[test]
    fn test_families_do_not_mix() {
        for kind in EventKind::TRACKED.iter().filter(|k| k.is_free()) {
            for candidate in kind.free_candidates() {
                assert!(candidate.is_alloc());
                assert_eq!(candidate.family(), kind.family());
            }
        }
    }

    #[test]
    fn test_kfree_tries_plain_before_node() {
        assert_eq!(
            EventKind::Kfree.free_candidates(),
            &[EventKind::Kmalloc, EventKind::KmallocNode]
        );
    }
}
