//! Correlation of parsed events into allocation/free trackers.
//!
//! This module turns the event stream into:
//! - Per-kind trackers with live allocations and byte totals
//! - Free-to-alloc pairing links
//! - Per-family totals and outstanding bytes

pub mod correlation;
pub mod tracker;

// Re-export main types and functions
pub use correlation::{correlate, FamilyTotals, MemoryEvents};
pub use tracker::AllocationTracker;
