//! Trace parsing and event definitions.
//!
//! This module handles:
//! - Decoding raw ftrace lines into typed events
//! - Skipping the capture header
//! - Filtering by pid

pub mod event;
pub mod ftrace;

// Re-export main types
pub use event::{order_to_bytes, Event, EventKind, EventRef, Family};
pub use ftrace::{parse_line, parse_trace_log, ParseStats, ParsedTrace};
