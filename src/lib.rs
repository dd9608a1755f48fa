//! kmem-trace
//!
//! Post-processing for kernel memory ftrace captures: pairs page and slab
//! allocations with their frees, reports what is still outstanding, and
//! attributes slab traffic to the kernel functions that issued it.
//!
//! This crate provides the core implementation for the `kmem-trace` CLI
//! tool.
//!
//! ## Getting Started
//!
//! ```bash
//! echo 1 > /sys/kernel/debug/tracing/events/kmem/enable
//! cat /sys/kernel/debug/tracing/trace > trace.txt
//! kmem-trace analyze trace.txt --symbols
//! ```

pub mod aggregator;
pub mod commands;
pub mod output;
pub mod parser;
pub mod symbols;
pub mod utils;
