//! Attribution of slab events to the kernel functions that issued them.

use super::resolver::KernelSymbols;
use super::symbol::{ModuleTag, Symbol};
use crate::aggregator::MemoryEvents;
use crate::parser::{EventKind, Family};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A slab event with its call site mapped to a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEvent {
    pub kind: EventKind,
    pub line_index: usize,
    pub size: u64,
    pub call_site: u64,
    /// Empty when no resolved symbol covers the call site
    pub function: String,
    pub module: Option<ModuleTag>,
}

impl ResolvedEvent {
    pub fn is_resolved(&self) -> bool {
        !self.function.is_empty()
    }
}

/// Per-function totals over resolved slab events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteSummary {
    /// Function name, or the raw call-site address in hex when unresolved
    pub function: String,
    pub module: Option<ModuleTag>,
    pub resolved: bool,
    pub allocations: u64,
    pub frees: u64,
    pub allocated_bytes: u64,
    pub outstanding_bytes: u64,
}

/// Address -> symbol lookups, memoized for the lifetime of the resolver
pub struct CallSiteResolver<'a> {
    symbols: &'a KernelSymbols,
    cache: HashMap<u64, Option<&'a Symbol>>,
}

impl<'a> CallSiteResolver<'a> {
    pub fn new(symbols: &'a KernelSymbols) -> Self {
        Self {
            symbols,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, address: u64) -> Option<&'a Symbol> {
        let symbols = self.symbols;
        *self
            .cache
            .entry(address)
            .or_insert_with(|| symbols.resolve(address))
    }

    /// Distinct addresses looked up so far
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Resolve the call site of every slab event that carries one
///
/// **Public** - output is in log order
pub fn resolve_events(memory: &MemoryEvents, symbols: &KernelSymbols) -> Vec<ResolvedEvent> {
    let mut resolver = CallSiteResolver::new(symbols);
    let mut resolved = Vec::new();

    for tracker in memory
        .trackers()
        .filter(|t| t.kind().family() == Some(Family::Slab))
    {
        for event in tracker.events() {
            let Some(call_site) = event.call_site else {
                continue;
            };
            let symbol = resolver.resolve(call_site);
            resolved.push(ResolvedEvent {
                kind: event.kind.clone(),
                line_index: event.line_index,
                size: event.size,
                call_site,
                function: symbol.map(|s| s.name.clone()).unwrap_or_default(),
                module: symbol.map(|s| s.module.clone()),
            });
        }
    }

    resolved.sort_by_key(|e| e.line_index);
    debug!(
        "Resolved {} slab events over {} distinct call sites",
        resolved.len(),
        resolver.cached()
    );
    resolved
}

/// Group slab events by calling function
///
/// Sorted by outstanding bytes, then allocated bytes, both descending.
pub fn summarize_call_sites(memory: &MemoryEvents, symbols: &KernelSymbols) -> Vec<CallSiteSummary> {
    let mut resolver = CallSiteResolver::new(symbols);
    let mut by_function: HashMap<(Option<ModuleTag>, String), CallSiteSummary> = HashMap::new();

    for tracker in memory
        .trackers()
        .filter(|t| t.kind().family() == Some(Family::Slab))
    {
        for (position, event) in tracker.events().iter().enumerate() {
            let Some(call_site) = event.call_site else {
                continue;
            };

            let (module, function, resolved) = match resolver.resolve(call_site) {
                Some(symbol) => (Some(symbol.module.clone()), symbol.name.clone(), true),
                None => (None, format!("{:#x}", call_site), false),
            };

            let entry = by_function
                .entry((module.clone(), function.clone()))
                .or_insert_with(|| CallSiteSummary {
                    function,
                    module,
                    resolved,
                    allocations: 0,
                    frees: 0,
                    allocated_bytes: 0,
                    outstanding_bytes: 0,
                });

            if event.kind.is_alloc() {
                entry.allocations += 1;
                entry.allocated_bytes = entry.allocated_bytes.saturating_add(event.size);
                if tracker.is_outstanding(position) {
                    entry.outstanding_bytes = entry.outstanding_bytes.saturating_add(event.size);
                }
            } else {
                entry.frees += 1;
            }
        }
    }

    let mut summaries: Vec<CallSiteSummary> = by_function.into_values().collect();
    summaries.sort_by(|a, b| {
        b.outstanding_bytes
            .cmp(&a.outstanding_bytes)
            .then(b.allocated_bytes.cmp(&a.allocated_bytes))
            .then_with(|| a.function.cmp(&b.function))
    });
    summaries
}
