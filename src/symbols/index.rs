//! Address-ordered symbol index.
//!
//! Symbols are kept in a vector sorted by start address and searched with
//! binary search, so lookups stay logarithmic even though kallsyms hands us
//! symbols already in address order (which would turn a plain binary search
//! tree into a chain).
//!
//! Ranges may nest: kallsyms lists sizeless labels such as
//! `entry_SYSCALL_64_after_hwframe` inside the function that owns them, so a
//! containment lookup cannot stop at the nearest start.

use super::lengths::SymbolLengths;
use super::symbol::Symbol;
use std::fmt;
use std::fmt::Write as _;

/// Position of a node in the implicit search tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Root,
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Root => "root",
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

/// One node visited by [`SymbolIndex::walk`]
#[derive(Debug, Clone, Copy)]
pub struct TreeNode<'a> {
    pub level: usize,
    pub direction: Direction,
    pub symbol: &'a Symbol,
}

/// Symbols ordered by start address, unique per start address
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    symbols: Vec<Symbol>,
    /// `reach[i]` is the highest resolved end among `symbols[..=i]`
    reach: Vec<u64>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from symbols in any order. For equal start addresses the first
    /// one wins.
    pub fn from_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        let mut symbols: Vec<Symbol> = symbols.into_iter().collect();
        // stable, so the first of each run of equal starts is the first inserted
        symbols.sort_by_key(|s| s.start_address);
        symbols.dedup_by_key(|s| s.start_address);
        let mut index = Self {
            symbols,
            reach: Vec::new(),
        };
        index.refresh_reach();
        index
    }

    /// Insert a symbol; a symbol with the same start address already present
    /// makes this a no-op. Returns whether the symbol was added.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        match self
            .symbols
            .binary_search_by_key(&symbol.start_address, |s| s.start_address)
        {
            Ok(_) => false,
            Err(position) => {
                self.symbols.insert(position, symbol);
                self.refresh_reach();
                true
            }
        }
    }

    /// Symbol starting exactly at `address`
    pub fn find_exact(&self, address: u64) -> Option<&Symbol> {
        self.symbols
            .binary_search_by_key(&address, |s| s.start_address)
            .ok()
            .map(|i| &self.symbols[i])
    }

    /// Exact or containment lookup
    ///
    /// Returns the symbol starting at `address`, or else the closest-starting
    /// symbol whose resolved range covers it.
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        self.find_exact(address)
            .or_else(|| self.find_containing(address))
    }

    /// Closest-starting resolved symbol whose range covers `address`
    ///
    /// Walks down from the nearest start until no earlier symbol can reach
    /// `address`, so a nested or sizeless entry never hides its container.
    pub fn find_containing(&self, address: u64) -> Option<&Symbol> {
        let after = self.symbols.partition_point(|s| s.start_address <= address);

        (0..after)
            .rev()
            .take_while(|&i| self.reach[i] >= address)
            .map(|i| &self.symbols[i])
            .find(|symbol| symbol.contains(address))
    }

    /// Back-fill end addresses of unresolved symbols by name.
    /// Returns how many symbols were resolved.
    pub fn apply_lengths(&mut self, lengths: &SymbolLengths) -> usize {
        let mut resolved = 0;
        for symbol in self.symbols.iter_mut().filter(|s| !s.is_resolved()) {
            if let Some(&length) = lengths.get(&symbol.name) {
                if length > 0 {
                    symbol.set_length(length);
                    resolved += 1;
                }
            }
        }
        if resolved > 0 {
            self.refresh_reach();
        }
        resolved
    }

    fn refresh_reach(&mut self) {
        let mut highest = 0;
        self.reach = self
            .symbols
            .iter()
            .map(|symbol| {
                if symbol.is_resolved() {
                    highest = highest.max(symbol.end_address);
                }
                highest
            })
            .collect();
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.symbols.iter().filter(|s| s.is_resolved()).count()
    }

    /// Symbols in address order
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Pre-order walk of the balanced tree binary search implicitly descends:
    /// the middle symbol is the root, each half is a subtree.
    pub fn walk(&self) -> Vec<TreeNode<'_>> {
        let mut nodes = Vec::with_capacity(self.symbols.len());
        self.visit(0, self.symbols.len(), 0, Direction::Root, &mut nodes);
        nodes
    }

    fn visit<'a>(
        &'a self,
        lo: usize,
        hi: usize,
        level: usize,
        direction: Direction,
        nodes: &mut Vec<TreeNode<'a>>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        nodes.push(TreeNode {
            level,
            direction,
            symbol: &self.symbols[mid],
        });
        self.visit(lo, mid, level + 1, Direction::Left, nodes);
        self.visit(mid + 1, hi, level + 1, Direction::Right, nodes);
    }

    /// Diagnostic dump of [`walk`](Self::walk), one node per line
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for node in self.walk() {
            let _ = writeln!(
                out,
                "Level {} dir={} name={} module={} addr={:x} len={}",
                node.level,
                node.direction,
                node.symbol.name,
                node.symbol.module,
                node.symbol.start_address,
                node.symbol.length()
            );
        }
        out
    }
}

impl FromIterator<Symbol> for SymbolIndex {
    fn from_iter<T: IntoIterator<Item = Symbol>>(iter: T) -> Self {
        Self::from_symbols(iter)
    }
}
