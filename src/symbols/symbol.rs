//! Kernel and module code symbols.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner of a symbol: the kernel image or a loadable module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleTag {
    Kernel,
    Module(String),
}

impl ModuleTag {
    pub fn is_kernel(&self) -> bool {
        matches!(self, Self::Kernel)
    }
}

impl fmt::Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kernel => f.write_str("kernel"),
            Self::Module(name) => f.write_str(name),
        }
    }
}

/// A named code range
///
/// `end_address` is inclusive and stays 0 until a length is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub module: ModuleTag,
    pub start_address: u64,
    pub end_address: u64,
}

impl Symbol {
    pub fn new(name: impl Into<String>, module: ModuleTag, start_address: u64) -> Self {
        Self {
            name: name.into(),
            module,
            start_address,
            end_address: 0,
        }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.set_length(length);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.end_address != 0 && self.end_address >= self.start_address
    }

    /// Bytes covered, 0 while unresolved
    pub fn length(&self) -> u64 {
        if self.is_resolved() {
            self.end_address - self.start_address + 1
        } else {
            0
        }
    }

    /// Set the end address from a length. Zero lengths are ignored.
    pub fn set_length(&mut self, length: u64) {
        if length > 0 {
            self.end_address = self.start_address.saturating_add(length - 1);
        }
    }

    /// `start <= address <= end`, never true for an unresolved symbol
    pub fn contains(&self, address: u64) -> bool {
        self.is_resolved() && self.start_address <= address && address <= self.end_address
    }
}
