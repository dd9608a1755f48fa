//! Kernel symbol resolution.
//!
//! Builds address-range indices from kallsyms plus the length tables of the
//! kernel and module binaries, and maps call-site addresses to functions.

pub mod call_sites;
pub mod index;
pub mod kallsyms;
pub mod lengths;
pub mod resolver;
pub mod symbol;

// Re-export commonly used items
pub use call_sites::{resolve_events, summarize_call_sites, CallSiteSummary, ResolvedEvent};
pub use index::SymbolIndex;
pub use kallsyms::parse_kallsyms;
pub use lengths::{BinaryInspector, LengthReader, SymbolLengths, SystemInspector};
pub use resolver::{build_kernel_symbols, load_kernel_symbols, KernelSymbols};
pub use symbol::{ModuleTag, Symbol};
