//! Builds address ranges for kernel and module symbols.
//!
//! Resolution runs in phases:
//! 1. parse the live symbol table into one index per module
//! 2. back-fill lengths of module symbols from each module's `.ko`
//! 3. back-fill lengths of kernel symbols from the kernel image, if given
//! 4. merge every resolved symbol into one global index for call-site lookups

use super::index::SymbolIndex;
use super::kallsyms::{parse_kallsyms, KallsymsTable};
use super::lengths::BinaryInspector;
use super::symbol::{ModuleTag, Symbol};
use crate::utils::config::SymbolSources;
use crate::utils::error::SymbolError;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Per-module and merged symbol indices
#[derive(Debug, Clone, Default)]
pub struct KernelSymbols {
    modules: BTreeMap<ModuleTag, SymbolIndex>,
    global: SymbolIndex,
}

impl KernelSymbols {
    /// Indices straight from the symbol table, no lengths yet
    pub fn from_table(table: KallsymsTable) -> Self {
        let modules = table
            .modules
            .into_iter()
            .map(|(tag, symbols)| (tag, SymbolIndex::from_symbols(symbols)))
            .collect();
        let mut symbols = Self {
            modules,
            global: SymbolIndex::new(),
        };
        symbols.rebuild_global();
        symbols
    }

    /// Phase 2: module lengths
    ///
    /// A module whose binary or length table cannot be obtained is skipped
    /// with a warning; its symbols stay unresolved. Returns the number of
    /// symbols resolved.
    pub fn resolve_module_lengths(&mut self, inspector: &dyn BinaryInspector) -> usize {
        info!("Updating module symbol lengths");
        let mut total = 0;

        for (tag, index) in self.modules.iter_mut() {
            let ModuleTag::Module(module) = tag else {
                continue;
            };

            let binary = match inspector.module_binary_path(module) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping module {}: {}", module, e);
                    continue;
                }
            };
            let lengths = match inspector.symbol_lengths(&binary) {
                Ok(lengths) => lengths,
                Err(e) => {
                    warn!("Skipping module {} ({}): {}", module, binary.display(), e);
                    continue;
                }
            };

            let resolved = index.apply_lengths(&lengths);
            debug!("Module {}: {} of {} symbols resolved", module, resolved, index.len());
            total += resolved;
        }

        info!("Resolved {} module symbols", total);
        self.rebuild_global();
        total
    }

    /// Phase 3: kernel lengths from the kernel image
    pub fn resolve_kernel_lengths(
        &mut self,
        inspector: &dyn BinaryInspector,
        kernel_binary: &Path,
    ) -> Result<usize, SymbolError> {
        info!("Updating kernel symbol lengths from {}", kernel_binary.display());

        let lengths = inspector.symbol_lengths(kernel_binary)?;
        let resolved = self
            .modules
            .get_mut(&ModuleTag::Kernel)
            .map(|index| index.apply_lengths(&lengths))
            .unwrap_or(0);

        info!("Resolved {} kernel symbols", resolved);
        self.rebuild_global();
        Ok(resolved)
    }

    fn rebuild_global(&mut self) {
        self.global = self
            .modules
            .values()
            .flat_map(|index| index.iter().filter(|s| s.is_resolved()).cloned())
            .collect();
    }

    pub fn module(&self, tag: &ModuleTag) -> Option<&SymbolIndex> {
        self.modules.get(tag)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&ModuleTag, &SymbolIndex)> {
        self.modules.iter()
    }

    /// Resolved symbols of all modules, merged
    pub fn global(&self) -> &SymbolIndex {
        &self.global
    }

    pub fn symbol_count(&self) -> usize {
        self.modules.values().map(SymbolIndex::len).sum()
    }

    pub fn resolved_count(&self) -> usize {
        self.modules.values().map(SymbolIndex::resolved_count).sum()
    }

    /// Symbol whose resolved range covers `address`
    pub fn resolve(&self, address: u64) -> Option<&Symbol> {
        self.global.find_containing(address)
    }
}

/// Run all phases over kallsyms text
///
/// **Public** - main entry point when the symbol table is already in memory
///
/// # Errors
/// Only a failure on the explicitly supplied kernel binary is fatal;
/// per-module failures are logged and skipped.
pub fn build_kernel_symbols(
    kallsyms: &str,
    inspector: &dyn BinaryInspector,
    kernel_binary: Option<&Path>,
) -> Result<KernelSymbols, SymbolError> {
    info!("Building kallsyms map");
    let table = parse_kallsyms(kallsyms);
    info!(
        "Total module symbols = {}, total kernel symbols = {}",
        table.module_symbols, table.kernel_symbols
    );

    let mut symbols = KernelSymbols::from_table(table);
    symbols.resolve_module_lengths(inspector);
    if let Some(kernel_binary) = kernel_binary {
        symbols.resolve_kernel_lengths(inspector, kernel_binary)?;
    }

    info!(
        "Symbol index ready: {} of {} symbols have address ranges",
        symbols.resolved_count(),
        symbols.symbol_count()
    );
    Ok(symbols)
}

/// Read the symbol table from disk and run all phases
///
/// **Public** - used by commands
pub fn load_kernel_symbols(
    sources: &SymbolSources,
    inspector: &dyn BinaryInspector,
) -> Result<KernelSymbols, SymbolError> {
    let kallsyms = std::fs::read_to_string(&sources.kallsyms).map_err(|source| SymbolError::Io {
        path: sources.kallsyms.clone(),
        source,
    })?;
    build_kernel_symbols(&kallsyms, inspector, sources.kernel_binary.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::lengths::SymbolLengths;
    use std::collections::HashMap;
    use std::path::PathBuf;

    const KALLSYMS: &str = "\
ffffffff81000000 T startup_64
ffffffff8123ab00 T __kmalloc
ffffffff8123b000 T kfree
ffffffffc0a01000 t e1000_probe\t[e1000e]
ffffffffc0a02000 T e1000_remove\t[e1000e]
ffffffffc0b00000 t nf_hook\t[nf_tables]
";

    struct FakeInspector {
        lengths: HashMap<PathBuf, SymbolLengths>,
    }

    impl FakeInspector {
        fn new() -> Self {
            let mut lengths = HashMap::new();
            lengths.insert(
                PathBuf::from("/lib/modules/e1000e.ko"),
                HashMap::from([
                    ("e1000_probe".to_string(), 0x200),
                    ("e1000_remove".to_string(), 0x80),
                ]),
            );
            lengths.insert(
                PathBuf::from("/boot/vmlinux"),
                HashMap::from([("__kmalloc".to_string(), 0x100)]),
            );
            Self { lengths }
        }
    }

    impl BinaryInspector for FakeInspector {
        fn module_binary_path(&self, module: &str) -> Result<PathBuf, SymbolError> {
            match module {
                "e1000e" => Ok(PathBuf::from("/lib/modules/e1000e.ko")),
                "nf_tables" => Ok(PathBuf::from("/lib/modules/nf_tables.ko")),
                other => Err(SymbolError::ModuleNotFound(other.to_string())),
            }
        }

        fn symbol_lengths(&self, binary: &Path) -> Result<SymbolLengths, SymbolError> {
            self.lengths
                .get(binary)
                .cloned()
                .ok_or_else(|| SymbolError::ToolFailed {
                    tool: "fake".to_string(),
                    message: format!("no table for {}", binary.display()),
                })
        }
    }

    #[test]
    fn test_module_lengths_resolved_failures_skipped() {
        let symbols = build_kernel_symbols(KALLSYMS, &FakeInspector::new(), None).unwrap();

        let e1000 = symbols.module(&ModuleTag::Module("e1000e".to_string())).unwrap();
        assert_eq!(e1000.resolved_count(), 2);

        // nf_tables has no length table: unresolved but present
        let nf = symbols.module(&ModuleTag::Module("nf_tables".to_string())).unwrap();
        assert_eq!(nf.len(), 1);
        assert_eq!(nf.resolved_count(), 0);

        // no kernel image: kernel symbols stay unresolved
        assert_eq!(symbols.module(&ModuleTag::Kernel).unwrap().resolved_count(), 0);
    }

    #[test]
    fn test_kernel_lengths_from_image() {
        let symbols = build_kernel_symbols(
            KALLSYMS,
            &FakeInspector::new(),
            Some(Path::new("/boot/vmlinux")),
        )
        .unwrap();

        let kmalloc = symbols.resolve(0xffffffff8123ab40).unwrap();
        assert_eq!(kmalloc.name, "__kmalloc");
        assert_eq!(kmalloc.end_address, 0xffffffff8123abff);
        assert_eq!(symbols.resolved_count(), 3);
    }

    #[test]
    fn test_missing_kernel_image_is_fatal() {
        let result = build_kernel_symbols(
            KALLSYMS,
            &FakeInspector::new(),
            Some(Path::new("/boot/missing")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_across_modules() {
        let symbols = build_kernel_symbols(KALLSYMS, &FakeInspector::new(), None).unwrap();

        let probe = symbols.resolve(0xffffffffc0a01010).unwrap();
        assert_eq!(probe.name, "e1000_probe");
        assert_eq!(probe.module, ModuleTag::Module("e1000e".to_string()));

        // unresolved symbols never match, not even at their start
        assert!(symbols.resolve(0xffffffffc0b00000).is_none());
        assert!(symbols.resolve(0xffffffff8123ab40).is_none());
        assert_eq!(symbols.global().len(), 2);
    }

    #[test]
    fn test_sizeless_label_inside_function() {
        let kallsyms = "\
ffffffff81000000 T entry_SYSCALL_64
ffffffff81000040 T entry_SYSCALL_64_after_hwframe
";
        let mut fake = FakeInspector::new();
        fake.lengths.insert(
            PathBuf::from("/boot/vmlinux"),
            HashMap::from([("entry_SYSCALL_64".to_string(), 0x100)]),
        );
        let symbols =
            build_kernel_symbols(kallsyms, &fake, Some(Path::new("/boot/vmlinux"))).unwrap();

        for address in [0xffffffff81000080, 0xffffffff81000040, 0xffffffff810000ff] {
            assert_eq!(symbols.resolve(address).unwrap().name, "entry_SYSCALL_64");
        }
        assert!(symbols.resolve(0xffffffff81000100).is_none());
        assert_eq!(symbols.global().len(), 1);
    }

    #[test]
    fn test_load_kernel_symbols_missing_file() {
        let sources = SymbolSources {
            kallsyms: PathBuf::from("/nonexistent/kallsyms"),
            kernel_binary: None,
        };
        assert!(matches!(
            load_kernel_symbols(&sources, &FakeInspector::new()),
            Err(SymbolError::Io { .. })
        ));
    }
}
