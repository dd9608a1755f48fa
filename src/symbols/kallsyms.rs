//! Parser for the live global symbol table (`/proc/kallsyms` format).
//!
//! Each line is `<hex_address> <type> <name> [<[module]>]`. Only defined
//! text symbols (`T`/`t`) are kept.

use super::symbol::{ModuleTag, Symbol};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Text symbols grouped by owning module
#[derive(Debug, Clone, Default)]
pub struct KallsymsTable {
    pub modules: BTreeMap<ModuleTag, Vec<Symbol>>,
    pub kernel_symbols: usize,
    pub module_symbols: usize,
}

impl KallsymsTable {
    pub fn total(&self) -> usize {
        self.kernel_symbols + self.module_symbols
    }
}

/// Parse kallsyms text
///
/// **Public** - first phase of symbol resolution
pub fn parse_kallsyms(text: &str) -> KallsymsTable {
    let mut table = KallsymsTable::default();

    for line in text.lines() {
        let Some(symbol) = parse_kallsyms_line(line) else {
            continue;
        };
        if symbol.module.is_kernel() {
            table.kernel_symbols += 1;
        } else {
            table.module_symbols += 1;
        }
        table
            .modules
            .entry(symbol.module.clone())
            .or_default()
            .push(symbol);
    }

    debug!(
        "kallsyms: {} kernel symbols, {} module symbols in {} modules",
        table.kernel_symbols,
        table.module_symbols,
        table.modules.len()
    );

    let all_zero = table
        .modules
        .values()
        .flatten()
        .all(|s| s.start_address == 0);
    if table.total() > 0 && all_zero {
        warn!("All kallsyms addresses are zero; symbol resolution needs root (or kptr_restrict=0)");
    }

    table
}

/// One text symbol from a kallsyms line, `None` for anything else
pub fn parse_kallsyms_line(line: &str) -> Option<Symbol> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 3 && fields.len() != 4 {
        return None;
    }
    if fields[1] != "T" && fields[1] != "t" {
        return None;
    }

    let address = match u64::from_str_radix(fields[0], 16) {
        Ok(address) => address,
        Err(e) => {
            debug!("Bad kallsyms address `{}`: {}", fields[0], e);
            return None;
        }
    };

    let module = match fields.get(3) {
        Some(module) => ModuleTag::Module(
            module
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string(),
        ),
        None => ModuleTag::Kernel,
    };

    Some(Symbol::new(fields[2], module, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ffffffff81000000 T startup_64
ffffffff81000040 t secondary_startup_64
ffffffff81e00000 D init_task
ffffffff8123abcd T __kmalloc
ffffffffc0a01000 t e1000_probe\t[e1000e]
ffffffffc0a02000 T e1000_remove\t[e1000e]
ffffffffc0b00000 t nf_hook\t[nf_tables]
ffffffffc0b00100 d nf_data\t[nf_tables]
zzzz T broken
ffffffff81000100 T too many fields here
";

    #[test]
    fn test_parse_kallsyms_groups_by_module() {
        let table = parse_kallsyms(SAMPLE);

        assert_eq!(table.kernel_symbols, 3);
        assert_eq!(table.module_symbols, 3);
        assert_eq!(table.modules.len(), 3);

        let e1000 = &table.modules[&ModuleTag::Module("e1000e".to_string())];
        assert_eq!(e1000.len(), 2);
        assert_eq!(e1000[0].name, "e1000_probe");
        assert_eq!(e1000[0].start_address, 0xffffffffc0a01000);
        assert_eq!(e1000[0].end_address, 0);
    }

    #[test]
    fn test_data_symbols_are_dropped() {
        assert!(parse_kallsyms_line("ffffffff81e00000 D init_task").is_none());
        assert!(parse_kallsyms_line("ffffffff81e00000 b bss_thing").is_none());
    }

    #[test]
    fn test_kernel_symbol_has_kernel_tag() {
        let sym = parse_kallsyms_line("ffffffff8123abcd T __kmalloc").unwrap();
        assert_eq!(sym.module, ModuleTag::Kernel);
        assert_eq!(sym.name, "__kmalloc");
    }
}
