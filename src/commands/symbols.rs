//! Symbols command: build the symbol index and dump it.

use super::models::SymbolsArgs;
use crate::symbols::{load_kernel_symbols, BinaryInspector, ModuleTag, SystemInspector};
use anyhow::{Context, Result};
use std::fmt::Write as _;

/// Execute the symbols command
pub fn execute_symbols(args: SymbolsArgs) -> Result<()> {
    let inspector = SystemInspector::new(args.reader);
    print!("{}", dump_symbols(&args, &inspector)?);
    Ok(())
}

/// Render the index traversal of every module, or only `args.module`
pub fn dump_symbols(args: &SymbolsArgs, inspector: &dyn BinaryInspector) -> Result<String> {
    let symbols = load_kernel_symbols(&args.symbol_sources(), inspector)
        .context("Failed to build kernel symbol index")?;

    let wanted = args.module.as_deref().map(|name| match name {
        "kernel" => ModuleTag::Kernel,
        other => ModuleTag::Module(other.to_string()),
    });

    let mut out = String::new();
    let mut dumped = 0;
    for (tag, index) in symbols.modules() {
        if wanted.as_ref().is_some_and(|w| w != tag) {
            continue;
        }
        let _ = writeln!(
            out,
            "Module {}: {} symbols, {} resolved",
            tag,
            index.len(),
            index.resolved_count()
        );
        out.push_str(&index.render_tree());
        dumped += 1;
    }

    if dumped == 0 {
        if let Some(module) = &args.module {
            anyhow::bail!("Module {} has no text symbols in {}", module, args.kallsyms.display());
        }
    }

    Ok(out)
}
