//! Symbol length tables for kernel and module binaries.
//!
//! kallsyms only gives start addresses. The lengths come from the binaries
//! themselves, either through `objdump -t` or by reading the ELF symbol table
//! directly. Module binaries are located with `modinfo`.

use crate::utils::config::{EXCLUDED_SECTION_MARKER, TEXT_SECTION_MARKER};
use crate::utils::error::SymbolError;
use log::debug;
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Symbol name -> length in bytes
pub type SymbolLengths = HashMap<String, u64>;

/// External binary inspection used by the resolver
pub trait BinaryInspector {
    /// Path of the `.ko` backing a loaded module
    fn module_binary_path(&self, module: &str) -> Result<PathBuf, SymbolError>;

    /// Lengths of the code symbols in a binary
    fn symbol_lengths(&self, binary: &Path) -> Result<SymbolLengths, SymbolError>;
}

/// How symbol lengths are read from a binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LengthReader {
    /// Read the ELF symbol table in-process
    #[default]
    Elf,
    /// Run `objdump -t` and parse its output
    Objdump,
}

/// Inspector backed by the host's tools and files
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInspector {
    pub reader: LengthReader,
}

impl SystemInspector {
    pub fn new(reader: LengthReader) -> Self {
        Self { reader }
    }
}

impl BinaryInspector for SystemInspector {
    fn module_binary_path(&self, module: &str) -> Result<PathBuf, SymbolError> {
        let output = run_tool("modinfo", &[module])?;
        parse_modinfo_filename(module, &output)
    }

    fn symbol_lengths(&self, binary: &Path) -> Result<SymbolLengths, SymbolError> {
        match self.reader {
            LengthReader::Elf => read_elf_symbol_lengths(binary),
            LengthReader::Objdump => {
                let path = binary.to_string_lossy();
                let output = run_tool("objdump", &["-t", path.as_ref()])?;
                Ok(parse_objdump_symbols(&output))
            }
        }
    }
}

/// Run a tool to completion and return its stdout
fn run_tool(tool: &str, args: &[&str]) -> Result<String, SymbolError> {
    debug!("Running {} {}", tool, args.join(" "));

    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| SymbolError::ToolFailed {
            tool: tool.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(SymbolError::ToolFailed {
            tool: tool.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Whether a section holds code we attribute calls to
pub fn is_text_section(name: &str) -> bool {
    name.contains(TEXT_SECTION_MARKER) && !name.contains(EXCLUDED_SECTION_MARKER)
}

/// Extract the module file from `modinfo` output
pub fn parse_modinfo_filename(module: &str, output: &str) -> Result<PathBuf, SymbolError> {
    let filename = output
        .lines()
        .find_map(|line| line.strip_prefix("filename:"))
        .map(str::trim)
        .unwrap_or_default();

    if filename.is_empty() || filename == "(builtin)" {
        return Err(SymbolError::ModuleNotFound(module.to_string()));
    }
    Ok(PathBuf::from(filename))
}

/// Parse `objdump -t` output into a length table
///
/// **Public** - used by the objdump reader and tests
///
/// Symbol lines look like
/// `0000000000000010 l     F .text\t0000000000000035 foo_open`; the
/// section, size and name are taken from the right since the flag columns
/// vary in width.
pub fn parse_objdump_symbols(output: &str) -> SymbolLengths {
    let mut lengths = SymbolLengths::new();

    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((name, rest)) = tokens.split_last() else {
            continue;
        };
        if rest.len() < 3 || u64::from_str_radix(rest[0], 16).is_err() {
            continue;
        }

        let mut rest = rest.to_vec();
        if rest
            .last()
            .is_some_and(|t| matches!(*t, ".hidden" | ".protected" | ".internal"))
        {
            rest.pop();
        }
        let (Some(size), Some(section)) = (rest.pop(), rest.pop()) else {
            continue;
        };
        if !is_text_section(section) {
            continue;
        }

        match u64::from_str_radix(size, 16) {
            Ok(0) | Err(_) => continue,
            Ok(length) => {
                lengths.insert(name.to_string(), length);
            }
        }
    }

    lengths
}

/// Read code symbol lengths straight from an ELF file
pub fn read_elf_symbol_lengths(path: &Path) -> Result<SymbolLengths, SymbolError> {
    debug!("Reading ELF symbols from: {}", path.display());

    let data = std::fs::read(path).map_err(|source| SymbolError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file = object::File::parse(&*data)?;

    let mut lengths = SymbolLengths::new();
    for symbol in file.symbols() {
        if symbol.kind() != SymbolKind::Text || symbol.size() == 0 {
            continue;
        }
        let Some(section_index) = symbol.section_index() else {
            continue;
        };
        let in_text = file
            .section_by_index(section_index)
            .ok()
            .and_then(|section| section.name().ok().map(is_text_section))
            .unwrap_or(false);
        if !in_text {
            continue;
        }
        match symbol.name() {
            Ok(name) if !name.is_empty() => {
                lengths.insert(name.to_string(), symbol.size());
            }
            _ => {}
        }
    }

    debug!("{} code symbols in {}", lengths.len(), path.display());
    Ok(lengths)
}
