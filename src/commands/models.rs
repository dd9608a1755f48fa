use crate::symbols::LengthReader;
use crate::utils::config::{
    AnalysisConfig, DuplicatePolicy, HeaderSkip, SymbolSources, DEFAULT_TOP_CALL_SITES,
    KALLSYMS_PATH, PAGE_SIZE,
};
use std::path::PathBuf;

/// Arguments for the analyze command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct AnalyzeArgs {
    /// Captured ftrace log
    pub trace: PathBuf,

    /// Only keep events from this pid
    pub pid: Option<u32>,

    /// Uncompressed kernel image for kernel symbol lengths
    pub kernel_elf: Option<PathBuf>,

    /// Print one line per resolved event
    pub verbose: bool,

    pub header_skip: HeaderSkip,

    pub duplicate_policy: DuplicatePolicy,

    /// Live symbol table
    pub kallsyms: PathBuf,

    /// Resolve call sites even without a kernel image
    pub resolve_symbols: bool,

    pub reader: LengthReader,

    pub page_size: u64,

    /// Output path for the JSON report (optional)
    pub output_json: Option<PathBuf>,

    /// Number of call sites kept in the report
    pub top_call_sites: usize,
}

impl Default for AnalyzeArgs {
    fn default() -> Self {
        Self {
            trace: PathBuf::new(),
            pid: None,
            kernel_elf: None,
            verbose: false,
            header_skip: HeaderSkip::Auto,
            duplicate_policy: DuplicatePolicy::Replace,
            kallsyms: PathBuf::from(KALLSYMS_PATH),
            resolve_symbols: false,
            reader: LengthReader::Elf,
            page_size: PAGE_SIZE,
            output_json: None,
            top_call_sites: DEFAULT_TOP_CALL_SITES,
        }
    }
}

impl AnalyzeArgs {
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig::new()
            .with_header_skip(self.header_skip)
            .with_duplicate_policy(self.duplicate_policy)
            .with_page_size(self.page_size)
            .with_pid(self.pid)
    }

    pub fn symbol_sources(&self) -> SymbolSources {
        SymbolSources {
            kallsyms: self.kallsyms.clone(),
            kernel_binary: self.kernel_elf.clone(),
        }
    }

    /// Symbols are needed when a kernel image is given or asked for explicitly
    pub fn wants_symbols(&self) -> bool {
        self.resolve_symbols || self.kernel_elf.is_some()
    }
}

/// Arguments for the symbols command
#[derive(Debug, Clone)]
pub struct SymbolsArgs {
    pub kernel_elf: Option<PathBuf>,
    pub kallsyms: PathBuf,
    /// Only dump this module (`kernel` for the kernel image)
    pub module: Option<String>,
    pub reader: LengthReader,
}

impl Default for SymbolsArgs {
    fn default() -> Self {
        Self {
            kernel_elf: None,
            kallsyms: PathBuf::from(KALLSYMS_PATH),
            module: None,
            reader: LengthReader::Elf,
        }
    }
}

impl SymbolsArgs {
    pub fn symbol_sources(&self) -> SymbolSources {
        SymbolSources {
            kallsyms: self.kallsyms.clone(),
            kernel_binary: self.kernel_elf.clone(),
        }
    }
}
