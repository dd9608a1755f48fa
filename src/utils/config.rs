//! Configuration and constants for trace analysis.

use std::path::PathBuf;

/// Current report schema version
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Page size used to turn an allocation order into bytes
pub const PAGE_SIZE: u64 = 4096;

// Header lines written by the capture tooling before the first event.
// The newer capture script writes 9, the older one 11.
pub const DEFAULT_HEADER_LINES: usize = 9;
pub const LEGACY_HEADER_LINES: usize = 11;

/// Live global symbol table
pub const KALLSYMS_PATH: &str = "/proc/kallsyms";

// Section filter for symbol length tables.
// Anything containing ".text" is code (.text, .init.text, .exit.text, .text.unlikely ...)
pub const TEXT_SECTION_MARKER: &str = ".text";
pub const EXCLUDED_SECTION_MARKER: &str = ".text..refcount";

/// Trailing positional words accepted as "verbose" on the command line
pub const VERBOSE_ALIASES: &[&str] = &["verbose", "-v", "v"];

/// Default number of call sites listed in reports
pub const DEFAULT_TOP_CALL_SITES: usize = 20;

/// How many leading lines of a trace log are header, not events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderSkip {
    /// Skip until the first line that looks like an event line
    #[default]
    Auto,
    /// Skip exactly this many lines
    Lines(usize),
}

/// What to do when an address is allocated again while still live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DuplicatePolicy {
    /// Drop the earlier allocation without counting it as a leak
    #[default]
    Replace,
    /// Drop the earlier allocation but keep its bytes outstanding
    #[value(name = "leak")]
    CountAsLeak,
}

/// Settings for one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub header_skip: HeaderSkip,
    pub duplicate_policy: DuplicatePolicy,
    pub page_size: u64,
    /// Only keep events emitted by this pid
    pub pid: Option<u32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            header_skip: HeaderSkip::Auto,
            duplicate_policy: DuplicatePolicy::Replace,
            page_size: PAGE_SIZE,
            pid: None,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header_skip(mut self, header_skip: HeaderSkip) -> Self {
        self.header_skip = header_skip;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }
}

/// Where symbol information comes from
#[derive(Debug, Clone)]
pub struct SymbolSources {
    pub kallsyms: PathBuf,
    pub kernel_binary: Option<PathBuf>,
}

impl Default for SymbolSources {
    fn default() -> Self {
        Self {
            kallsyms: PathBuf::from(KALLSYMS_PATH),
            kernel_binary: None,
        }
    }
}
