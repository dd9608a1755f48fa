//! kmem-trace CLI
//!
//! Analyzes kernel memory ftrace captures: allocation/free pairing,
//! outstanding bytes and call-site attribution.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use kmem_trace::commands::{
    display_version, execute_analyze, execute_symbols, validate_args, validate_report_file,
    AnalyzeArgs, SymbolsArgs,
};
use kmem_trace::symbols::LengthReader;
use kmem_trace::utils::config::{
    DuplicatePolicy, HeaderSkip, DEFAULT_TOP_CALL_SITES, KALLSYMS_PATH, PAGE_SIZE,
    VERBOSE_ALIASES,
};

/// kmem-trace - kernel memory trace analysis
#[derive(Parser, Debug)]
#[command(name = "kmem-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging and per-event output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Pair allocations with frees and report outstanding memory
    Analyze {
        /// Captured trace log
        trace: PathBuf,

        /// Only keep events from this pid
        pid: Option<u32>,

        /// Uncompressed kernel image (vmlinux) for kernel symbol lengths
        kernel_elf: Option<PathBuf>,

        /// `verbose`, `v` or `-v` for per-event output
        mode: Option<String>,

        /// Header lines to skip (detected when omitted)
        #[arg(long)]
        header_lines: Option<usize>,

        /// What to do with an allocation at an address that is already live
        #[arg(long, value_enum, default_value_t = DuplicatePolicy::Replace)]
        duplicates: DuplicatePolicy,

        /// Live symbol table
        #[arg(long, env = "KMEM_TRACE_KALLSYMS", default_value = KALLSYMS_PATH)]
        kallsyms: PathBuf,

        /// Resolve call sites even without a kernel image
        #[arg(long)]
        symbols: bool,

        /// How symbol lengths are read from binaries
        #[arg(long, value_enum, default_value_t = LengthReader::Elf)]
        reader: LengthReader,

        /// Bytes per page
        #[arg(long, default_value_t = PAGE_SIZE)]
        page_size: u64,

        /// Output path for the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of call sites to keep
        #[arg(long, default_value_t = DEFAULT_TOP_CALL_SITES)]
        top: usize,
    },

    /// Build the symbol index and dump its traversal
    Symbols {
        /// Uncompressed kernel image (vmlinux)
        kernel_elf: Option<PathBuf>,

        /// Live symbol table
        #[arg(long, env = "KMEM_TRACE_KALLSYMS", default_value = KALLSYMS_PATH)]
        kallsyms: PathBuf,

        /// Only dump this module (`kernel` for the kernel image)
        #[arg(long)]
        module: Option<String>,

        /// How symbol lengths are read from binaries
        #[arg(long, value_enum, default_value_t = LengthReader::Elf)]
        reader: LengthReader,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        report: PathBuf,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose_mode = match &cli.command {
        Commands::Analyze {
            mode: Some(mode), ..
        } => {
            if !VERBOSE_ALIASES.contains(&mode.as_str()) {
                anyhow::bail!(
                    "Unknown mode `{}` (expected one of: {})",
                    mode,
                    VERBOSE_ALIASES.join(", ")
                );
            }
            true
        }
        _ => false,
    };
    let verbose = cli.verbose || verbose_mode;

    // Setup logging
    let log_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Analyze {
            trace,
            pid,
            kernel_elf,
            mode: _,
            header_lines,
            duplicates,
            kallsyms,
            symbols,
            reader,
            page_size,
            output,
            top,
        } => {
            let args = AnalyzeArgs {
                trace,
                pid,
                kernel_elf,
                verbose,
                header_skip: header_lines.map_or(HeaderSkip::Auto, HeaderSkip::Lines),
                duplicate_policy: duplicates,
                kallsyms,
                resolve_symbols: symbols,
                reader,
                page_size,
                output_json: output,
                top_call_sites: top,
            };

            validate_args(&args)?;
            execute_analyze(args)?;
        }

        Commands::Symbols {
            kernel_elf,
            kallsyms,
            module,
            reader,
        } => {
            execute_symbols(SymbolsArgs {
                kernel_elf,
                kallsyms,
                module,
                reader,
            })?;
        }

        Commands::Validate { report } => {
            validate_report_file(report)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
