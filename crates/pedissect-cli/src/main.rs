mod report;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, warn};
use pedissect::headers::{self, machine, FILE_HEADER_SIZE};
use pedissect::options::{
    DEFAULT_MAX_IMPORT_DESCRIPTORS, DEFAULT_MAX_SECTIONS, DEFAULT_MAX_THUNKS_PER_MODULE,
};
use pedissect::{Architecture, ImageReader, ParseOptions, ParseResult};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pedissect", version, about = "PE header, section and import table dissector")]
struct Cli {
    /// Log verbosity: -v info, -vv debug, -vvv trace (RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print headers, data directories, sections and imports
    Analyze(InputArgs),
    /// Print the DOS, file and optional headers
    Headers(InputArgs),
    /// Print the section table
    Sections(InputArgs),
    /// Print imported modules and their functions
    Imports(InputArgs),
    /// Translate an RVA to a file offset
    Rva {
        #[command(flatten)]
        input: InputArgs,
        /// RVA to resolve (hex, with or without 0x)
        #[arg(value_parser = parse_hex_u32)]
        rva: u32,
    },
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Input PE file path
    input: PathBuf,
    /// Image width; `auto` classifies it from the COFF Machine field
    #[arg(long, value_enum, default_value = "auto")]
    arch: ArchArg,
    /// Upper bound on NumberOfSections
    #[arg(long, default_value_t = DEFAULT_MAX_SECTIONS)]
    max_sections: usize,
    /// Upper bound on import descriptors walked
    #[arg(long, default_value_t = DEFAULT_MAX_IMPORT_DESCRIPTORS)]
    max_descriptors: usize,
    /// Upper bound on thunks walked per imported module
    #[arg(long, default_value_t = DEFAULT_MAX_THUNKS_PER_MODULE)]
    max_thunks: usize,
    /// Accept images whose DOS header lacks the MZ magic
    #[arg(long)]
    no_dos_magic: bool,
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum ArchArg {
    Auto,
    X86,
    X64,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Which part of the image a command prints.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum View {
    All,
    Headers,
    Sections,
    Imports,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Analyze(args) => cmd_show(&args, View::All),
        Command::Headers(args) => cmd_show(&args, View::Headers),
        Command::Sections(args) => cmd_show(&args, View::Sections),
        Command::Imports(args) => cmd_show(&args, View::Imports),
        Command::Rva { input, rva } => cmd_rva(&input, rva),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

// ─── parsing ─────────────────────────────────────────────────

fn parse_hex_u32(s: &str) -> std::result::Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid hex RVA '{s}': {e}"))
}

/// Stand-in for the platform's binary-type query: decide the width from
/// the COFF `Machine` field, falling back to the optional header magic for
/// machines that do not imply one.
fn classify_architecture(data: &[u8]) -> Result<Architecture> {
    let reader = ImageReader::new(data);
    let dos = headers::parse_dos_header(&reader).context("reading DOS header")?;
    let nt_offset = usize::try_from(dos.e_lfanew)
        .map_err(|_| anyhow!("e_lfanew {} is negative", dos.e_lfanew))?;
    let file_header = headers::parse_file_header(&reader, nt_offset + 4)
        .context("reading COFF file header")?;

    match file_header.machine {
        machine::I386 => Ok(Architecture::X86),
        machine::AMD64 | machine::ARM64 => Ok(Architecture::X64),
        other => reader
            .read_u16(nt_offset + 4 + FILE_HEADER_SIZE)
            .ok()
            .and_then(Architecture::from_magic)
            .ok_or_else(|| {
                anyhow!("cannot classify machine 0x{other:04X}; pass --arch x86 or --arch x64")
            }),
    }
}

fn options_for(args: &InputArgs, data: &[u8]) -> Result<ParseOptions> {
    let architecture = match args.arch {
        ArchArg::X86 => Architecture::X86,
        ArchArg::X64 => Architecture::X64,
        ArchArg::Auto => {
            let arch = classify_architecture(data)?;
            info!("classified {} as {}", args.input.display(), arch);
            arch
        }
    };
    Ok(ParseOptions::default()
        .with_architecture(architecture)
        .with_require_dos_magic(!args.no_dos_magic)
        .with_max_sections(args.max_sections)
        .with_max_import_descriptors(args.max_descriptors)
        .with_max_thunks_per_module(args.max_thunks))
}

fn load(args: &InputArgs) -> Result<(Vec<u8>, ParseResult)> {
    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read '{}'", args.input.display()))?;
    let options = options_for(args, &data)?;
    let image = pedissect::parse_with_options(&data, &options)
        .with_context(|| format!("failed to parse '{}'", args.input.display()))?;

    if let Some(err) = image.imports().error() {
        warn!("{}: {err} ({})", args.input.display(), err.root_cause());
    }
    Ok((data, image))
}

// ─── commands ────────────────────────────────────────────────

fn cmd_show(args: &InputArgs, view: View) -> Result<()> {
    let (_, image) = load(args)?;
    match args.format {
        OutputFormat::Text => {
            print!("{}", report::render_text(&args.input, &image, view));
            Ok(())
        }
        OutputFormat::Json => {
            let value = report::to_json(&args.input, &image, view);
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
    }
}

fn cmd_rva(args: &InputArgs, rva: u32) -> Result<()> {
    let (data, image) = load(args)?;
    let resolver = pedissect::RvaResolver::new(image.sections(), data.len());
    let offset = resolver
        .resolve(rva, 1)
        .with_context(|| format!("cannot resolve RVA 0x{rva:08X}"))?;
    let section = image
        .section_for_rva(rva)
        .map(|s| s.name_str())
        .unwrap_or_default();

    match args.format {
        OutputFormat::Text => {
            println!("RVA 0x{rva:08X} -> file offset 0x{offset:08X} ({section})");
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "rva": rva,
                "offset": offset,
                "section": section,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
