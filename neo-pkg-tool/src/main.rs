mod cli;

use clap::Parser;
use cli::{Cli, Command};
use neo_pkg_tool::{ConsoleProgress, PfsLayout, PkgExtractor, SilentProgress};
use simplelog::{ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};

/// Debug log appended next to wherever the tool runs.
const LOG_FILE: &str = "neo-pkg-tool.log";

/// Top-level application errors.
#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to open PKG file '{}'", path.display()))]
    OpenPkg {
        path: PathBuf,
        source: neo_pkg_tool::OpenPkgError,
    },

    #[snafu(display("failed to extract PKG"))]
    Extract { source: neo_pkg_tool::ExtractError },

    #[snafu(display("failed to read entry"))]
    ReadEntry { source: neo_pkg::EntryReadError },

    #[snafu(display("failed to get current directory"))]
    GetCurrentDir { source: std::io::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[snafu::report]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let quiet = matches!(cli.command, Command::Extract { quiet: true, .. });
    init_logging(quiet);

    match cli.command {
        Command::Extract {
            pkg_path,
            output,
            force,
            quiet,
            as_update,
            as_dlc,
        } => {
            let layout = if as_update {
                PfsLayout::Update
            } else if as_dlc {
                PfsLayout::Dlc
            } else {
                PfsLayout::Auto
            };
            cmd_extract(&pkg_path, output.as_deref(), force, quiet, layout)
        }
        Command::Info { pkg_path } => cmd_info(&pkg_path),
        Command::List { pkg_path } => cmd_list(&pkg_path),
    }
}

/// Terminal warnings plus a persistent machine-readable debug log.
fn init_logging(quiet: bool) {
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if !quiet {
        loggers.push(TermLogger::new(
            log::LevelFilter::Warn,
            simplelog::Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(LOG_FILE)
    {
        loggers.push(WriteLogger::new(
            log::LevelFilter::Debug,
            simplelog::Config::default(),
            file,
        ));
    }

    // Logging is best-effort; a second init in tests is not fatal.
    let _ = CombinedLogger::init(loggers);
}

fn cmd_extract(
    path: &Path,
    output: Option<&Path>,
    force: bool,
    quiet: bool,
    layout: PfsLayout,
) -> Result<()> {
    let pkg = unsafe { neo_pkg_tool::open_pkg(path).context(OpenPkgSnafu { path })? };

    // Use the title ID as the default output directory name.
    let output_dir = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let title_id = pkg.header().content_id().title_id();
            std::env::current_dir()
                .context(GetCurrentDirSnafu)?
                .join(title_id)
        }
    };

    if !quiet {
        println!(
            "Extracting {} to {}...",
            path.display(),
            output_dir.display()
        );
    }

    let start = std::time::Instant::now();

    let summary = if quiet {
        let extractor = PkgExtractor::new(&pkg, SilentProgress, force, layout);
        extractor.extract(&output_dir).context(ExtractSnafu)?
    } else {
        let extractor = PkgExtractor::new(&pkg, ConsoleProgress::new(), force, layout);
        extractor.extract(&output_dir).context(ExtractSnafu)?
    };

    let elapsed = start.elapsed();

    if !quiet {
        if summary.pfs_skipped > 0 {
            println!(
                "Done in {:.2}s ({} entries, {} files, {} skipped).",
                elapsed.as_secs_f64(),
                summary.entries,
                summary.pfs_files,
                summary.pfs_skipped
            );
        } else {
            println!(
                "Done in {:.2}s ({} entries, {} files).",
                elapsed.as_secs_f64(),
                summary.entries,
                summary.pfs_files
            );
        }
    }

    Ok(())
}

fn cmd_info(path: &Path) -> Result<()> {
    use neo_pkg::header::{content_type_name, drm_type_name};

    let pkg = unsafe { neo_pkg_tool::open_pkg(path).context(OpenPkgSnafu { path })? };
    let header = pkg.header();
    let content_id = header.content_id();

    println!("PKG: {}", path.display());
    println!();
    println!("Content ID:     {}", content_id);
    println!("  Service ID:   {}", content_id.service_id());
    println!("  Publisher:    {}", content_id.publisher_code());
    println!("  Title ID:     {}", content_id.title_id());
    println!("  Version:      {}", content_id.version());
    println!("  Label:        {}", content_id.label());
    println!(
        "Content Type:   0x{:02X} ({})",
        header.content_type(),
        content_type_name(header.content_type())
    );
    let flags = header.content_flags();
    println!("Content Flags:  0x{:08X}", flags.bits());
    if flags.is_empty() {
        println!("  (none)");
    }
    for name in flags.decoded() {
        println!("  - {}", name);
    }
    println!(
        "DRM Type:       0x{:02X} ({})",
        header.drm_type(),
        drm_type_name(header.drm_type())
    );
    println!("PKG Type:       0x{:08X}", header.pkg_type());
    println!("PKG Size:       {} bytes", header.pkg_size());
    println!("File Count:     {}", header.file_count());
    println!("Entry Count:    {}", header.entry_count());
    println!("Table Offset:   0x{:X}", header.table_offset());
    println!("PFS Offset:     0x{:X}", header.pfs_offset());
    println!("PFS Size:       {} bytes", header.pfs_size());
    println!("PFS Cache Size: {} bytes", header.pfs_cache_size());
    println!("Has param.sfo:  {}", pkg.sfo().is_some());

    Ok(())
}

fn cmd_list(path: &Path) -> Result<()> {
    let pkg = unsafe { neo_pkg_tool::open_pkg(path).context(OpenPkgSnafu { path })? };

    println!("Entries in {}:", path.display());
    println!("{:>6}  {:>10}  {:>10}  Path", "Index", "ID", "Size");
    println!("{:-<6}  {:-<10}  {:-<10}  {:-<30}", "", "", "", "");

    for result in pkg.entries() {
        let (index, entry) = result.context(ReadEntrySnafu)?;
        let path_str = entry
            .to_path(Path::new(""))
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("(id: 0x{:08X})", entry.id()));

        println!(
            "{:>6}  0x{:08X}  {:>10}  {}",
            index,
            entry.id(),
            entry.data_size(),
            path_str
        );
    }

    Ok(())
}
