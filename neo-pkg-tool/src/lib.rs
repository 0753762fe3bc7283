//! Library for extracting PlayStation 4 PKG files.
//!
//! This crate wires the PKG parser and the PFS reader into the full
//! extraction pipeline: `sce_sys/` entries (NPDRM decrypted), the key
//! chain, and the PFS file tree streamed to disk on a bounded worker pool.
//!
//! # Example
//!
//! ```no_run
//! use neo_pkg_tool::{PfsLayout, PkgExtractor, SilentProgress, open_pkg};
//!
//! let pkg = unsafe { open_pkg("game.pkg".as_ref()) }.expect("failed to open PKG");
//! let extractor = PkgExtractor::new(&pkg, SilentProgress, false, PfsLayout::Auto);
//! extractor.extract("output/").expect("extraction failed");
//! ```
//!
//! # Custom progress reporting
//!
//! Implement [`ExtractProgress`] to receive fine-grained progress updates
//! during extraction.

pub mod extract;
pub mod progress;

pub use self::extract::{ExtractError, ExtractSummary, PfsLayout, PkgExtractor};
pub use self::progress::{ConsoleProgress, ExtractProgress, SilentProgress};

use snafu::{ResultExt, Snafu};
use std::path::Path;

/// Errors that can occur when opening a PKG file from disk.
#[derive(Debug, Snafu)]
pub enum OpenPkgError {
    #[snafu(display("failed to open file"))]
    OpenFile { source: std::io::Error },

    #[snafu(display("failed to memory map file"))]
    MmapFile { source: std::io::Error },

    #[snafu(display("failed to parse PKG"))]
    ParsePkg { source: neo_pkg::OpenError },
}

/// Opens a PKG file from disk using a memory-mapped read.
///
/// The returned [`Pkg`](neo_pkg::Pkg) borrows from the map; workers share
/// it instead of re-opening the file per thread.
///
/// # Safety
///
/// The caller must ensure the file is not modified or truncated while the
/// returned `Pkg` is in use.
pub unsafe fn open_pkg(path: &Path) -> Result<neo_pkg::Pkg<memmap2::Mmap>, OpenPkgError> {
    let file = std::fs::File::open(path).context(OpenFileSnafu)?;
    let raw = unsafe { memmap2::Mmap::map(&file).context(MmapFileSnafu)? };
    neo_pkg::Pkg::new(raw).context(ParsePkgSnafu)
}
