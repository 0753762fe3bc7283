use snafu::Snafu;
use std::path::PathBuf;

/// Errors that can occur during PKG extraction.
///
/// Everything here is fatal: it aborts the run before any PFS file is
/// written, or during the pre-extraction walk. Failures confined to a
/// single PFS file are logged and skipped instead.
#[derive(Debug, Snafu)]
#[non_exhaustive]
#[snafu(visibility(pub))]
pub enum ExtractError {
    // Header and entry errors
    #[snafu(display("PKG file size is different"))]
    PkgSizeMismatch,

    #[snafu(display("Content size is bigger than pkg size"))]
    ContentOversize,

    #[snafu(display("failed to read entry: {source}"))]
    ReadEntryFailed { source: neo_pkg::EntryReadError },

    #[snafu(display("entry #{num} has invalid data offset"))]
    InvalidEntryOffset { num: usize },

    #[snafu(display("key derivation failed: {source}"))]
    DeriveKeysFailed { source: neo_pkg::DeriveError },

    // Filesystem errors
    #[snafu(display("cannot create directory {}: {source}", path.display()))]
    CreateDirectoryFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot create file {}: {source}", path.display()))]
    CreateFileFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("cannot write to {}: {source}", path.display()))]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    // PFS errors
    #[snafu(display("PKG does not contain a PFS image"))]
    NoPfsImage,

    #[snafu(display("cannot read the PFS crypto seed"))]
    ReadSeedFailed,

    #[snafu(display("PFS image is present but the key entries are missing"))]
    MissingPfsKeys,

    #[snafu(display("PFS head exceeds the image"))]
    PfsHeadOutOfBounds,

    #[snafu(display("cannot decrypt the PFS head: {source}"))]
    ReadPfsHeadFailed { source: std::io::Error },

    #[snafu(display("no PFSC container in the PFS image"))]
    NoPfscMagic,

    #[snafu(display("cannot parse the PFSC sector map: {source}"))]
    ParseBlockMapFailed { source: neo_pfs::pfsc::ParseError },

    #[snafu(display("cannot read PFS block #{block}: {source}"))]
    ReadPfsBlockFailed {
        block: usize,
        source: std::io::Error,
    },

    #[snafu(display("malformed dirent in block #{block}: {source}"))]
    MalformedDirent {
        block: usize,
        source: neo_pfs::dirent::ReadError,
    },

    #[snafu(display("cannot build the extraction thread pool: {source}"))]
    BuildThreadPoolFailed { source: rayon::ThreadPoolBuildError },
}
