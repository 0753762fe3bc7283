//! A library for parsing PlayStation 4 PKG files.
//!
//! A PKG wraps a small table of metadata entries (`param.sfo`, licenses,
//! NPDRM data) and a large AES-XTS-encrypted PFS image holding the actual
//! game tree. This crate parses the header and entry table and derives the
//! cryptographic key chain; reading the PFS image itself is the job of a
//! separate crate.
//!
//! # Features
//!
//! - Parse PKG headers and metadata (content ID, type, DRM info)
//! - Iterate over PKG entries and resolve their canonical `sce_sys` names
//! - Derive `dk3`, the EKPFS, and the XTS data/tweak keys
//!
//! # Example
//!
//! ```no_run
//! use neo_pkg::Pkg;
//!
//! // Open a PKG from any byte source.
//! let bytes = std::fs::read("game.pkg").unwrap();
//! let pkg = Pkg::new(bytes).unwrap();
//!
//! println!("Content ID: {}", pkg.header().content_id());
//! println!("Entry count: {}", pkg.entry_count());
//!
//! for result in pkg.entries() {
//!     let (index, entry) = result.unwrap();
//!     println!("Entry {}: id=0x{:08X}", index, entry.id());
//! }
//! ```
//!
//! # References
//!
//! - [PS4 Developer Wiki - PKG files](https://www.psdevwiki.com/ps4/PKG_files)

use self::entry::{EntryId, PkgEntry};
use self::header::PkgHeader;
use snafu::{ResultExt, Snafu};

pub mod crypto;
pub mod entry;
pub mod header;
pub mod keys;

pub use self::crypto::{DeriveError, KeyChain, XtsKeys};

/// Offset of the 16-byte crypto seed within the PFS image.
pub const PFS_SEED_OFFSET: u64 = 0x370;

/// A parsed PS4 PKG file.
///
/// Opening a PKG only parses the header and caches the raw `param.sfo`
/// bytes; nothing is decrypted until [`KeyChain::derive()`] runs.
#[must_use]
pub struct Pkg<R: AsRef<[u8]>> {
    raw: R,
    header: PkgHeader,
    sfo: Option<Vec<u8>>,
}

impl<R: AsRef<[u8]>> std::fmt::Debug for Pkg<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pkg")
            .field("header", &self.header)
            .field("entry_count", &self.entry_count())
            .field("has_sfo", &self.sfo.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: AsRef<[u8]>> Pkg<R> {
    /// Creates a new [`Pkg`] from raw bytes.
    ///
    /// Validates the header magic, checks that the entry table lies within
    /// the file, and caches the raw `param.sfo` payload when present.
    pub fn new(raw: R) -> Result<Self, OpenError> {
        let header = PkgHeader::read(raw.as_ref()).context(ReadHeaderFailedSnafu)?;

        // The whole entry table must be addressable before anything walks it.
        let table_end = header.table_offset() + header.entry_count() * PkgEntry::RAW_SIZE;
        if raw.as_ref().len() < table_end {
            return Err(OpenError::InvalidTableOffset);
        }

        let mut pkg = Self {
            raw,
            header,
            sfo: None,
        };
        pkg.load_sfo()?;
        Ok(pkg)
    }

    /// Returns a reference to the PKG header.
    pub fn header(&self) -> &PkgHeader {
        &self.header
    }

    /// Returns the whole PKG as bytes.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        self.raw.as_ref()
    }

    /// Returns the number of entries in the PKG.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.header.entry_count()
    }

    /// Returns the cached raw `param.sfo` bytes, if entry 0x1000 exists.
    #[must_use]
    pub fn sfo(&self) -> Option<&[u8]> {
        self.sfo.as_deref()
    }

    /// Returns an iterator over all entries in the PKG.
    ///
    /// Each item carries the entry index and the entry metadata, in entry
    /// table order. Key derivation depends on that order.
    pub fn entries(&self) -> PkgEntries<'_> {
        PkgEntries {
            raw: self.raw.as_ref(),
            table_offset: self.header.table_offset(),
            current: 0,
            total: self.header.entry_count(),
        }
    }

    /// Returns the raw payload bytes of an entry.
    ///
    /// NPDRM entries come back as stored (encrypted); use
    /// [`KeyChain::decrypt_npdrm()`] to unwrap them.
    pub fn entry_bytes(&self, entry: &PkgEntry) -> Result<&[u8], EntryDataError> {
        self.bytes_at(entry.data_offset(), entry.data_size())
            .ok_or(EntryDataError::InvalidDataOffset)
    }

    /// Finds an entry by its identifier.
    pub fn find_entry(&self, id: EntryId) -> Result<(PkgEntry, usize), FindEntryError> {
        for result in self.entries() {
            let (num, entry) = result.map_err(|source| FindEntryError::ReadFailed { source })?;

            if entry.entry_id() == id {
                return Ok((entry, num));
            }
        }

        Err(FindEntryError::NotFound)
    }

    /// Returns the 16-byte seed stored inside the PFS image header, used to
    /// derive the XTS keys.
    #[must_use]
    pub fn pfs_seed(&self) -> Option<[u8; 16]> {
        let offset = usize::try_from(self.header.pfs_offset() + PFS_SEED_OFFSET).ok()?;
        let raw = self.bytes_at(offset, 16)?;
        raw.try_into().ok()
    }

    /// Returns the encrypted PFS image region.
    ///
    /// The region is clamped to the file when the header claims more bytes
    /// than the file holds.
    #[must_use]
    pub fn pfs_image(&self) -> Option<&[u8]> {
        let raw = self.raw.as_ref();
        let offset = usize::try_from(self.header.pfs_offset()).ok()?;
        let size = usize::try_from(self.header.pfs_size()).ok()?;

        if offset >= raw.len() || size == 0 {
            return None;
        }

        let end = raw.len().min(offset + size);
        Some(&raw[offset..end])
    }

    pub(crate) fn bytes_at(&self, offset: usize, len: usize) -> Option<&[u8]> {
        self.raw.as_ref().get(offset..offset.checked_add(len)?)
    }

    fn load_sfo(&mut self) -> Result<(), OpenError> {
        let entry = match self.find_entry(EntryId::ParamSfo) {
            Ok((entry, _)) => entry,
            Err(FindEntryError::NotFound) => return Ok(()),
            Err(e) => return Err(OpenError::FindSfoFailed { source: e }),
        };

        let raw = self
            .entry_bytes(&entry)
            .map_err(|_| OpenError::InvalidSfoOffset)?;
        self.sfo = Some(raw.to_vec());

        Ok(())
    }
}

/// Iterator over PKG entries.
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct PkgEntries<'a> {
    raw: &'a [u8],
    table_offset: usize,
    current: usize,
    total: usize,
}

impl std::fmt::Debug for PkgEntries<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkgEntries")
            .field("current", &self.current)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

impl Iterator for PkgEntries<'_> {
    type Item = Result<(usize, PkgEntry), EntryReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }

        let num = self.current;
        self.current += 1;

        let offset = self.table_offset + num * PkgEntry::RAW_SIZE;
        let raw = match self.raw.get(offset..(offset + PkgEntry::RAW_SIZE)) {
            Some(v) => v,
            None => return Some(Err(EntryReadError::InvalidOffset { num })),
        };

        Some(
            PkgEntry::read(raw)
                .map_err(|source| EntryReadError::ReadFailed { source })
                .map(|entry| (num, entry)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.current;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PkgEntries<'_> {}

#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum OpenError {
    #[snafu(display("invalid PKG header"))]
    ReadHeaderFailed { source: header::ReadError },

    #[snafu(display("entry table lies outside the file"))]
    InvalidTableOffset,

    #[snafu(display("failed to find param.sfo"))]
    FindSfoFailed { source: FindEntryError },

    #[snafu(display("param.sfo has invalid data offset"))]
    InvalidSfoOffset,
}

use open_error::*;

#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum FindEntryError {
    #[snafu(display("failed to read entry"))]
    ReadFailed { source: EntryReadError },

    #[snafu(display("the specified entry was not found"))]
    NotFound,
}

#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum EntryReadError {
    #[snafu(display("entry #{num} has invalid offset"))]
    InvalidOffset { num: usize },

    #[snafu(display("failed to read entry"))]
    ReadFailed { source: entry::EntryError },
}

#[derive(Debug, Snafu)]
#[snafu(module)]
#[non_exhaustive]
pub enum EntryDataError {
    #[snafu(display("entry has invalid data offset"))]
    InvalidDataOffset,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_pkg(len: usize) -> Vec<u8> {
        let mut raw = vec![0u8; len];
        raw[..4].copy_from_slice(&0x7F434E54u32.to_be_bytes());
        raw
    }

    fn put_entry(raw: &mut [u8], table: usize, index: usize, fields: [u32; 6]) {
        let at = table + index * 32;
        for (j, v) in fields.iter().enumerate() {
            raw[at + j * 4..at + j * 4 + 4].copy_from_slice(&v.to_be_bytes());
        }
    }

    #[test]
    fn open_zeroed_file_reports_bad_magic() {
        let err = Pkg::new(vec![0u8; 0x1000]).unwrap_err();
        assert!(err.to_string().contains("header"));
        assert!(matches!(
            err,
            OpenError::ReadHeaderFailed {
                source: header::ReadError::InvalidMagic
            }
        ));
    }

    #[test]
    fn open_rejects_out_of_file_table() {
        let mut raw = base_pkg(0x1000);
        raw[0x10..0x14].copy_from_slice(&4u32.to_be_bytes());
        raw[0x18..0x1C].copy_from_slice(&0x1000u32.to_be_bytes());

        assert!(matches!(
            Pkg::new(raw),
            Err(OpenError::InvalidTableOffset)
        ));
    }

    #[test]
    fn entries_iterate_in_table_order() {
        let mut raw = base_pkg(0x2000);
        raw[0x10..0x14].copy_from_slice(&2u32.to_be_bytes());
        raw[0x18..0x1C].copy_from_slice(&0x1000u32.to_be_bytes());
        put_entry(&mut raw, 0x1000, 0, [0x10, 0, 0, 0, 0x1800, 0x20]);
        put_entry(&mut raw, 0x1000, 1, [0x20, 0, 0, 0, 0x1900, 0x20]);

        let pkg = Pkg::new(raw).unwrap();
        let ids: Vec<u32> = pkg
            .entries()
            .map(|r| r.unwrap().1.id())
            .collect();
        assert_eq!(ids, [0x10, 0x20]);
        assert_eq!(pkg.entries().len(), 2);
    }

    #[test]
    fn sfo_is_cached_at_open() {
        let mut raw = base_pkg(0x2000);
        raw[0x10..0x14].copy_from_slice(&1u32.to_be_bytes());
        raw[0x18..0x1C].copy_from_slice(&0x1000u32.to_be_bytes());
        put_entry(&mut raw, 0x1000, 0, [0x1000, 0, 0, 0, 0x1800, 4]);
        raw[0x1800..0x1804].copy_from_slice(b"\0PSF");

        let pkg = Pkg::new(raw).unwrap();
        assert_eq!(pkg.sfo(), Some(b"\0PSF".as_slice()));
    }

    #[test]
    fn pfs_seed_reads_at_fixed_offset() {
        let mut raw = base_pkg(0x3000);
        raw[0x410..0x418].copy_from_slice(&0x2000u64.to_be_bytes());
        raw[0x2000 + 0x370..0x2000 + 0x380].copy_from_slice(&[7u8; 16]);

        let pkg = Pkg::new(raw).unwrap();
        assert_eq!(pkg.pfs_seed(), Some([7u8; 16]));
    }

    #[test]
    fn pfs_image_is_clamped_to_file() {
        let mut raw = base_pkg(0x3000);
        raw[0x410..0x418].copy_from_slice(&0x2000u64.to_be_bytes());
        raw[0x418..0x420].copy_from_slice(&0x10000u64.to_be_bytes());

        let pkg = Pkg::new(raw).unwrap();
        assert_eq!(pkg.pfs_image().map(|s| s.len()), Some(0x1000));
    }
}
