use snafu::{Snafu, ensure};
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::{I32, U32},
};

/// Fixed dirent header (16 bytes, little-endian), followed by `namelen`
/// name bytes and padding up to `entsize`.
///
/// Reference: <https://www.psdevwiki.com/ps4/PFS#Dirents>
#[derive(Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct DirentRaw {
    ino: I32,
    ty: U32,
    namelen: U32,
    entsize: U32,
}

/// The smallest well-formed dirent: a 16-byte header plus one name byte
/// rounded up to 8. Anything smaller cannot advance the scan.
pub const MIN_STRIDE: usize = 0x18;

/// Errors when reading a directory entry.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("data too small"))]
    TooSmall,

    #[snafu(display("dirent stride {entsize} is too small"))]
    BadStride { entsize: u32 },

    #[snafu(display("dirent name is out of bounds"))]
    NameOutOfBounds,
}

/// One directory entry borrowed from a logical block.
pub struct Dirent<'a> {
    ino: i32,
    ty: u32,
    entsize: u32,
    name: &'a [u8],
}

impl Dirent<'_> {
    /// `.` of the directory itself.
    pub const SELF: u32 = 1;
    /// `..`
    pub const PARENT: u32 = 2;
    pub const FILE: u32 = 3;
    pub const DIRECTORY: u32 = 4;

    /// Reads one dirent from the front of `raw`.
    ///
    /// Returns `None` for a terminator record (`ino == 0`), which ends the
    /// dirent run of a block. The stride is validated so a malformed entry
    /// can never stall a scan.
    pub fn read(raw: &[u8]) -> Result<Option<Dirent<'_>>, ReadError> {
        let (header, rest) = DirentRaw::read_from_prefix(raw).map_err(|_| TooSmallSnafu.build())?;

        if header.ino.get() == 0 {
            return Ok(None);
        }

        let entsize = header.entsize.get();
        ensure!(entsize as usize >= MIN_STRIDE, BadStrideSnafu { entsize });

        let namelen = header.namelen.get() as usize;
        let name = rest.get(..namelen).ok_or_else(|| NameOutOfBoundsSnafu.build())?;
        ensure!(
            namelen + size_of::<DirentRaw>() <= entsize as usize,
            NameOutOfBoundsSnafu
        );

        Ok(Some(Dirent {
            ino: header.ino.get(),
            ty: header.ty.get(),
            entsize,
            name,
        }))
    }

    /// Returns the inode number this entry references.
    #[must_use]
    pub const fn ino(&self) -> i32 {
        self.ino
    }

    /// Returns the entry type (see the associated constants).
    #[must_use]
    pub const fn ty(&self) -> u32 {
        self.ty
    }

    /// Returns the stride to the next dirent.
    #[must_use]
    pub const fn entsize(&self) -> u32 {
        self.entsize
    }

    /// Returns the raw name bytes.
    #[must_use]
    pub const fn name(&self) -> &[u8] {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirent_bytes(ino: i32, ty: u32, name: &[u8], entsize: u32) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ino.to_le_bytes());
        raw.extend_from_slice(&ty.to_le_bytes());
        raw.extend_from_slice(&(name.len() as u32).to_le_bytes());
        raw.extend_from_slice(&entsize.to_le_bytes());
        raw.extend_from_slice(name);
        raw.resize(raw.len().max(entsize as usize), 0);
        raw
    }

    #[test]
    fn reads_name_and_type() {
        let raw = dirent_bytes(5, Dirent::FILE, b"eboot.bin", 0x20);
        let dirent = Dirent::read(&raw).unwrap().unwrap();

        assert_eq!(dirent.ino(), 5);
        assert_eq!(dirent.ty(), Dirent::FILE);
        assert_eq!(dirent.name(), b"eboot.bin");
        assert_eq!(dirent.entsize(), 0x20);
    }

    #[test]
    fn zero_ino_terminates() {
        let raw = dirent_bytes(0, 0, b"", 0);
        assert!(Dirent::read(&raw).unwrap().is_none());
    }

    #[test]
    fn rejects_stride_below_minimum() {
        let raw = dirent_bytes(1, Dirent::FILE, b"x", 0x10);
        assert!(matches!(
            Dirent::read(&raw),
            Err(ReadError::BadStride { entsize: 0x10 })
        ));
    }

    #[test]
    fn rejects_name_longer_than_stride() {
        let raw = dirent_bytes(1, Dirent::FILE, b"a-very-long-file-name", 0x18);
        assert!(matches!(
            Dirent::read(&raw),
            Err(ReadError::NameOutOfBounds)
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(matches!(
            Dirent::read(&[0u8; 8]),
            Err(ReadError::TooSmall)
        ));
    }
}
