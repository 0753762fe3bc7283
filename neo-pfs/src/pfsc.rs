//! PFSC compressed-block container.
//!
//! A PFSC sits inside the decrypted PFS image and carries the filesystem as
//! a run of 64 KiB logical blocks, each stored either raw or zlib-deflated.
//! A sector map of `num_blocks + 1` offsets locates the stored bytes; the
//! stored size `map[i+1] - map[i]` decides how block `i` is materialized.

use flate2::FlushDecompress;
use std::io::{self, ErrorKind};
use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::{U32, U64},
};

use crate::image::Image;
use snafu::{Snafu, ensure};

/// `PFSC` as a little-endian integer.
const PFSC_MAGIC: u32 = 0x43534650;

/// Magic scan starts here and advances one logical block at a time.
const SCAN_START: usize = 0x20000;

/// PFSC header (48 bytes, little-endian).
#[derive(Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct PfscHeaderRaw {
    /// 0x00: 0x43534650
    magic: U32,
    /// 0x04: Unknown
    _unknown_04: U32,
    /// 0x08: Unknown
    _unknown_08: U32,
    /// 0x0C: Compressed block size
    block_size: U32,
    /// 0x10: Logical (uncompressed) block size, 0x10000 in practice
    block_size2: U64,
    /// 0x18: Offset of the sector map within the PFSC
    block_offsets: U64,
    /// 0x20: Offset of the data area
    data_start: U64,
    /// 0x28: Logical (uncompressed) data length
    data_length: U64,
}

/// Errors when parsing a PFSC sector map.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ParseError {
    #[snafu(display("data too small"))]
    TooSmall,

    #[snafu(display("invalid PFSC magic"))]
    InvalidMagic,

    #[snafu(display("invalid logical block size"))]
    InvalidBlockSize,

    #[snafu(display("sector map lies outside the PFSC"))]
    MapOutOfBounds,

    #[snafu(display("sector map entry #{index} decreases"))]
    MapNotMonotonic { index: usize },

    #[snafu(display("sector map exceeds the data length"))]
    MapExceedsData,
}

/// Scans a decrypted PFS head for the PFSC magic.
///
/// The container never starts before 0x20000 and is always aligned to a
/// logical block.
#[must_use]
pub fn locate(head: &[u8]) -> Option<usize> {
    let mut at = SCAN_START;

    while at + 4 <= head.len() {
        let value = u32::from_le_bytes(head[at..at + 4].try_into().unwrap());
        if value == PFSC_MAGIC {
            return Some(at);
        }
        at += 0x10000;
    }

    None
}

/// Parsed PFSC header plus sector map.
#[must_use]
pub struct BlockMap {
    block_size: u64,
    data_length: u64,
    offsets: Vec<u64>,
}

impl std::fmt::Debug for BlockMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockMap")
            .field("block_size", &self.block_size)
            .field("data_length", &self.data_length)
            .field("num_blocks", &self.num_blocks())
            .finish()
    }
}

impl BlockMap {
    /// Parses the PFSC header and sector map from the container bytes.
    ///
    /// `pfsc` must start at the PFSC magic. Only the header and map area are
    /// inspected; block data may extend past the slice (the slice typically
    /// covers just the decrypted head of the image).
    pub fn parse(pfsc: &[u8]) -> Result<Self, ParseError> {
        let (header, _) = PfscHeaderRaw::read_from_prefix(pfsc).map_err(|_| TooSmallSnafu.build())?;

        ensure!(header.magic.get() == PFSC_MAGIC, InvalidMagicSnafu);

        let block_size = header.block_size2.get();
        ensure!(block_size != 0, InvalidBlockSizeSnafu);

        let data_length = header.data_length.get();
        let num_blocks = (data_length / block_size) as usize;

        // One extra offset closes the last block.
        let map_start = usize::try_from(header.block_offsets.get()).map_err(|_| MapOutOfBoundsSnafu.build())?;
        let map_len = (num_blocks + 1) * 8;
        let map_end = map_start
            .checked_add(map_len)
            .ok_or_else(|| MapOutOfBoundsSnafu.build())?;
        let map_raw = pfsc
            .get(map_start..map_end)
            .ok_or_else(|| MapOutOfBoundsSnafu.build())?;

        let mut offsets = Vec::with_capacity(num_blocks + 1);
        for chunk in map_raw.chunks_exact(8) {
            offsets.push(u64::from_le_bytes(chunk.try_into().unwrap()));
        }

        for (index, pair) in offsets.windows(2).enumerate() {
            ensure!(pair[0] <= pair[1], MapNotMonotonicSnafu { index });
        }
        ensure!(
            offsets.last().is_none_or(|&last| last <= data_length),
            MapExceedsDataSnafu
        );

        Ok(Self {
            block_size,
            data_length,
            offsets,
        })
    }

    /// Returns the logical block size (0x10000 for every known PKG).
    #[must_use]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Returns the logical data length.
    #[must_use]
    pub fn data_length(&self) -> u64 {
        self.data_length
    }

    /// Returns the number of logical blocks.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Returns `(stored_offset, stored_size)` of block `i`, relative to the
    /// PFSC start.
    #[must_use]
    pub fn stored_range(&self, i: usize) -> Option<(u64, u64)> {
        let start = *self.offsets.get(i)?;
        let end = *self.offsets.get(i + 1)?;
        Some((start, end - start))
    }
}

/// Reads logical blocks out of a PFSC through an [`Image`].
///
/// The image addresses the whole PFS; `pfsc_offset` anchors the container
/// inside it. Stored bytes pass through the image layer (which transparently
/// handles sector decryption and alignment) and are inflated here when the
/// stored size says the block is compressed. All state is per-call, so one
/// reader serves many threads.
pub struct BlockReader<'a, I: Image> {
    image: &'a I,
    pfsc_offset: u64,
    map: &'a BlockMap,
}

impl<'a, I: Image> BlockReader<'a, I> {
    pub fn new(image: &'a I, pfsc_offset: u64, map: &'a BlockMap) -> Self {
        Self {
            image,
            pfsc_offset,
            map,
        }
    }

    /// Returns the number of logical blocks.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.map.num_blocks()
    }

    /// Materializes logical block `num` into `out`.
    ///
    /// `out` must be exactly one logical block. A stored size equal to the
    /// block size is copied through; smaller is inflated; larger marks a
    /// sparse block and yields zeros.
    pub fn read_block(&self, num: usize, out: &mut [u8]) -> io::Result<()> {
        debug_assert_eq!(out.len() as u64, self.map.block_size());

        let (offset, size) = self
            .map
            .stored_range(num)
            .ok_or_else(|| io::Error::from(ErrorKind::InvalidInput))?;

        match size.cmp(&self.map.block_size()) {
            std::cmp::Ordering::Less => {
                let mut compressed = vec![0u8; size as usize];
                self.image
                    .read_exact_at(self.pfsc_offset + offset, &mut compressed)?;

                self.inflate_block(num, &compressed, out)?;
            }

            std::cmp::Ordering::Equal => {
                // Uncompressed, read straight through.
                self.image.read_exact_at(self.pfsc_offset + offset, out)?;
            }

            std::cmp::Ordering::Greater => {
                // Sparse / hole block.
                out.fill(0);
            }
        }

        Ok(())
    }

    /// Inflates one stored block to exactly the logical block size.
    fn inflate_block(&self, num: usize, compressed: &[u8], out: &mut [u8]) -> io::Result<()> {
        let mut inflate = flate2::Decompress::new(true);

        let status = inflate
            .decompress(compressed, out, FlushDecompress::Finish)
            .map_err(io::Error::other)?;

        if status != flate2::Status::StreamEnd || inflate.total_out() as usize != out.len() {
            return Err(io::Error::other(format!(
                "invalid data on PFSC block #{}",
                num
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::SliceImage;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// Builds a 3-block PFSC: raw, compressed, sparse.
    fn sample_pfsc() -> (Vec<u8>, Vec<u8>) {
        const BLOCK: usize = 0x100;

        let raw_block: Vec<u8> = (0..BLOCK).map(|i| (i % 251) as u8).collect();
        let packed_block = vec![0x3Cu8; BLOCK];
        let compressed = zlib(&packed_block);
        assert!(compressed.len() < 0xC0, "pattern must deflate well");

        let data_start = 0x60u64;
        let offsets = [
            data_start,
            data_start + BLOCK as u64,
            data_start + BLOCK as u64 + compressed.len() as u64,
            0x360,
        ];

        let mut pfsc = vec![0u8; 0x360];
        pfsc[0x00..0x04].copy_from_slice(&PFSC_MAGIC.to_le_bytes());
        pfsc[0x10..0x18].copy_from_slice(&(BLOCK as u64).to_le_bytes());
        pfsc[0x18..0x20].copy_from_slice(&0x30u64.to_le_bytes());
        pfsc[0x28..0x30].copy_from_slice(&0x360u64.to_le_bytes());

        for (i, off) in offsets.iter().enumerate() {
            pfsc[0x30 + i * 8..0x38 + i * 8].copy_from_slice(&off.to_le_bytes());
        }

        pfsc[0x60..0x60 + BLOCK].copy_from_slice(&raw_block);
        pfsc[0x160..0x160 + compressed.len()].copy_from_slice(&compressed);

        (pfsc, raw_block)
    }

    #[test]
    fn locate_finds_magic_at_block_stride() {
        let mut head = vec![0u8; 0x40000];
        head[0x30000..0x30004].copy_from_slice(&PFSC_MAGIC.to_le_bytes());

        assert_eq!(locate(&head), Some(0x30000));
    }

    #[test]
    fn locate_ignores_unaligned_magic() {
        let mut head = vec![0u8; 0x40000];
        head[0x30004..0x30008].copy_from_slice(&PFSC_MAGIC.to_le_bytes());

        assert_eq!(locate(&head), None);
    }

    #[test]
    fn locate_skips_the_first_two_blocks() {
        let mut head = vec![0u8; 0x40000];
        head[0x10000..0x10004].copy_from_slice(&PFSC_MAGIC.to_le_bytes());

        assert_eq!(locate(&head), None);
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let pfsc = vec![0u8; 0x100];
        assert!(matches!(
            BlockMap::parse(&pfsc),
            Err(ParseError::InvalidMagic)
        ));
    }

    #[test]
    fn parse_rejects_decreasing_map() {
        let (mut pfsc, _) = sample_pfsc();
        // Swap two offsets so the map decreases.
        pfsc[0x38..0x40].copy_from_slice(&0x20u64.to_le_bytes());

        assert!(matches!(
            BlockMap::parse(&pfsc),
            Err(ParseError::MapNotMonotonic { index: 0 })
        ));
    }

    #[test]
    fn parse_rejects_map_past_data_length() {
        let (mut pfsc, _) = sample_pfsc();
        pfsc[0x48..0x50].copy_from_slice(&0x1000u64.to_le_bytes());

        assert!(matches!(
            BlockMap::parse(&pfsc),
            Err(ParseError::MapExceedsData)
        ));
    }

    #[test]
    fn reads_raw_compressed_and_sparse_blocks() {
        let (pfsc, raw_block) = sample_pfsc();
        let map = BlockMap::parse(&pfsc).unwrap();
        assert_eq!(map.num_blocks(), 3);

        let image = SliceImage::new(&pfsc);
        let reader = BlockReader::new(&image, 0, &map);
        let mut out = vec![0u8; 0x100];

        reader.read_block(0, &mut out).unwrap();
        assert_eq!(out, raw_block);

        reader.read_block(1, &mut out).unwrap();
        assert_eq!(out, vec![0x3Cu8; 0x100]);

        reader.read_block(2, &mut out).unwrap();
        assert_eq!(out, vec![0u8; 0x100]);

        assert!(reader.read_block(3, &mut out).is_err());
    }

    #[test]
    fn truncated_deflate_stream_is_an_error() {
        let (pfsc, _) = sample_pfsc();
        let map = BlockMap::parse(&pfsc).unwrap();

        // Cut the compressed stream short by shrinking the stored range.
        let image = SliceImage::new(&pfsc[..0x165]);
        let reader = BlockReader::new(&image, 0, &map);
        let mut out = vec![0u8; 0x100];

        assert!(reader.read_block(1, &mut out).is_err());
    }
}
