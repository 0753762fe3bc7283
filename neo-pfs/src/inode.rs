use zerocopy::{
    FromBytes, Immutable, KnownLayout, Unaligned,
    little_endian::{I64, U16, U32, U64},
};

/// Inode records are packed this many bytes apart inside the inode blocks;
/// the bytes past the parsed prefix are reserved.
pub const INODE_STRIDE: usize = 0xA8;

/// Parsed prefix of an on-disk inode (0x68 bytes, little-endian).
#[derive(Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct InodeRaw {
    /// 0x00: Type and permissions; 0 marks an absent record.
    pub mode: U16,
    /// 0x02: Number of links.
    pub nlink: U16,
    /// 0x04: Flags (compressed, readonly, etc.).
    pub flags: U32,
    /// 0x08: Exact size in bytes.
    pub size: I64,
    /// 0x10: Compressed size (same as size for uncompressed).
    pub size_compressed: I64,
    /// 0x18: Access time.
    pub atime: I64,
    /// 0x20: Modification time.
    pub mtime: I64,
    /// 0x28: Change time.
    pub ctime: I64,
    /// 0x30: Creation time.
    pub birthtime: I64,
    /// 0x38: Modification time nanoseconds.
    pub mtimensec: U32,
    /// 0x3C: Access time nanoseconds.
    pub atimensec: U32,
    /// 0x40: Change time nanoseconds.
    pub ctimensec: U32,
    /// 0x44: Creation time nanoseconds.
    pub birthnsec: U32,
    /// 0x48: User ID.
    pub uid: U32,
    /// 0x4C: Group ID.
    pub gid: U32,
    /// 0x50: Reserved.
    pub spare: [U64; 2],
    /// 0x60: Number of logical blocks.
    pub blocks: U32,
    /// 0x64: Index of the first block in the sector map.
    pub loc: U32,
}

/// One parsed inode.
#[derive(Clone, Copy)]
pub struct Inode {
    raw: InodeRaw,
}

impl std::fmt::Debug for Inode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inode")
            .field("mode", &format_args!("0x{:04x}", self.mode()))
            .field("size", &self.size())
            .field("blocks", &self.blocks())
            .field("loc", &self.loc())
            .finish()
    }
}

impl Inode {
    /// Returns the type/permission bits. Zero means the record is absent.
    #[must_use]
    pub fn mode(&self) -> u16 {
        self.raw.mode.get()
    }

    /// Returns the exact byte length of the inode's content.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.raw.size.get().max(0) as u64
    }

    /// Returns the number of logical blocks holding the content.
    #[must_use]
    pub fn blocks(&self) -> u32 {
        self.raw.blocks.get()
    }

    /// Returns the sector-map index of the first content block.
    #[must_use]
    pub fn loc(&self) -> u32 {
        self.raw.loc.get()
    }

    #[must_use]
    pub fn uid(&self) -> u32 {
        self.raw.uid.get()
    }

    #[must_use]
    pub fn gid(&self) -> u32 {
        self.raw.gid.get()
    }

    #[must_use]
    pub const fn raw(&self) -> &InodeRaw {
        &self.raw
    }
}

/// Parses the inodes packed into one logical block.
///
/// Records sit [`INODE_STRIDE`] bytes apart; the first record with a zero
/// `mode` terminates the block. Parsed inodes are appended to `out`.
pub fn parse_block(block: &[u8], out: &mut Vec<Inode>) {
    let mut at = 0;

    while at + size_of::<InodeRaw>() <= block.len() {
        let Ok((raw, _)) = InodeRaw::read_from_prefix(&block[at..]) else {
            break;
        };

        if raw.mode.get() == 0 {
            break;
        }

        out.push(Inode { raw });
        at += INODE_STRIDE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_inode(block: &mut [u8], index: usize, mode: u16, size: i64, blocks: u32, loc: u32) {
        let at = index * INODE_STRIDE;
        block[at..at + 2].copy_from_slice(&mode.to_le_bytes());
        block[at + 0x08..at + 0x10].copy_from_slice(&size.to_le_bytes());
        block[at + 0x60..at + 0x64].copy_from_slice(&blocks.to_le_bytes());
        block[at + 0x64..at + 0x68].copy_from_slice(&loc.to_le_bytes());
    }

    #[test]
    fn raw_prefix_is_0x68_bytes() {
        assert_eq!(size_of::<InodeRaw>(), 0x68);
    }

    #[test]
    fn parses_until_zero_mode() {
        let mut block = vec![0u8; 0x10000];
        put_inode(&mut block, 0, 0x8000, 0x12345, 2, 7);
        put_inode(&mut block, 1, 0x4000, 0, 0, 0);
        // Index 2 stays zeroed and terminates the scan; index 3 must be
        // ignored even though it looks valid.
        put_inode(&mut block, 3, 0x8000, 1, 1, 1);

        let mut inodes = Vec::new();
        parse_block(&block, &mut inodes);

        assert_eq!(inodes.len(), 2);
        assert_eq!(inodes[0].mode(), 0x8000);
        assert_eq!(inodes[0].size(), 0x12345);
        assert_eq!(inodes[0].blocks(), 2);
        assert_eq!(inodes[0].loc(), 7);
        assert_eq!(inodes[1].mode(), 0x4000);
    }

    #[test]
    fn negative_size_clamps_to_zero() {
        let mut block = vec![0u8; INODE_STRIDE * 2];
        put_inode(&mut block, 0, 0x8000, -5, 1, 0);

        let mut inodes = Vec::new();
        parse_block(&block, &mut inodes);
        assert_eq!(inodes[0].size(), 0);
    }
}
