mod error;

pub use self::error::ExtractError;

use crate::progress::ExtractProgress;
use neo_pfs::dirent::Dirent;
use neo_pfs::image::{EncryptedImage, Image};
use neo_pfs::inode::{self, INODE_STRIDE, Inode};
use neo_pfs::pfsc::{self, BlockMap, BlockReader};
use neo_pfs::{LOGICAL_BLOCK_SIZE, SUPERBLOCK_NDINODE_OFFSET};
use neo_pkg::{KeyChain, Pkg};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use snafu::{OptionExt, ensure};
use std::collections::HashMap;
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use self::error::*;

/// Where the PFS tree is rooted relative to the output directory.
///
/// Game PKGs place their tree under `parent(output)/<titleID>`, while
/// updates and DLC extract into the output directory itself. The automatic
/// mode infers the layout from the title ID and the `-UPDATE` suffix; the
/// explicit modes exist because that inference is a heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PfsLayout {
    /// Infer from the title ID and the output path.
    #[default]
    Auto,
    /// The output directory is the PFS root (update layout).
    Update,
    /// The output directory is the PFS root (DLC layout).
    Dlc,
}

/// What one extraction run produced.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractSummary {
    /// PKG entries written under `sce_sys/` (or the output root).
    pub entries: usize,
    /// PFS files fully extracted.
    pub pfs_files: usize,
    /// PFS files skipped after a per-file failure.
    pub pfs_skipped: usize,
}

/// Extracts a PKG file to an output directory.
///
/// Extraction runs in two phases. The single-threaded phase walks the entry
/// table (writing `sce_sys/` and deriving the key chain), decrypts the PFS
/// head, and walks the inode and dirent blocks to build the inode table and
/// the inode-to-path map. The parallel phase then streams every file's
/// logical blocks to disk on a bounded worker pool.
pub struct PkgExtractor<'a, R: AsRef<[u8]> + Sync, P: ExtractProgress> {
    pkg: &'a Pkg<R>,
    progress: P,
    overwrite: bool,
    layout: PfsLayout,
}

impl<'a, R: AsRef<[u8]> + Sync, P: ExtractProgress> PkgExtractor<'a, R, P> {
    /// Creates a new extractor for the given PKG.
    ///
    /// If `overwrite` is `true`, existing files are replaced; otherwise a
    /// pre-existing PFS file fails that file (and only that file).
    pub fn new(pkg: &'a Pkg<R>, progress: P, overwrite: bool, layout: PfsLayout) -> Self {
        Self {
            pkg,
            progress,
            overwrite,
            layout,
        }
    }

    /// Extracts the entire PKG to the specified directory.
    ///
    /// This writes:
    /// - every known PKG entry to `{output}/sce_sys/<name>`, NPDRM entries
    ///   decrypted,
    /// - unknown entries to `{output}/entry_0x<id>.bin`,
    /// - the PFS tree, rooted per [`PfsLayout`].
    pub fn extract(&self, output: impl AsRef<Path>) -> Result<ExtractSummary, ExtractError> {
        let output = output.as_ref();

        self.validate_sizes()?;

        let keys = KeyChain::derive(self.pkg)
            .map_err(|source| ExtractError::DeriveKeysFailed { source })?;

        let mut summary = ExtractSummary {
            entries: self.extract_entries(output, &keys)?,
            ..Default::default()
        };

        self.extract_pfs(output, &keys, &mut summary)?;

        Ok(summary)
    }

    /// Enforces the header size invariants before anything touches disk.
    fn validate_sizes(&self) -> Result<(), ExtractError> {
        let header = self.pkg.header();
        let file_size = self.pkg.raw().len() as u64;

        ensure!(header.pkg_size() <= file_size, PkgSizeMismatchSnafu);

        let content_end = header
            .content_offset()
            .checked_add(header.content_size())
            .context(ContentOversizeSnafu)?;
        ensure!(content_end <= header.pkg_size(), ContentOversizeSnafu);

        Ok(())
    }

    /// Extracts the PKG entry table.
    ///
    /// Known entries land under `sce_sys/` with their canonical names;
    /// unknown ids are dumped to the output root. NPDRM license entries are
    /// written decrypted when `dk3` was recovered, as stored otherwise.
    fn extract_entries(&self, output: &Path, keys: &KeyChain) -> Result<usize, ExtractError> {
        let sce_sys = output.join("sce_sys");
        let total = self.pkg.entry_count();
        let mut extracted = 0;

        for result in self.pkg.entries() {
            let (num, entry) =
                result.map_err(|source| ExtractError::ReadEntryFailed { source })?;

            let path = entry
                .to_path(&sce_sys)
                .unwrap_or_else(|| output.join(format!("entry_0x{:x}.bin", entry.id())));

            self.progress.entry_start(&path, num, total);
            log::debug!("entry #{num}: id=0x{:x} -> {}", entry.id(), path.display());

            let raw = self
                .pkg
                .entry_bytes(&entry)
                .map_err(|_| ExtractError::InvalidEntryOffset { num })?;

            if let Some(parent) = path.parent() {
                create_dir_all(parent).map_err(|e| ExtractError::CreateDirectoryFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            if entry.is_npdrm() {
                let mut data = raw.to_vec();
                if !keys.decrypt_npdrm(&entry, &mut data) {
                    log::warn!(
                        "no dk3 available, writing {} as stored",
                        path.display()
                    );
                }
                write_file(&path, &data)?;
            } else {
                write_file(&path, raw)?;
            }

            extracted += 1;
        }

        if total > 0 {
            self.progress.entries_completed(extracted);
        }

        Ok(extracted)
    }

    /// Decrypts the PFS image and extracts its file tree.
    fn extract_pfs(
        &self,
        output: &Path,
        keys: &KeyChain,
        summary: &mut ExtractSummary,
    ) -> Result<(), ExtractError> {
        let header = self.pkg.header();

        // The decrypted head spans twice the cache size; zero means the PKG
        // carries no PFS content (e.g. a license-only package).
        let head_len = usize::try_from(header.pfs_cache_size() * 2).unwrap_or(usize::MAX);
        if head_len == 0 {
            log::debug!("pfs_cache_size is zero, no PFS content");
            return Ok(());
        }

        let image_raw = self.pkg.pfs_image().context(NoPfsImageSnafu)?;
        let seed = self.pkg.pfs_seed().context(ReadSeedFailedSnafu)?;
        let xts = keys.pfs_keys(&seed).context(MissingPfsKeysSnafu)?;

        let image = EncryptedImage::new(image_raw, &xts.data, &xts.tweak);
        ensure!(head_len as u64 <= image.len(), PfsHeadOutOfBoundsSnafu);

        let mut head = vec![0u8; head_len];
        image
            .read_exact_at(0, &mut head)
            .map_err(|source| ExtractError::ReadPfsHeadFailed { source })?;

        let pfsc_offset = pfsc::locate(&head).context(NoPfscMagicSnafu)?;
        log::debug!("PFSC container at PFS offset 0x{:x}", pfsc_offset);

        let map = BlockMap::parse(&head[pfsc_offset..])
            .map_err(|source| ExtractError::ParseBlockMapFailed { source })?;
        drop(head);

        let reader = BlockReader::new(&image, pfsc_offset as u64, &map);
        let tree = self.walk_tree(&reader, output)?;

        let files: Vec<&FsEntry> = tree
            .table
            .iter()
            .filter(|e| e.ty == Dirent::FILE)
            .collect();
        log::debug!(
            "PFS walk: {} inodes, {} dirents, {} files",
            tree.inodes.len(),
            tree.table.len(),
            files.len()
        );

        self.progress.pfs_start(files.len());

        // Bounded pool; each worker carries only its own scratch buffers.
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(8);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|source| ExtractError::BuildThreadPoolFailed { source })?;

        let skipped = AtomicUsize::new(0);

        pool.install(|| {
            files.par_iter().for_each(|entry| {
                match self.extract_pfs_file(entry, &tree, &reader) {
                    Ok(written) => self.progress.pfs_file_completed(written),
                    Err(e) => {
                        log::warn!("skipping {}: {}", entry.name, e);
                        self.progress.pfs_file_skipped(&entry.name, &e.to_string());
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        });

        self.progress.pfs_completed();

        summary.pfs_skipped = skipped.into_inner();
        summary.pfs_files = files.len() - summary.pfs_skipped;

        Ok(())
    }

    /// Walks the logical blocks and reconstructs the filesystem records.
    ///
    /// Block 0 is the superblock (inode count at 0x30). The following
    /// blocks hold the inode table at a fixed stride. A block whose bytes
    /// 0x10.. read `flat_path_table` starts a uroot dirent run whose
    /// terminator fixes the PFS root directory; a block with the `.`/`..`
    /// signature starts the real dirent run that names every inode.
    /// Directories are created on the spot; the walk ends once every inode
    /// is accounted for.
    fn walk_tree<I: Image>(
        &self,
        reader: &BlockReader<'_, I>,
        output: &Path,
    ) -> Result<PfsTree, ExtractError> {
        let title_id = self.pkg.header().content_id().title_id().to_string();

        let mut tree = PfsTree::default();
        let mut block = vec![0u8; LOGICAL_BLOCK_SIZE];

        let mut ndinode = 0usize;
        let mut inode_blocks = 0usize;
        let mut counted: i64 = 0;
        let mut uroot_reached = false;
        let mut dirents_reached = false;
        let mut current_dir = PathBuf::new();

        'blocks: for i in 0..reader.num_blocks() {
            reader
                .read_block(i, &mut block)
                .map_err(|source| ExtractError::ReadPfsBlockFailed { block: i, source })?;

            if i == 0 {
                ndinode = u32::from_le_bytes(
                    block[SUPERBLOCK_NDINODE_OFFSET..SUPERBLOCK_NDINODE_OFFSET + 4]
                        .try_into()
                        .unwrap(),
                ) as usize;
                inode_blocks = (ndinode * INODE_STRIDE).div_ceil(LOGICAL_BLOCK_SIZE);
                log::debug!("superblock: {ndinode} inodes in {inode_blocks} blocks");
                continue;
            }

            if i <= inode_blocks {
                inode::parse_block(&block, &mut tree.inodes);
            }

            // Some PKGs carry more than one uroot block, so the flag re-arms
            // per block and stays up until a terminator is found.
            if &block[0x10..0x1F] == b"flat_path_table" {
                uroot_reached = true;
            }

            if uroot_reached {
                let mut at = 0usize;
                while at + 0x10 <= LOGICAL_BLOCK_SIZE {
                    match Dirent::read(&block[at..]) {
                        Ok(Some(dirent)) => {
                            counted += 1;
                            at += dirent.entsize() as usize;
                        }
                        Ok(None) => {
                            let root = self.pfs_root(output, &title_id);
                            log::debug!("PFS root for inode slot {counted}: {}", root.display());
                            tree.paths.insert(counted as i32, root);
                            uroot_reached = false;
                            break;
                        }
                        Err(source) => {
                            return Err(ExtractError::MalformedDirent { block: i, source });
                        }
                    }
                }
            }

            if block[0x10] == b'.' && &block[0x28..0x2A] == b".." {
                dirents_reached = true;
            }

            if dirents_reached {
                let mut at = 0usize;
                while at + 0x10 <= LOGICAL_BLOCK_SIZE {
                    let dirent = match Dirent::read(&block[at..]) {
                        Ok(Some(v)) => v,
                        Ok(None) => break,
                        Err(source) => {
                            return Err(ExtractError::MalformedDirent { block: i, source });
                        }
                    };

                    let stride = dirent.entsize() as usize;

                    let Ok(name) = std::str::from_utf8(dirent.name()) else {
                        log::warn!("dirent with non-UTF-8 name in block #{i}");
                        at += stride;
                        continue;
                    };

                    tree.table.push(FsEntry {
                        name: name.to_string(),
                        ino: dirent.ino(),
                        ty: dirent.ty(),
                    });

                    if dirent.ty() == Dirent::SELF {
                        // "." names the directory the following entries
                        // live in.
                        current_dir = tree
                            .paths
                            .get(&dirent.ino())
                            .cloned()
                            .unwrap_or_default();
                    } else {
                        let path = output.join(current_dir.join(name));

                        if dirent.ty() == Dirent::DIRECTORY {
                            create_dir_all(&path).map_err(|e| {
                                ExtractError::CreateDirectoryFailed {
                                    path: path.clone(),
                                    source: e,
                                }
                            })?;
                        }

                        tree.paths.insert(dirent.ino(), path);
                    }

                    if dirent.ty() == Dirent::FILE || dirent.ty() == Dirent::DIRECTORY {
                        counted += 1;
                        // One inode belongs to the image root itself.
                        if counted + 1 == ndinode as i64 {
                            break 'blocks;
                        }
                    }

                    at += stride;
                }
            }
        }

        Ok(tree)
    }

    /// Resolves the directory the PFS tree is rooted at.
    fn pfs_root(&self, output: &Path, title_id: &str) -> PathBuf {
        match self.layout {
            PfsLayout::Update | PfsLayout::Dlc => output.to_path_buf(),
            PfsLayout::Auto => {
                let parent = output.parent().unwrap_or(output);
                let parent_is_title = parent.file_name().is_some_and(|n| n == title_id);
                let is_update = output.to_string_lossy().ends_with("-UPDATE");

                if !parent_is_title && !is_update {
                    parent.join(title_id)
                } else {
                    output.to_path_buf()
                }
            }
        }
    }

    /// Streams one file's logical blocks to disk. Runs on a worker thread;
    /// every failure here is confined to this file.
    fn extract_pfs_file<I: Image>(
        &self,
        entry: &FsEntry,
        tree: &PfsTree,
        reader: &BlockReader<'_, I>,
    ) -> io::Result<u64> {
        let index = usize::try_from(entry.ino)
            .map_err(|_| io::Error::other("negative inode number"))?;
        let inode: &Inode = tree
            .inodes
            .get(index)
            .ok_or_else(|| io::Error::other(format!("no inode #{index}")))?;
        let path = tree
            .paths
            .get(&entry.ino)
            .ok_or_else(|| io::Error::other("no path mapped for inode"))?;

        let loc = inode.loc() as usize;
        let blocks = inode.blocks() as usize;
        let size = inode.size();

        if loc + blocks > reader.num_blocks() {
            return Err(io::Error::other("content range exceeds the sector map"));
        }

        // Workers race on shared parents; already-exists is fine.
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }

        let mut opts = OpenOptions::new();
        opts.write(true);
        if self.overwrite {
            opts.create(true).truncate(true);
        } else {
            opts.create_new(true);
        }
        let mut dest = opts.open(path)?;

        let mut block = vec![0u8; LOGICAL_BLOCK_SIZE];
        let mut written = 0u64;

        for j in 0..blocks {
            reader.read_block(loc + j, &mut block)?;

            // The final block is cut to the exact file size.
            let remaining = size.saturating_sub((j * LOGICAL_BLOCK_SIZE) as u64);
            let n = remaining.min(LOGICAL_BLOCK_SIZE as u64) as usize;

            dest.write_all(&block[..n])?;
            written += n as u64;
        }

        Ok(written)
    }
}

/// Filesystem records recovered by the walk.
#[derive(Default)]
struct PfsTree {
    inodes: Vec<Inode>,
    table: Vec<FsEntry>,
    paths: HashMap<i32, PathBuf>,
}

/// One dirent as recorded in the file table.
struct FsEntry {
    name: String,
    ino: i32,
    ty: u32,
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), ExtractError> {
    let mut file = File::create(path).map_err(|e| ExtractError::CreateFileFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.write_all(data).map_err(|e| ExtractError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
