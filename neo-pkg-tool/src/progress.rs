use std::path::Path;

/// Trait for receiving extraction progress updates.
///
/// All methods take `&self` (not `&mut self`) so the progress reporter can
/// be shared across threads during parallel extraction.
pub trait ExtractProgress: Send + Sync {
    /// Called when starting to extract a PKG entry.
    fn entry_start(&self, _path: &Path, _current: usize, _total: usize) {}

    /// Called when all PKG entries have been extracted.
    fn entries_completed(&self, _extracted: usize) {}

    /// Called when starting PFS extraction.
    fn pfs_start(&self, _total_files: usize) {}

    /// Called when a PFS file has been fully extracted.
    fn pfs_file_completed(&self, _written: u64) {}

    /// Called when a PFS file failed and was skipped.
    fn pfs_file_skipped(&self, _name: &str, _reason: &str) {}

    /// Called when PFS extraction is complete.
    fn pfs_completed(&self) {}
}

/// A no-op progress implementation that discards all updates.
pub struct SilentProgress;

impl ExtractProgress for SilentProgress {}

/// Console progress reporter using an indicatif progress bar.
///
/// PFS file extraction redraws a bar at a fixed rate instead of printing
/// one line per file, which keeps worker threads off the stdout lock.
pub struct ConsoleProgress {
    pfs_bar: indicatif::ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            pfs_bar: indicatif::ProgressBar::hidden(),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractProgress for ConsoleProgress {
    fn entries_completed(&self, extracted: usize) {
        println!("Extracted {} PKG entries.", extracted);
    }

    fn pfs_start(&self, total_files: usize) {
        self.pfs_bar
            .set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.pfs_bar.set_length(total_files as u64);
        self.pfs_bar.set_position(0);
        self.pfs_bar.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {pos}/{len} files [{elapsed_precise}]")
                .unwrap()
                .progress_chars("━╸─"),
        );
        self.pfs_bar.reset();
    }

    fn pfs_file_completed(&self, _written: u64) {
        self.pfs_bar.inc(1);
    }

    fn pfs_file_skipped(&self, name: &str, reason: &str) {
        self.pfs_bar
            .println(format!("skipped {}: {}", name, reason));
        self.pfs_bar.inc(1);
    }

    fn pfs_completed(&self) {
        let total = self.pfs_bar.position();
        self.pfs_bar.finish_and_clear();
        println!("PFS extraction complete ({} files).", total);
    }
}
