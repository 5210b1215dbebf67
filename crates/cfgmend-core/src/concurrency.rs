use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lock file name inside the build tree.
pub const LOCK_FILE_NAME: &str = ".cfgmend.lock";

/// Exclusive advisory lock over a build tree's working config.
///
/// The normalizer reads and rewrites a single file in the tree, so two runs
/// against the same tree must not overlap.
pub struct WorkLock {
    lock_file: File,
    path: PathBuf,
}

impl WorkLock {
    pub fn path_for(tree_dir: &Path) -> PathBuf {
        tree_dir.join(LOCK_FILE_NAME)
    }

    fn open(lock_path: &Path) -> Result<File, CoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?)
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = Self::open(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("acquired {}", lock_path.display());
                Ok(Some(Self {
                    lock_file: file,
                    path: lock_path.to_path_buf(),
                }))
            }
            Err(_) => Ok(None),
        }
    }

    /// Take the tree lock or fail with `CoreError::Locked`.
    pub fn for_tree(tree_dir: &Path) -> Result<Self, CoreError> {
        let path = Self::path_for(tree_dir);
        Self::try_acquire(&path)?.ok_or(CoreError::Locked(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// First Ctrl-C stops the running normalizer or metadata command; the
/// second exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if cfgmend_runtime::interrupt_requested() {
            std::process::exit(130);
        }
        cfgmend_runtime::request_interrupt();
        eprintln!("\ninterrupt requested, stopping current command...");
    });
}
