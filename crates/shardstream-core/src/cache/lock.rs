//! Per-key exclusive lock shared by threads and processes.
//!
//! Each cache key has a sidecar `.<key>.lock` file. Holding a `KeyLock` means
//! holding an exclusive advisory lock on it; the lock is released when the
//! guard drops. Lock files are left in place: unlinking them would let two
//! holders lock different inodes for the same key.

use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Path of the lock file guarding `key` in `dir`.
pub fn lock_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!(".{}.lock", key))
}

/// Guard for an exclusive per-key lock.
#[derive(Debug)]
pub struct KeyLock {
    file: File,
    path: PathBuf,
}

impl KeyLock {
    /// Block until the exclusive lock for `key` is held.
    pub fn acquire(dir: &Path, key: &str) -> io::Result<Self> {
        let path = lock_path(dir, key);
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        loop {
            match FileExt::lock_exclusive(&file) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(KeyLock { file, path })
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(dir: &Path, key: &str) -> io::Result<Option<Self>> {
        let path = lock_path(dir, key);
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(KeyLock { file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for KeyLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), error = %e, "unlock failed; released on close");
        }
    }
}
