//! Content-addressed local cache for verified shard payloads.
//!
//! Slots live at `<cache_dir>/<key>` where the key comes from
//! [`crate::url_model::cache_key`]. An entry is only served while the file's
//! recomputed SHA3-256 equals the hash the caller expects; a mismatch deletes
//! the file during the lookup itself. A returned [`CacheEntry`] carries the
//! open handle whose bytes were hashed, so later readers see that content even
//! if another writer renames new bytes into the slot.
//!
//! The directory is shared by worker threads and by other processes. Writes go
//! through a temp file plus atomic rename while holding the key's exclusive lock.

mod lock;
mod writer;

pub use lock::{lock_path, KeyLock};
pub use writer::{CacheWriter, TEMP_PREFIX};

use crate::checksum::{digests_match, sha3_256_hex, sha3_256_reader};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Errors from cache I/O.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache directory {path}: {source}")]
    Dir { path: PathBuf, source: io::Error },
    #[error("cache I/O on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),
}

/// A verified file in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub local_path: PathBuf,
    pub content_hash: String,
    file: Arc<File>,
}

impl CacheEntry {
    /// Handle to the exact inode that was verified. Read through this rather
    /// than reopening `local_path`, which may since have been replaced.
    pub fn file(&self) -> &File {
        &self.file
    }
}

/// Handle to a cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Create (if needed) the cache directory and restrict it to the owner.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::Dir {
            path: dir.clone(),
            source,
        })?;
        #[cfg(unix)]
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700)).map_err(
            |source| CacheError::Dir {
                path: dir.clone(),
                source,
            },
        )?;
        Ok(CacheStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of the slot for `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        check_key(key)?;
        Ok(self.dir.join(key))
    }

    /// Return the entry for `key` if its content hashes to `expected_hash`.
    ///
    /// A missing file is a miss. A file with the wrong hash is removed (under
    /// the key lock, after re-checking, so a concurrent `put` is never undone)
    /// and reported as a miss.
    pub fn get(&self, key: &str, expected_hash: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key)?;
        match hash_file(&path)? {
            None => return Ok(None),
            Some((file, actual)) if digests_match(&actual, expected_hash) => {
                return Ok(Some(CacheEntry {
                    local_path: path,
                    content_hash: actual,
                    file: Arc::new(file),
                }));
            }
            Some(_) => {}
        }

        let _lock = self.lock(key)?;
        match hash_file(&path)? {
            None => Ok(None),
            Some((file, actual)) if digests_match(&actual, expected_hash) => Ok(Some(CacheEntry {
                local_path: path,
                content_hash: actual,
                file: Arc::new(file),
            })),
            Some((_, actual)) => {
                tracing::warn!(
                    key,
                    expected = expected_hash,
                    actual = %actual,
                    "cached shard failed verification, evicting"
                );
                remove_if_exists(&path)?;
                Ok(None)
            }
        }
    }

    /// Store `data` under `key`, replacing any previous content, and return the entry.
    pub fn put(&self, key: &str, data: &[u8]) -> Result<CacheEntry, CacheError> {
        let path = self.path_for(key)?;
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        let _lock = self.lock(key)?;
        let mut w = CacheWriter::create_in(&self.dir).map_err(io_err)?;
        w.preallocate(data.len() as u64).map_err(io_err)?;
        w.write_all(data).map_err(io_err)?;
        let file = w.finalize(&path).map_err(io_err)?;
        tracing::debug!(key, bytes = data.len(), "cached shard");

        Ok(CacheEntry {
            local_path: path,
            content_hash: sha3_256_hex(data),
            file: Arc::new(file),
        })
    }

    /// Remove the entry for `key`, if any.
    pub fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key)?;
        let _lock = self.lock(key)?;
        remove_if_exists(&path)
    }

    fn lock(&self, key: &str) -> Result<KeyLock, CacheError> {
        KeyLock::acquire(&self.dir, key).map_err(|source| CacheError::Io {
            path: lock_path(&self.dir, key),
            source,
        })
    }
}

fn check_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty()
        || key.starts_with('.')
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
    {
        return Err(CacheError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Open `path` and hash it through the same handle.
fn hash_file(path: &Path) -> Result<Option<(File, String)>, CacheError> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    sha3_256_reader(&mut f)
        .map(|digest| Some((f, digest)))
        .map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CacheError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
