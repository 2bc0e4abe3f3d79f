//! Temp-file writer for cache entries.
//!
//! Bytes go to a uniquely named `.tmp-*` file inside the cache dir (same
//! filesystem as the final slot), are fsynced with owner-only permissions,
//! then renamed over the final path in one step. Readers only ever see a
//! complete file or no file.

use std::fs::{File, Permissions};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

/// Prefix of in-flight temp files; never a valid cache key.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Owner read/write only.
#[cfg(unix)]
pub(crate) fn owner_only_file() -> Permissions {
    Permissions::from_mode(0o600)
}

/// Writer for one cache entry. Dropped without `finalize`, the temp file is removed.
pub struct CacheWriter {
    file: NamedTempFile,
}

impl CacheWriter {
    /// Create a new temp file in `dir`.
    pub fn create_in(dir: &Path) -> io::Result<Self> {
        let file = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(dir)?;
        Ok(CacheWriter { file })
    }

    /// Reserve `size` bytes up front. On Linux tries `posix_fallocate` so a full
    /// disk fails here rather than mid-write; falls back to `set_len`.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        #[cfg(target_os = "linux")]
        {
            let fd = self.file.as_file().as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file.as_file().set_len(size)
    }

    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)
    }

    /// Path to the current temp file.
    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }

    /// Restrict permissions, fsync, and atomically rename onto `final_path`.
    /// Returns the still-open handle of the renamed file. Fails if
    /// `final_path` is on a different filesystem.
    pub fn finalize(self, final_path: &Path) -> io::Result<File> {
        #[cfg(unix)]
        self.file.as_file().set_permissions(owner_only_file())?;
        self.file.as_file().sync_all()?;
        let file = self.file.persist(final_path).map_err(|e| e.error)?;
        if let Some(parent) = final_path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(file)
    }
}
