//! Slice a cached shard file into fixed-size batches.
//!
//! A shard is a flat array of little-endian `f32` samples. It is memory-mapped
//! read-only and cut into `ceil(N / batch_size)` batches; only the last batch
//! may be short.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

/// Bytes per sample.
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();

/// One training batch drawn from a single shard.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBatch {
    /// Position of the source shard in the manifest.
    pub shard_index: usize,
    /// Position of this batch within its shard.
    pub batch_index: usize,
    features: Vec<f32>,
}

impl DataBatch {
    /// Key under which the sample array is exposed.
    pub const FEATURES: &'static str = "features";

    pub fn new(shard_index: usize, batch_index: usize, features: Vec<f32>) -> Self {
        Self {
            shard_index,
            batch_index,
            features,
        }
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    /// Keyed access. `features` is the only key.
    pub fn get(&self, key: &str) -> Option<&[f32]> {
        (key == Self::FEATURES).then_some(self.features.as_slice())
    }

    pub fn into_features(self) -> Vec<f32> {
        self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    #[error("read shard {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("shard {path} is {len} bytes, not a whole number of f32 samples")]
    Misaligned { path: PathBuf, len: u64 },
}

/// Number of batches a shard of `samples` samples yields.
pub fn batch_count(samples: usize, batch_size: usize) -> usize {
    samples.div_ceil(batch_size.max(1))
}

/// Open `path` and cut it into batches of at most `batch_size` samples.
pub fn slice_shard(
    path: &Path,
    shard_index: usize,
    batch_size: usize,
) -> Result<Vec<DataBatch>, SliceError> {
    let file = File::open(path).map_err(|source| SliceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    slice_file(&file, path, shard_index, batch_size)
}

/// Map an already open shard file and cut it into batches. `path` is only
/// used in errors; the bytes come from `file`.
pub fn slice_file(
    file: &File,
    path: &Path,
    shard_index: usize,
    batch_size: usize,
) -> Result<Vec<DataBatch>, SliceError> {
    let io = |source| SliceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let len = file.metadata().map_err(io)?.len();
    if len % SAMPLE_BYTES as u64 != 0 {
        return Err(SliceError::Misaligned {
            path: path.to_path_buf(),
            len,
        });
    }
    if len == 0 {
        // Zero-length files cannot be mapped.
        return Ok(Vec::new());
    }

    // SAFETY: cache entries are replaced by rename, never truncated in place,
    // so the mapped inode keeps its length for the lifetime of the map.
    let map = unsafe { Mmap::map(file) }.map_err(io)?;
    let chunk = batch_size.max(1) * SAMPLE_BYTES;
    Ok(map
        .chunks(chunk)
        .enumerate()
        .map(|(batch_index, bytes)| DataBatch::new(shard_index, batch_index, decode(bytes)))
        .collect())
}

fn decode(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Encode samples in the on-disk shard format.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
