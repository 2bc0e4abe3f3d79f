pub mod config;
pub mod logging;

pub mod cache;
pub mod checksum;
pub mod control;
pub mod fetcher;
pub mod manifest;
pub mod pipeline;
pub mod retry;
pub mod stream;
pub mod transport;
pub mod url_model;

pub use fetcher::{ShardError, ShardFetcher};
pub use manifest::{Manifest, ManifestError, ManifestResolver, ShardDescriptor};
pub use pipeline::{Pipeline, PipelineError};
pub use stream::{BatchStream, BatchStreamer, DataBatch, StreamReport};
