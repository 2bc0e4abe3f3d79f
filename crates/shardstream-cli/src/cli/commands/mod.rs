//! CLI command handlers, one per file.

mod checksum;
mod digest;
mod fetch;
mod stream;
mod summary;

pub use checksum::run_checksum;
pub use digest::run_digest;
pub use fetch::run_fetch;
pub use stream::run_stream;
