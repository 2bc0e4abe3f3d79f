use clap::Parser;
use shardstream_core::logging::{self, LogTarget};

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());

    if let Err(err) = cli.run().await {
        eprintln!("shardstream error: {:#}", err);
        std::process::exit(1);
    }
}

/// Log to the XDG state file, falling back to stderr if the state dir is unusable.
fn init_logging(filter: Option<&str>) {
    let file = LogTarget::state_file().and_then(|t| logging::init_logging(&t, filter));
    let Err(file_err) = file else {
        return;
    };
    match logging::init_logging(&LogTarget::Stderr, filter) {
        Ok(()) => tracing::warn!("file logging unavailable, using stderr: {:#}", file_err),
        Err(e) => eprintln!("shardstream: logging disabled: {:#}", e),
    }
}
