//! Logging setup: one global `tracing` subscriber writing to a file or stderr.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Filter used when neither the caller nor `RUST_LOG` supplies one.
pub const DEFAULT_FILTER: &str = "info,shardstream=debug,shardstream_core=debug";

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Append to this file, creating its directory if needed.
    File(PathBuf),
    Stderr,
}

impl LogTarget {
    /// `~/.local/state/shardstream/shardstream.log`.
    pub fn state_file() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("shardstream")?;
        Ok(LogTarget::File(xdg_dirs.get_state_home().join("shardstream.log")))
    }
}

/// Explicit `directives` win, then `RUST_LOG`, then [`DEFAULT_FILTER`].
pub fn env_filter(directives: Option<&str>) -> Result<EnvFilter> {
    match directives {
        Some(d) => EnvFilter::try_new(d).with_context(|| format!("invalid log filter {:?}", d)),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber for `target`.
///
/// Errors if the filter does not parse, the log file cannot be opened, or a
/// subscriber is already installed. Nothing is installed on error, so the
/// caller can retry with [`LogTarget::Stderr`].
pub fn init_logging(target: &LogTarget, directives: Option<&str>) -> Result<()> {
    let filter = env_filter(directives)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);

    let installed = match target {
        LogTarget::File(path) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create log dir {}", dir.display()))?;
            }
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).try_init()
        }
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("install log subscriber: {}", e))?;

    tracing::info!(log_target = ?target, "shardstream logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_is_parsed_and_bad_one_rejected() {
        assert!(env_filter(Some("warn,shardstream_core::cache=trace")).is_ok());
        let err = env_filter(Some("shardstream=[[[")).unwrap_err();
        assert!(err.to_string().contains("invalid log filter"));
    }

    #[test]
    fn file_target_receives_lines_and_second_install_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/shardstream.log");
        init_logging(&LogTarget::File(path.clone()), Some("info")).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("logging initialized"), "{written}");

        assert!(init_logging(&LogTarget::Stderr, None).is_err());
    }
}
