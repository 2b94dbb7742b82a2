//! Console and file logging

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name inside `logs_dir`
pub const LOG_FILE_NAME: &str = "meshgate.log";

const CRATES: &[&str] = &[
    "meshgate_node",
    "meshgate_bridge",
    "meshgate_aprs",
    "meshgate_registry",
];

/// Default filter when `RUST_LOG` is unset
pub fn default_directives(verbose: bool) -> String {
    if !verbose {
        return "info".to_string();
    }
    let mut directives = vec!["info".to_string()];
    directives.extend(CRATES.iter().map(|c| format!("{}=debug", c)));
    directives.join(",")
}

/// Install the global subscriber
///
/// Logs go to stderr, and to `<logs_dir>/meshgate.log` when a directory is
/// given.
pub fn init(verbose: bool, logs_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let file_layer = match logs_dir {
        Some(dir) => {
            let file = open_log_file(&dir.join(LOG_FILE_NAME))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("failed to install the log subscriber")?;
    Ok(())
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(false), "info");
        let verbose = default_directives(true);
        assert!(verbose.starts_with("info,"));
        assert!(verbose.contains("meshgate_bridge=debug"));
        assert!(verbose.contains("meshgate_aprs=debug"));
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join(LOG_FILE_NAME);
        open_log_file(&path).unwrap();
        assert!(path.is_file());
    }
}
