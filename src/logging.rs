use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Routes `tracing` events to an append-only log file. `RUST_LOG` wins when
/// set; otherwise the level is `info`, or `debug` when `verbose`.
pub fn init_logging(log_path: &Path, verbose: bool) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create log directory {:?}", parent))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Could not open log file {:?}", log_path))?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Could not install log subscriber: {}", e))
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "termpal=debug"
    } else {
        "termpal=info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_verbose_raises_level() {
        assert_eq!(default_directive(false), "termpal=info");
        assert_eq!(default_directive(true), "termpal=debug");
    }

    #[test]
    fn test_creates_log_file_and_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("assistant.log");

        // A global subscriber may already be installed by another test.
        let _ = init_logging(&path, false);
        assert!(path.exists());
    }
}
