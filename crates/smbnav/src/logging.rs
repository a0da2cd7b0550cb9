//! Tracing setup.
//!
//! Logs go to stderr, and optionally to a daily-rotated file through a
//! non-blocking writer. The returned [`LoggingGuard`] must be kept alive;
//! dropping it flushes and stops the file writer.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Keeps the file writer running until dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Filter for `level`. `verbose` raises plain levels to at least debug.
fn build_filter(level: &str, verbose: bool) -> Result<EnvFilter> {
    let level = level.trim();
    let directive = if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        let level = level.to_lowercase();
        let level = if verbose && matches!(level.as_str(), "info" | "warn" | "error") {
            "debug".to_string()
        } else {
            level
        };
        format!("smbnav={level},protocol={level}")
    };
    EnvFilter::try_new(&directive).with_context(|| format!("Invalid log filter: {}", directive))
}

/// Install the global subscriber.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<LoggingGuard> {
    let filter = build_filter(&config.level, verbose)?;

    let (file_layer, file_writer) = match &config.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .with(file_layer)
        .try_init()
        .context("Logging is already initialized")?;

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}

fn file_writer(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(dir, prefix);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_level_scoped_to_crates() {
        let filter = build_filter("warn", false).unwrap().to_string();
        assert!(filter.contains("smbnav=warn"));
        assert!(filter.contains("protocol=warn"));
    }

    #[test]
    fn test_verbose_raises_level() {
        let filter = build_filter("info", true).unwrap().to_string();
        assert!(filter.contains("smbnav=debug"));

        let filter = build_filter("trace", true).unwrap().to_string();
        assert!(filter.contains("smbnav=trace"));
    }

    #[test]
    fn test_directive_passes_through() {
        assert!(build_filter("smbnav=trace,protocol=off", false).is_ok());
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("logs").join("smbnav.log");

        let (_writer, _guard) = file_writer(&path).unwrap();

        assert!(temp.path().join("logs").is_dir());
    }
}
