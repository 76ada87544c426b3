//! Logging setup: console plus a plain-text log file.
//!
//! ## Environment Variables
//!
//! - `NUESTRA_PARTE_LOG` or `RUST_LOG`: log filter (e.g. `nuestra_parte_scraper=debug,warn`)
//!
//! `--debug` overrides both with [`DEBUG_FILTER`].

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "nuestra_parte_scraper=info,warn";
pub const DEBUG_FILTER: &str = "nuestra_parte_scraper=debug,info";
pub const DEFAULT_LOG_FILE: &str = "nuestra_parte.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive for both outputs
    pub filter: String,
    /// Appended to on every run; `None` logs to the console only
    pub log_file: Option<PathBuf>,
    /// Include file/line in logs
    pub with_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            with_file: false,
        }
    }
}

impl LogConfig {
    /// Config from environment variables
    pub fn from_env() -> Self {
        Self {
            filter: resolve_filter(
                std::env::var("NUESTRA_PARTE_LOG").ok(),
                std::env::var("RUST_LOG").ok(),
                false,
            ),
            ..Default::default()
        }
    }

    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    /// Debug filter plus source locations
    pub fn with_debug(mut self, debug: bool) -> Self {
        if debug {
            self.filter = DEBUG_FILTER.to_string();
            self.with_file = true;
        }
        self
    }
}

/// `debug` wins, then the app variable, then `RUST_LOG`
pub fn resolve_filter(app: Option<String>, rust_log: Option<String>, debug: bool) -> String {
    if debug {
        return DEBUG_FILTER.to_string();
    }
    app.or(rust_log)
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup; later calls are ignored. A log file that cannot be
/// opened is reported on stderr and the run continues with console output.
pub fn init(config: LogConfig) {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console = fmt::layer()
        .with_target(false)
        .with_file(config.with_file)
        .with_line_number(config.with_file);

    let file_layer = config.log_file.as_deref().and_then(|path| match open_log_file(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_file(config.with_file)
                .with_line_number(config.with_file)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", path.display(), e);
            None
        }
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(resolve_filter(None, None, false), DEFAULT_FILTER);
        assert_eq!(
            resolve_filter(Some("warn".into()), Some("trace".into()), false),
            "warn"
        );
        assert_eq!(resolve_filter(None, Some("trace".into()), false), "trace");
        assert_eq!(resolve_filter(Some("warn".into()), None, true), DEBUG_FILTER);
        assert_eq!(resolve_filter(Some("  ".into()), None, false), DEFAULT_FILTER);
    }

    #[test]
    fn test_debug_config() {
        let config = LogConfig::default().with_debug(true);
        assert!(config.filter.contains("debug"));
        assert!(config.with_file);

        let config = LogConfig::default().with_debug(false);
        assert_eq!(config.filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_log_file_is_created_in_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
