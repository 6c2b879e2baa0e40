//! Logging setup: console output plus an append-only run log
//!
//! Every run appends a separator line to the run log before the first entry,
//! so consecutive runs stay distinguishable in one file. Each entry is written
//! as `<timestamp> <LEVEL> <message>`.

use crate::error::{EtlError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Separator written at the start of each run
pub const RUN_SEPARATOR: &str = "--- New ETL Process Run ---";

/// Directives applied unless overridden, to keep client chatter out of the run log
const DEFAULT_DIRECTIVES: &str = "aws_config=warn,aws_smithy_runtime=warn,hyper=warn,sqlx=warn";

/// Logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// Run log file, opened in append mode
    pub path: PathBuf,

    /// Minimum level written to console and file
    pub level: Level,

    /// Extra filter directives (e.g. "sqlx=debug")
    pub filter_directives: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("etl.log"),
            level: Level::INFO,
            filter_directives: DEFAULT_DIRECTIVES.to_string(),
        }
    }
}

impl LogConfig {
    /// Environment variables:
    /// - `ETL_LOG_FILE`: run log path
    /// - `ETL_LOG_LEVEL`: trace, debug, info, warn, error
    /// - `ETL_LOG_FILTER`: filter directives
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = var("ETL_LOG_FILE") {
            config.path = PathBuf::from(path);
        }

        if let Some(level) = var("ETL_LOG_LEVEL") {
            config.level = Level::from_str(level.trim())
                .map_err(|_| EtlError::Config(format!("Invalid log level: {}", level)))?;
        }

        if let Some(filter) = var("ETL_LOG_FILTER") {
            config.filter_directives = filter;
        }

        Ok(config)
    }
}

/// Append the run separator to the run log, creating the file if needed
pub fn start_run_log(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| EtlError::io(parent, e))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EtlError::io(path, e))?;

    write!(file, "\n\n{}\n", RUN_SEPARATOR).map_err(|e| EtlError::io(path, e))?;

    Ok(())
}

/// Install the global subscriber: stdout plus the run log file
///
/// `RUST_LOG` is honored on top of the configured level.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    build_subscriber(config)?
        .try_init()
        .map_err(|e| EtlError::Config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Subscriber writing to stdout and, without ANSI colors, to the run log
pub fn build_subscriber(
    config: &LogConfig,
) -> Result<impl Subscriber + Send + Sync + 'static> {
    let mut filter = EnvFilter::from_default_env().add_directive(config.level.into());

    for directive in config
        .filter_directives
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        filter = filter.add_directive(directive.parse().map_err(|e| {
            EtlError::Config(format!("Invalid log filter directive {}: {}", directive, e))
        })?);
    }

    let dir = config
        .path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = config
        .path
        .file_name()
        .ok_or_else(|| EtlError::Config(format!("Invalid log file path: {:?}", config.path)))?;
    let file_appender = tracing_appender::rolling::never(dir, file_name);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(false);

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer))
}
