//! Centralized logging configuration for tracepin
//!
//! tracepin runs inside a host process, so it never assumes it owns the global
//! subscriber: [`try_init`] and [`init_from_settings`] report an error when
//! the host already installed one instead of panicking.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracepin_logging::{init, LogConfig, LogOutput};
//!
//! // Standalone host with defaults
//! init(LogConfig::default());
//!
//! // Embedded in a host that reserves stdout
//! init(LogConfig::new().output(LogOutput::Stderr));
//!
//! // From the [logging] config section
//! let guard = init_from_settings(&config.logging)?;
//! // Guard must be held for the duration of the program
//! ```
//!
//! # Re-exports
//!
//! Commonly used tracing macros are re-exported:
//! - `trace!`, `debug!`, `info!`, `warn!`, `error!`
//! - `span!`, `Level`
//! - `instrument` attribute macro

use std::io::IsTerminal;
use std::path::Path;
use tracepin_config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::{debug, error, info, span, trace, warn, Level};

pub use tracing::instrument;

pub use tracing;

// Re-export WorkerGuard for file logging lifetime management
pub use tracing_appender::non_blocking::WorkerGuard;

/// Fallback file name when the configured log path has none
const DEFAULT_LOG_FILENAME: &str = "tracepin.log";

/// Errors raised while installing the global subscriber
#[derive(Debug, thiserror::Error)]
pub enum LogInitError {
    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),

    #[error("Failed to prepare log file: {0}")]
    Io(#[from] std::io::Error),
}

/// Output destination for logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogOutput {
    #[default]
    Stdout,
    /// Write logs to stderr (hosts that reserve stdout)
    Stderr,
    /// Write logs to a file (requires [`init_with_file`])
    File,
}

/// Timestamp format for log output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampFormat {
    #[default]
    Local,
    Utc,
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Enable debug-level logging (overrides default_level and RUST_LOG)
    pub debug: bool,
    /// Default log level when RUST_LOG is not set
    pub default_level: String,
    pub output: LogOutput,
    /// Show module target in log output
    pub show_target: bool,
    pub timestamp_format: TimestampFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_level: "info".to_string(),
            output: LogOutput::Stdout,
            show_target: false,
            timestamp_format: TimestampFormat::default(),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the `[logging]` config section
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        let output = if settings.file.is_some() {
            LogOutput::File
        } else {
            LogOutput::Stderr
        };
        Self::new()
            .debug(settings.debug)
            .default_level(settings.level.clone())
            .output(output)
            .show_target(true)
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Use UTC timestamps
    pub fn utc(self) -> Self {
        self.timestamp_format(TimestampFormat::Utc)
    }

    /// Convenience: Configure for tests
    pub fn test() -> Self {
        Self::new().default_level("debug")
    }

    fn build_filter(&self) -> EnvFilter {
        if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_level))
        }
    }
}

/// Initialize the logging system, panicking if a subscriber already exists.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Override log level (e.g., `RUST_LOG=tracepin_application=trace`)
///
/// For file logging, use [`init_with_file`] instead.
pub fn init(config: LogConfig) {
    if let Err(e) = try_init(config) {
        panic!("{}", e);
    }
}

/// Initialize the logging system, returning an error if a subscriber exists.
pub fn try_init(config: LogConfig) -> Result<(), LogInitError> {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    // Helper macro to apply timer and init (avoids type-level branching duplication)
    macro_rules! with_timer_try_init {
        ($builder:expr, $ts_format:expr) => {
            match $ts_format {
                TimestampFormat::Utc => $builder.with_timer(UtcTime::rfc_3339()).try_init(),
                TimestampFormat::Local => $builder.with_timer(LocalTime::rfc_3339()).try_init(),
            }
        };
    }

    let result = match config.output {
        LogOutput::Stdout => {
            let is_tty = std::io::stdout().is_terminal();
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_ansi(is_tty);
            with_timer_try_init!(builder, config.timestamp_format)
        }
        LogOutput::Stderr | LogOutput::File => {
            // File output without path falls back to stderr
            let is_tty = std::io::stderr().is_terminal();
            let builder = fmt()
                .with_env_filter(filter)
                .with_target(config.show_target)
                .with_writer(std::io::stderr)
                .with_ansi(is_tty);
            with_timer_try_init!(builder, config.timestamp_format)
        }
    };

    result.map_err(|e| LogInitError::AlreadyInitialized(e.to_string()))
}

/// Initialize the logging system with daily rolling file output.
///
/// The returned `WorkerGuard` must be held for the duration of the program
/// to ensure all logs are flushed before shutdown.
pub fn init_with_file(config: LogConfig, log_path: &Path) -> Result<WorkerGuard, LogInitError> {
    use tracing_subscriber::fmt::time::{LocalTime, UtcTime};

    let filter = config.build_filter();

    let log_dir = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(log_dir)?;

    let log_filename = log_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_LOG_FILENAME);

    // Files named: {prefix}.YYYY-MM-DD
    let file_appender = tracing_appender::rolling::daily(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .with_writer(non_blocking)
        .with_ansi(false);

    let result = match config.timestamp_format {
        TimestampFormat::Utc => builder.with_timer(UtcTime::rfc_3339()).try_init(),
        TimestampFormat::Local => builder.with_timer(LocalTime::rfc_3339()).try_init(),
    };
    result.map_err(|e| LogInitError::AlreadyInitialized(e.to_string()))?;

    Ok(guard)
}

/// Initialize from the `[logging]` config section.
///
/// Returns the file writer guard when a log file is configured.
pub fn init_from_settings(settings: &LoggingConfig) -> Result<Option<WorkerGuard>, LogInitError> {
    let config = LogConfig::from_settings(settings);
    match &settings.file {
        Some(path) => init_with_file(config, path).map(Some),
        None => try_init(config).map(|_| None),
    }
}

/// Initialize logging for tests.
///
/// Uses `with_test_writer()` to capture logs in test output.
/// Safe to call multiple times.
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
