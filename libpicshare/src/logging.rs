//! Logging setup shared by the library consumers and the `pics` CLI
//!
//! Output always goes to stderr so command output on stdout stays pipeable.
//! The filter honours `RUST_LOG` first, then the configured level.
//!
//! ```no_run
//! use libpicshare::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "debug").init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain single-line output
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                other
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

/// Level used when neither `RUST_LOG` nor `PICSHARE_LOG_LEVEL` is set
pub const DEFAULT_LEVEL: &str = "error";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
        }
    }

    /// Read `PICSHARE_LOG_FORMAT` and `PICSHARE_LOG_LEVEL`, defaulting to text at [`DEFAULT_LEVEL`]
    pub fn from_env() -> Self {
        let format = std::env::var("PICSHARE_LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var("PICSHARE_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LEVEL.to_string());
        Self { format, level }
    }

    /// Raise the level to `debug` (the CLI's `--verbose`)
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = "debug".to_string();
        }
        self
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Install the global subscriber
    ///
    /// Returns `false` when a subscriber was already installed (tests, or
    /// an embedding application that set up its own).
    pub fn init(&self) -> bool {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => builder
                .pretty()
                .with_target(true)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => builder.with_target(false).with_level(true).try_init(),
        };
        installed.is_ok()
    }
}

/// Initialize logging from environment variables
pub fn init_default() -> bool {
    LoggingConfig::from_env().init()
}
