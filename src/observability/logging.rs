//! Logging configuration and request logging helpers.
//!
//! Built on `tracing`; [`LoggingConfig::init`] installs a
//! `tracing-subscriber` registry with an `EnvFilter`, so `RUST_LOG`
//! directives still apply on top of the configured level.

use crate::errors::{PropellerAdsError, PropellerAdsResult};
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Longest response body excerpt written to the log.
const MAX_LOGGED_BODY: usize = 1000;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The minimum log level to capture
    pub level: LogLevel,
    /// The output format for log messages
    pub format: LogFormat,
    /// Whether to include timestamps in log output
    pub include_timestamps: bool,
    /// Whether to include the module target in log output
    pub include_target: bool,
    /// Whether to include file and line number in log output
    pub include_file_line: bool,
}

/// Log level enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<LogLevel> for tracing::level_filters::LevelFilter {
    fn from(level: LogLevel) -> Self {
        Level::from(level).into()
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors (for development)
    Pretty,
    /// JSON format (for structured logging in production)
    Json,
    /// Compact single-line format
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            include_timestamps: true,
            include_target: true,
            include_file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a new logging configuration with default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use integrations_propellerads::observability::{LoggingConfig, LogLevel, LogFormat};
    ///
    /// let config = LoggingConfig::new();
    /// assert_eq!(config.level, LogLevel::Info);
    /// assert_eq!(config.format, LogFormat::Pretty);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `PROPELLERADS_LOG_LEVEL` and `PROPELLERADS_LOG_FORMAT`
    /// (`pretty`, `json` or `compact`), falling back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = std::env::var("PROPELLERADS_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
        {
            config.level = level;
        }
        if let Ok(format) = std::env::var("PROPELLERADS_LOG_FORMAT") {
            config.format = match format.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        config
    }

    /// Sets the log level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the log format.
    ///
    /// # Examples
    ///
    /// ```
    /// use integrations_propellerads::observability::{LoggingConfig, LogFormat};
    ///
    /// let config = LoggingConfig::new().with_format(LogFormat::Json);
    /// assert_eq!(config.format, LogFormat::Json);
    /// ```
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timestamps(mut self, include: bool) -> Self {
        self.include_timestamps = include;
        self
    }

    pub fn with_target(mut self, include: bool) -> Self {
        self.include_target = include;
        self
    }

    pub fn with_file_line(mut self, include: bool) -> Self {
        self.include_file_line = include;
        self
    }

    /// Initialize logging with this configuration.
    ///
    /// Call once at application startup.
    ///
    /// ```no_run
    /// use integrations_propellerads::observability::{LoggingConfig, LogLevel};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// LoggingConfig::new()
    ///     .with_level(LogLevel::Debug)
    ///     .init()?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`PropellerAdsError::Configuration`] if a global subscriber
    /// is already installed.
    pub fn init(self) -> PropellerAdsResult<()> {
        let filter = EnvFilter::from_default_env()
            .add_directive(tracing::level_filters::LevelFilter::from(self.level).into());
        let registry = tracing_subscriber::registry().with(filter);

        let result = match (self.format, self.include_timestamps) {
            (LogFormat::Json, _) => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(self.include_target)
                        .with_file(self.include_file_line)
                        .with_line_number(self.include_file_line),
                )
                .try_init(),
            (LogFormat::Compact, true) => registry
                .with(fmt::layer().compact().with_target(self.include_target))
                .try_init(),
            (LogFormat::Compact, false) => registry
                .with(
                    fmt::layer()
                        .compact()
                        .without_time()
                        .with_target(self.include_target),
                )
                .try_init(),
            (LogFormat::Pretty, true) => registry
                .with(
                    fmt::layer()
                        .with_ansi(true)
                        .with_target(self.include_target)
                        .with_file(self.include_file_line)
                        .with_line_number(self.include_file_line),
                )
                .try_init(),
            (LogFormat::Pretty, false) => registry
                .with(
                    fmt::layer()
                        .with_ansi(true)
                        .without_time()
                        .with_target(self.include_target)
                        .with_file(self.include_file_line)
                        .with_line_number(self.include_file_line),
                )
                .try_init(),
        };

        result.map_err(|e| PropellerAdsError::Configuration {
            message: format!("Failed to initialize logging: {}", e),
        })
    }
}

/// Log one outgoing attempt.
///
/// ```
/// use integrations_propellerads::observability::log_request;
///
/// log_request("GET", "https://ssp-api.propellerads.com/v5/adv/campaigns", 0, "req_1_1");
/// ```
pub fn log_request(method: &str, url: &str, attempt: u32, request_id: &str) {
    tracing::debug!(method, url, attempt, request_id, "Outgoing request");
}

/// Log the response to one attempt, with a bounded excerpt of the body.
pub fn log_response(status: u16, elapsed: Duration, request_id: &str, body: Option<&[u8]>) {
    let body = body.map(String::from_utf8_lossy);
    tracing::debug!(
        status,
        duration_ms = elapsed.as_millis() as u64,
        request_id,
        body = body.as_deref().map(truncate).unwrap_or("<empty>"),
        "Incoming response"
    );
}

/// Log a failed request with its category and context.
pub fn log_error(error: &PropellerAdsError, context: &str) {
    tracing::error!(
        error = %error,
        category = error.category().as_str(),
        request_id = error.request_id().unwrap_or("-"),
        context,
        "Request failed"
    );
}

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_LOGGED_BODY {
        return text;
    }
    let mut end = MAX_LOGGED_BODY;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
