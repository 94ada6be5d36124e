//! Logging setup for sprout-ioc
//!
//! The container logs under the `sprout_ioc` target and every SQL statement
//! under `sprout_ioc::sql`. This module installs a `tracing-subscriber`
//! that prints them as JSON (production) or pretty/compact text
//! (development).
//!
//! # Features
//!
//! - `logging` - Emit container events (default)
//! - `logging-json` - JSON structured output
//! - `logging-pretty` - Colorful pretty output
//!
//! # Example
//!
//! ```rust,ignore
//! use sprout_ioc::logging;
//!
//! // Container wiring at DEBUG, SQL statements too
//! logging::builder()
//!     .container_only()
//!     .with_sql(tracing::Level::DEBUG)
//!     .pretty()
//!     .init();
//! ```

#[cfg(feature = "logging")]
use tracing::Level;

/// Target of container events
pub const TARGET: &str = "sprout_ioc";

/// Target of executed SQL statements
pub const SQL_TARGET: &str = "sprout_ioc::sql";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON structured logging (production default)
    #[default]
    Json,
    /// Pretty colorful output (development)
    Pretty,
    /// Compact single-line output
    Compact,
}

/// Builder for the subscriber
#[cfg(feature = "logging")]
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    targets: Vec<(&'static str, Level)>,
    with_file: bool,
    with_line_number: bool,
    with_thread_names: bool,
}

#[cfg(feature = "logging")]
impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            targets: Vec::new(),
            with_file: false,
            with_line_number: false,
            with_thread_names: false,
        }
    }
}

#[cfg(feature = "logging")]
impl LoggingBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the level used for targets without their own directive
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// TRACE everywhere
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// DEBUG everywhere
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// INFO everywhere
    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// WARN everywhere
    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    /// Log `target` at `level`, independent of the default level
    pub fn with_target(mut self, target: &'static str, level: Level) -> Self {
        self.targets.retain(|(t, _)| *t != target);
        self.targets.push((target, level));
        self
    }

    /// Silence everything except container events, which log at the
    /// configured level
    pub fn container_only(mut self) -> Self {
        let level = self.level;
        self.level = Level::ERROR;
        self.with_target(TARGET, level)
    }

    /// Log executed SQL statements at `level`
    pub fn with_sql(self, level: Level) -> Self {
        self.with_target(SQL_TARGET, level)
    }

    /// Include file names
    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    /// Include line numbers
    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    /// Include thread names
    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    /// JSON output
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Pretty output
    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    /// Compact output
    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// The `EnvFilter` directive string this builder installs.
    ///
    /// More specific targets come last so `sprout_ioc::sql` overrides
    /// `sprout_ioc`.
    pub fn directives(&self) -> String {
        let mut targets = self.targets.clone();
        targets.sort_by_key(|(target, _)| target.len());

        let mut directives = vec![self.level.to_string().to_lowercase()];
        directives.extend(
            targets
                .iter()
                .map(|(target, level)| format!("{target}={}", level.to_string().to_lowercase())),
        );
        directives.join(",")
    }

    /// Install the subscriber globally
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::new(self.directives());
        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_names(self.with_thread_names)
            .with_target(true);

        // `try_init` so a second call (e.g. from tests) is harmless.
        let _ = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .try_init(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(layer.pretty())
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(filter)
                .with(layer.compact())
                .try_init(),
        };
    }

    /// No subscriber available without `logging-json` or `logging-pretty`
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

/// Create a new logging builder
#[cfg(feature = "logging")]
pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Container events at DEBUG in the feature's default format
#[cfg(feature = "logging")]
pub fn init() {
    let builder = builder().debug();
    #[cfg(all(feature = "logging-pretty", not(feature = "logging-json")))]
    let builder = builder.pretty();
    builder.init();
}

/// Container events and SQL statements at DEBUG, nothing else
#[cfg(feature = "logging")]
pub fn init_container_only() {
    builder().debug().container_only().with_sql(Level::DEBUG).init();
}

#[cfg(all(test, feature = "logging"))]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::INFO);
        assert_eq!(builder.format, LogFormat::Json);
        assert_eq!(builder.directives(), "info");
    }

    #[test]
    fn test_container_only_with_sql() {
        let builder = LoggingBuilder::new()
            .debug()
            .with_sql(Level::TRACE)
            .container_only()
            .compact()
            .with_file();

        assert_eq!(builder.format, LogFormat::Compact);
        assert!(builder.with_file);
        assert_eq!(
            builder.directives(),
            "error,sprout_ioc=debug,sprout_ioc::sql=trace"
        );
    }

    #[test]
    fn test_target_directive_is_replaced() {
        let builder = LoggingBuilder::new()
            .with_sql(Level::DEBUG)
            .with_sql(Level::WARN);
        assert_eq!(builder.directives(), "info,sprout_ioc::sql=warn");
    }
}
