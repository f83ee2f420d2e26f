//! Logging utilities for pzlr-graph
//!
//! This module is only available with the `logging` feature.
//!
//! For library users: pzlr emits tracing events - install your own subscriber.
//! For application developers: use these convenience functions.

use pzlr_config::GlobalSettings;
use std::sync::Once;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log level for pzlr output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// No logging output
    Silent,
    /// Only errors
    Error,
    /// Errors and warnings
    Warn,
    /// Errors, warnings, and info (default)
    #[default]
    Info,
    /// Resolution decisions
    Debug,
    /// Every file read and lookup
    Trace,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    fn as_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Silent => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" | "off" => Ok(LogLevel::Silent),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter())
    }
}

/// Output layout of log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One short line per event, no timestamps (default)
    #[default]
    Compact,
    /// Timestamps and targets included
    Full,
}

impl std::str::FromStr for LogFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            other => Err(format!("Invalid log format: {}", other)),
        }
    }
}

fn install(filter: EnvFilter, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber installed by the host application wins.
    let _ = match format {
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).without_time())
            .try_init(),
        LogFormat::Full => registry.with(fmt::layer()).try_init(),
    };
}

/// Initialize pzlr logging with specified level
///
/// # Thread Safety
///
/// This function installs a global subscriber and should only be called once
/// per process. It is safe to call from multiple threads - only the first
/// call will take effect.
///
/// # Example
///
/// ```rust,no_run
/// use pzlr_graph::logging::{init_logging, LogLevel};
///
/// init_logging(LogLevel::Info);
/// ```
pub fn init_logging(level: LogLevel) {
    INIT.call_once(|| {
        let filter = EnvFilter::builder()
            .with_default_directive(level.as_level_filter().into())
            .from_env_lossy();
        install(filter, LogFormat::Compact);
    });
}

/// Initialize logging from RUST_LOG environment variable
///
/// Falls back to Info level if RUST_LOG is not set or invalid.
pub fn init_logging_from_env() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy()
        });
        install(filter, LogFormat::Compact);
    });
}

/// Initialize logging from the `settings` section of a `.pzlrrc`.
///
/// Unknown levels and formats fall back to the defaults with a warning once
/// the subscriber is installed. `RUST_LOG` still overrides the level.
pub fn init_logging_from_settings(settings: &GlobalSettings) {
    INIT.call_once(|| {
        let level = settings.log_level.as_deref().map(str::parse::<LogLevel>);
        let format = settings.log_format.as_deref().map(str::parse::<LogFormat>);

        let filter = EnvFilter::builder()
            .with_default_directive(
                level
                    .clone()
                    .and_then(Result::ok)
                    .unwrap_or_default()
                    .as_level_filter()
                    .into(),
            )
            .from_env_lossy();
        install(
            filter,
            format.clone().and_then(Result::ok).unwrap_or_default(),
        );

        for problem in [level.and_then(Result::err), format.and_then(Result::err)]
            .into_iter()
            .flatten()
        {
            tracing::warn!("{problem}, using the default");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("invalid".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Silent.to_string(), "off");
        assert_eq!(LogLevel::Trace.as_level_filter(), LevelFilter::TRACE);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("Full".parse::<LogFormat>().unwrap(), LogFormat::Full);
        assert_eq!(LogFormat::default(), LogFormat::Compact);
        assert!("json".parse::<LogFormat>().is_err());
    }
}
