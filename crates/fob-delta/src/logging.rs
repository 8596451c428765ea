//! Logging utilities for fob-delta
//!
//! [`LogLevel`] is always available since it is part of [`DeltaConfig`].
//! The subscriber installers need the `logging` feature.
//!
//! For library users: fob-delta emits tracing events - install your own subscriber.
//! For application developers: use these convenience functions.
//!
//! [`DeltaConfig`]: crate::DeltaConfig

use serde::{Deserialize, Serialize};

/// Log level for fob-delta output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
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
    /// Everything but garbage collection traces
    Debug,
    /// All logs
    Trace,
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
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

#[cfg(feature = "logging")]
pub use subscriber::{init_logging, init_logging_from_config, init_logging_from_env};

#[cfg(feature = "logging")]
mod subscriber {
    use std::sync::Once;

    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    use super::LogLevel;
    use crate::config::DeltaConfig;

    static INIT: Once = Once::new();

    impl From<LogLevel> for LevelFilter {
        fn from(level: LogLevel) -> Self {
            match level {
                LogLevel::Silent => LevelFilter::OFF,
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    /// Initialize fob-delta logging with specified level
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
    /// use fob_delta::logging::{init_logging, LogLevel};
    ///
    /// init_logging(LogLevel::Info);
    /// ```
    pub fn init_logging(level: LogLevel) {
        INIT.call_once(|| {
            let filter = EnvFilter::builder()
                .with_default_directive(LevelFilter::from(level).into())
                .from_env_lossy();
            install(filter);
        });
    }

    /// Initialize logging at the configured `log_level`.
    ///
    /// `RUST_LOG` directives still apply on top of the level.
    pub fn init_logging_from_config(config: &DeltaConfig) {
        init_logging(config.log_level);
    }

    /// Initialize logging from RUST_LOG environment variable
    ///
    /// Falls back to Info level if RUST_LOG is not set or invalid.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use fob_delta::logging::init_logging_from_env;
    ///
    /// init_logging_from_env();
    /// ```
    pub fn init_logging_from_env() {
        INIT.call_once(|| {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy()
            });
            install(filter);
        });
    }

    fn install(filter: EnvFilter) {
        // another subscriber may already be installed by the host
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false).without_time())
            .try_init();
    }
}
