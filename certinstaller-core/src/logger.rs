//! Bridge from the `log` facade to a host supplied [`Logger`].
//!
//! Nothing is forwarded until [`set_logger`] runs. Debug and trace records
//! only come through from this crate's own modules.

use std::sync::{Arc, OnceLock};

/// Log sink implemented by the host.
///
/// Records emitted through the `log` crate anywhere in the process are
/// forwarded here once [`set_logger`] has been called.
///
/// ```rust
/// use certinstaller_core::logger::{LogLevel, Logger};
///
/// struct StderrLogger;
///
/// impl Logger for StderrLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         eprintln!("[{level:?}] {message}");
///     }
/// }
/// ```
///
/// ## Kotlin
///
/// ```kotlin
/// class LogcatLogger : Logger {
///     override fun log(level: LogLevel, message: String) {
///         Log.println(level.toPriority(), "CertInstaller", message)
///     }
/// }
///
/// setLogger(LogcatLogger(), LogLevel.INFO) // once, in Application.onCreate
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Receives one formatted record.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a log record, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, uniffi::Enum)]
pub enum LogLevel {
    /// Very detailed tracing.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of install and removal operations.
    Info,
    /// Recoverable anomalies such as skipped records.
    Warn,
    /// Failures.
    Error,
}

impl LogLevel {
    const fn filter(self) -> log::LevelFilter {
        match self {
            Self::Trace => log::LevelFilter::Trace,
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warn => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
        }
    }
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

/// Debug and trace records are only forwarded from this crate; dependencies
/// such as the HTTP stack are too chatty at those levels.
fn should_forward(module_path: Option<&str>, level: log::Level) -> bool {
    let verbose = matches!(level, log::Level::Debug | log::Level::Trace);
    let ours = module_path.is_some_and(|path| path.starts_with("certinstaller"));
    !verbose || ours
}

struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) || !should_forward(record.module_path(), record.level())
        {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Installs `logger` as the process-wide log sink, forwarding records at
/// `min_level` and above.
///
/// The sink can be set once per process; later calls only adjust
/// `min_level`.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>, min_level: LogLevel) {
    if LOGGER_INSTANCE.set(logger).is_ok() {
        static LOGGER: ForeignLogger = ForeignLogger;
        if let Err(err) = log::set_logger(&LOGGER) {
            eprintln!("certinstaller: another logger is already installed: {err}");
        }
    }
    log::set_max_level(min_level.filter());
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(Some("certinstaller_core::installer"), log::Level::Debug, true ; "own debug")]
    #[test_case(Some("reqwest::connect"), log::Level::Debug, false ; "foreign debug")]
    #[test_case(Some("reqwest::connect"), log::Level::Trace, false ; "foreign trace")]
    #[test_case(Some("reqwest::connect"), log::Level::Warn, true ; "foreign warn")]
    #[test_case(None, log::Level::Info, true ; "unknown module info")]
    #[test_case(None, log::Level::Debug, false ; "unknown module debug")]
    fn test_should_forward(module: Option<&str>, level: log::Level, expected: bool) {
        assert_eq!(should_forward(module, level), expected);
    }

    #[test]
    fn test_level_mapping_preserves_order() {
        assert!(log_level(log::Level::Error) > log_level(log::Level::Warn));
        assert!(log_level(log::Level::Info) > log_level(log::Level::Debug));
        assert_eq!(LogLevel::Info.filter(), log::LevelFilter::Info);
    }
}
