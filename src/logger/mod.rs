//! Named loggers shared by the service modules.
//!
//! Every module keeps one `static LOGGER: LazyLock<Logger>`. Levels can be
//! changed per logger or for every live logger at once with [`set_log_level`],
//! and applications can capture output through [`set_user_log_handler`].

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock, Weak};

static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static INSTANCES: LazyLock<Mutex<Vec<Weak<LoggerInner>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));
static USER_HANDLER: LazyLock<RwLock<Option<UserHandler>>> =
    LazyLock::new(|| RwLock::new(None));

/// Callback installed with [`set_user_log_handler`].
pub type LogCallback = Arc<dyn Fn(&LogRecord) + Send + Sync + 'static>;

#[derive(Clone)]
struct UserHandler {
    callback: LogCallback,
    level: Option<LogLevel>,
}

#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    name: String,
    log_level: AtomicU8,
    console: AtomicBool,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("log_level", &self.log_level())
            .finish()
    }
}

impl Logger {
    pub fn new(name: impl Into<String>) -> Self {
        let inner = Arc::new(LoggerInner {
            name: name.into(),
            log_level: AtomicU8::new(GLOBAL_LOG_LEVEL.load(Ordering::SeqCst)),
            console: AtomicBool::new(true),
        });
        INSTANCES.lock().unwrap().push(Arc::downgrade(&inner));
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_u8(self.inner.log_level.load(Ordering::SeqCst))
    }

    pub fn set_log_level<L>(&self, level: L) -> Result<(), LogError>
    where
        L: IntoLogLevel,
    {
        let level = level.into_log_level()?;
        self.inner.log_level.store(level as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Turns console output of this logger on or off. User handlers still run.
    pub fn set_console_output(&self, enabled: bool) {
        self.inner.console.store(enabled, Ordering::SeqCst);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Debug, message.into());
    }

    pub fn log(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Verbose, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.dispatch(LogLevel::Error, message.into());
    }

    fn dispatch(&self, level: LogLevel, message: String) {
        let user_handler = USER_HANDLER.read().unwrap().clone();
        let threshold = self.log_level();
        let wants_console =
            level >= threshold && self.inner.console.load(Ordering::SeqCst);
        let wants_user = user_handler
            .as_ref()
            .is_some_and(|handler| level >= handler.level.unwrap_or(threshold));
        if level == LogLevel::Silent || (!wants_console && !wants_user) {
            return;
        }

        let record = LogRecord {
            level,
            message,
            logger_name: self.name().to_owned(),
            timestamp: Utc::now(),
        };
        if let Some(handler) = user_handler.filter(|_| wants_user) {
            (handler.callback)(&record);
        }
        if wants_console {
            write_console(&record);
        }
    }
}

fn write_console(record: &LogRecord) {
    let header = format!(
        "[{}]  {}:",
        record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        record.logger_name
    );
    match record.level {
        LogLevel::Warn | LogLevel::Error => eprintln!("{header} {}", record.message),
        _ => println!("{header} {}", record.message),
    }
}

fn with_instances<F>(mut f: F)
where
    F: FnMut(&Arc<LoggerInner>),
{
    let mut instances = INSTANCES.lock().unwrap();
    instances.retain(|weak| match weak.upgrade() {
        Some(inner) => {
            f(&inner);
            true
        }
        None => false,
    });
}

/// A single emitted log line, as handed to user handlers.
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub logger_name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Silent = 5,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Debug,
            1 => LogLevel::Verbose,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            4 => LogLevel::Error,
            _ => LogLevel::Silent,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "verbose" => Ok(LogLevel::Verbose),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            other => Err(LogError::InvalidLogLevel(other.to_string())),
        }
    }
}

pub trait IntoLogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError>;
}

impl IntoLogLevel for LogLevel {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        Ok(self)
    }
}

impl IntoLogLevel for &str {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(self)
    }
}

impl IntoLogLevel for String {
    fn into_log_level(self) -> Result<LogLevel, LogError> {
        LogLevel::from_str(&self)
    }
}

#[derive(Debug, Clone)]
pub enum LogError {
    InvalidLogLevel(String),
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogError::InvalidLogLevel(level) => write!(f, "Invalid log level \"{level}\""),
        }
    }
}

impl std::error::Error for LogError {}

/// Sets the level of every live logger and of loggers created afterwards.
pub fn set_log_level<L>(level: L) -> Result<(), LogError>
where
    L: IntoLogLevel,
{
    let level = level.into_log_level()?;
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    with_instances(|inner| inner.log_level.store(level as u8, Ordering::SeqCst));
    Ok(())
}

/// Installs (or clears, with `None`) a handler receiving every record at or
/// above `level`, or at or above each logger's own level when `level` is `None`.
pub fn set_user_log_handler<F>(callback: Option<F>, level: Option<LogLevel>)
where
    F: Fn(&LogRecord) + Send + Sync + 'static,
{
    *USER_HANDLER.write().unwrap() = callback.map(|callback| UserHandler {
        callback: Arc::new(callback),
        level,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_GUARD: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    fn capture(
        logger_name: &str,
        level: Option<LogLevel>,
    ) -> Arc<Mutex<Vec<(LogLevel, String)>>> {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&records);
        let name = logger_name.to_string();
        set_user_log_handler(
            Some(move |record: &LogRecord| {
                if record.logger_name == name {
                    sink.lock()
                        .unwrap()
                        .push((record.level, record.message.clone()));
                }
            }),
            level,
        );
        records
    }

    fn reset() {
        set_log_level(LogLevel::Info).unwrap();
        set_user_log_handler(None::<fn(&LogRecord)>, None);
    }

    #[test]
    fn global_level_applies_to_existing_loggers() {
        let _guard = TEST_GUARD.lock().unwrap();
        reset();
        let logger = Logger::new("@cms/logger-global");
        logger.set_console_output(false);
        let records = capture(logger.name(), None);

        set_log_level("debug").unwrap();
        logger.debug("resolving path");
        logger.info("ready");

        set_log_level(LogLevel::Warn).unwrap();
        logger.info("hidden");
        logger.error("failed");

        let levels: Vec<LogLevel> = records.lock().unwrap().iter().map(|r| r.0).collect();
        assert_eq!(levels, [LogLevel::Debug, LogLevel::Info, LogLevel::Error]);
        reset();
    }

    #[test]
    fn user_handler_level_overrides_logger_level() {
        let _guard = TEST_GUARD.lock().unwrap();
        reset();
        let logger = Logger::new("@cms/logger-custom");
        logger.set_console_output(false);
        let records = capture(logger.name(), Some(LogLevel::Warn));

        logger.info("info message");
        logger.warn("warn message");

        let stored = records.lock().unwrap().clone();
        assert_eq!(stored, vec![(LogLevel::Warn, "warn message".to_string())]);
        reset();
    }

    #[test]
    fn invalid_level_string_is_rejected() {
        let err = set_log_level("loud").unwrap_err();
        assert_eq!(err.to_string(), "Invalid log level \"loud\"");
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }
}
