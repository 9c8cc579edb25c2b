//! Callback-backed logger with one injectable sink per level.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

type LogSink = Box<dyn Fn(&str) + Send + Sync>;

/// Logger that routes each level to an externally supplied callback.
///
/// Embedding applications hand in up to four `Fn(&str)` sinks, one per
/// level. A level without a sink is silenced, so an empty
/// `CallbackLogger` behaves like [`NoOpLogger`](crate::log::NoOpLogger).
///
/// # Example
///
/// ```
/// use tilegate::log::{CallbackLogger, Logger};
///
/// let logger = CallbackLogger::new()
///     .with_info(|msg| println!("INFO  {msg}"))
///     .with_error(|msg| eprintln!("ERROR {msg}"));
///
/// logger.info(format_args!("cache ready"));
/// logger.debug(format_args!("silenced, no debug sink set"));
/// ```
#[derive(Default)]
pub struct CallbackLogger {
    debug: Option<LogSink>,
    info: Option<LogSink>,
    warn: Option<LogSink>,
    error: Option<LogSink>,
}

impl CallbackLogger {
    /// Create a logger with no sinks; every level starts silenced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debug sink.
    pub fn with_debug(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.debug = Some(Box::new(sink));
        self
    }

    /// Set the info sink.
    pub fn with_info(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.info = Some(Box::new(sink));
        self
    }

    /// Set the warn sink.
    pub fn with_warn(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.warn = Some(Box::new(sink));
        self
    }

    /// Set the error sink.
    pub fn with_error(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(sink));
        self
    }
}

impl Logger for CallbackLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        let sink = match level {
            LogLevel::Debug => &self.debug,
            LogLevel::Info => &self.info,
            LogLevel::Warn => &self.warn,
            LogLevel::Error => &self.error,
        };

        if let Some(sink) = sink {
            sink(&args.to_string());
        }
    }
}
