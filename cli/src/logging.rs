use colored::{ColoredString, Colorize};
use env_logger::{fmt::Formatter as LogFormatter, Builder as LogBuilder};
use log::{error, Level as LogLevel, LevelFilter as LogLevelFilter, Record as LogRecord};
use once_cell::sync::Lazy;
use std::{env, error::Error as StdError, io::Write, ops::Deref};

const LOG_FILTER_ENV_VARIABLE_NAME: &str = "RUST_LOG";

/// How the process-wide logger is set up. Built once in `main` and never changed after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevelFilter,
    /// Filter directives layered on top of `level`, in `RUST_LOG` syntax.
    pub filters: Option<String>,
}

impl LogConfig {
    pub fn new(verbose: bool) -> Self {
        Self {
            level: if verbose {
                LogLevelFilter::Debug
            } else {
                LogLevelFilter::Info
            },
            filters: env::var(LOG_FILTER_ENV_VARIABLE_NAME).ok(),
        }
    }

    fn builder(&self) -> LogBuilder {
        // this closure formats logging, choose colour and determines level of verbosity
        let format = |formatter: &mut LogFormatter, record: &LogRecord<'_>| {
            writeln!(formatter, "{} {}", level_prefix(record.level()), record.args())
        };

        let mut builder = LogBuilder::new();
        builder.format(format).filter(None, self.level);
        if let Some(filters) = &self.filters {
            builder.parse_filters(filters);
        }
        builder
    }

    pub fn init(&self) {
        self.builder().init();
    }
}

fn level_prefix(level: LogLevel) -> &'static ColoredString {
    match level {
        LogLevel::Debug => LOG_PREFIX_DEBUG.deref(),
        LogLevel::Info => LOG_PREFIX_INFO.deref(),
        LogLevel::Warn => LOG_PREFIX_WARN.deref(),
        LogLevel::Error => LOG_PREFIX_ERROR.deref(),
        LogLevel::Trace => LOG_PREFIX_TRACE.deref(),
    }
}

/// Log an error followed by each of its causes.
pub fn log_error_chain(error: &(dyn StdError + 'static)) {
    error!("{error}");
    let mut source = error.source();
    while let Some(cause) = source {
        error!(" |- {cause}");
        source = cause.source();
    }
}

pub static LOG_PREFIX_DEBUG: Lazy<ColoredString> = Lazy::new(|| "D".normal());
pub static LOG_PREFIX_INFO: Lazy<ColoredString> = Lazy::new(|| "I".green());
pub static LOG_PREFIX_WARN: Lazy<ColoredString> = Lazy::new(|| "W".yellow());
pub static LOG_PREFIX_ERROR: Lazy<ColoredString> = Lazy::new(|| "E".red());
pub static LOG_PREFIX_TRACE: Lazy<ColoredString> = Lazy::new(|| "T".normal());
