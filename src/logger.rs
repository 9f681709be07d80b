use std::sync::OnceLock;

use console::style;
use log::{Level, LevelFilter, Metadata, Record};

use crate::env;

struct Logger {
    level: LevelFilter,
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let prefix = match record.level() {
            Level::Error => style("monohook ERROR").red().bold(),
            Level::Warn => style("monohook WARN").yellow().bold(),
            Level::Info => style("monohook").dim(),
            Level::Debug => style("monohook DEBUG").blue(),
            Level::Trace => style("monohook TRACE").cyan().dim(),
        };
        eprintln!("{prefix} {}", record.args());
    }

    fn flush(&self) {}
}

/// Installs the stderr logger. `level` overrides `MONOHOOK_LOG`.
pub fn init(level: Option<LevelFilter>) {
    let level = level.unwrap_or(*env::MONOHOOK_LOG);
    let logger = LOGGER.get_or_init(|| Logger { level });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(logger.level);
    }
}
