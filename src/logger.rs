//! Stderr logger for the launchers.
//!
//! Neither binary keeps a daemon-style log file; verbosity is controlled
//! entirely by the `-q`/`-v` command line flags (see `cli::Verbosity`),
//! counted down/up from a `Warn` baseline rather than an env var.

use std::io::{stderr, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<StderrLogger> = OnceCell::new();

pub struct StderrLogger {
    level: Option<Level>,
}

impl StderrLogger {
    fn new(level: Option<Level>) -> Self {
        Self { level }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        match self.level {
            Some(level) => metadata.level() <= level,
            None => false,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let msg = match (record.file(), record.line()) {
            (Some(file), Some(line)) => format!(
                "[{} {}:{}] {} {}",
                record.level(),
                file,
                line,
                chrono::Local::now().to_rfc3339(),
                record.args()
            ),
            _ => format!(
                "[{}] {} {}",
                record.level(),
                chrono::Local::now().to_rfc3339(),
                record.args()
            ),
        };
        let _ = writeln!(stderr(), "{}", msg);
    }

    fn flush(&self) {
        let _ = stderr().flush();
    }
}

/// Install the global logger at the given filter. Only the first call
/// takes effect; later calls (e.g. in tests that run several launchers
/// in-process) are no-ops, matching the `OnceCell`-guarded init the
/// teacher crate uses for its own logger.
pub fn init(level_filter: LevelFilter) {
    let logger = LOGGER.get_or_init(|| StderrLogger::new(level_filter.to_level()));
    let _ = log::set_logger(logger).map(|()| log::set_max_level(level_filter));
}

/// Map a `-q`/`-v` verbosity count to a `log::LevelFilter`.
///
/// The default (no flags) is `Warn`; `-q` drops it to `Off`, each `-v`
/// raises it by one level.
pub fn level_filter_for(verbose: i32) -> LevelFilter {
    match verbose {
        v if v <= 0 => LevelFilter::Off,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
