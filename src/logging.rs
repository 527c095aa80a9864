//! Logger de consola con colores por nivel.
//!
//! El nivel se toma de la variable de entorno `LIBFS_LOG`
//! (`off`, `error`, `warn`, `info`, `debug`, `trace`); por defecto `warn`.

use std::env;

use colored::{Color, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};

pub const LOG_ENV: &str = "LIBFS_LOG";

struct ConsoleLogger;

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::BrightYellow,
        Level::Info => Color::Blue,
        Level::Debug => Color::Green,
        Level::Trace => Color::BrightBlack,
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{:>5}] {}", record.level(), record.args());
        eprintln!("{}", line.color(level_color(record.level())));
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

pub fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse().ok()
}

/// Instala el logger una sola vez; las llamadas siguientes no hacen nada.
pub fn init() {
    let level = env::var(LOG_ENV)
        .ok()
        .and_then(|v| parse_level(&v))
        .unwrap_or(LevelFilter::Warn);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
