//! Log sink setup and runtime level control.
//!
//! The subscriber carries a reloadable filter. [`LogControl`] is the handle
//! components hold to change verbosity while the daemon runs (the `debug
//! <level>` command), instead of mutating global state directly.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Parses `debug|info|warn|error` (case-insensitive); anything else is `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

pub fn level_name(level: LevelFilter) -> &'static str {
    match level.into_level() {
        Some(tracing::Level::TRACE) => "TRACE",
        Some(tracing::Level::DEBUG) => "DEBUG",
        Some(tracing::Level::INFO) => "INFO",
        Some(tracing::Level::WARN) => "WARN",
        Some(tracing::Level::ERROR) => "ERROR",
        None => "OFF",
    }
}

fn level_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::default().add_directive(level.into())
}

#[derive(Clone)]
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    current: Arc<RwLock<LevelFilter>>,
}

impl LogControl {
    /// A handle with no subscriber behind it; only tracks the level.
    pub fn detached() -> Self {
        Self {
            handle: None,
            current: Arc::new(RwLock::new(LevelFilter::INFO)),
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.current
            .read()
            .map(|level| *level)
            .unwrap_or(LevelFilter::INFO)
    }

    /// Switch verbosity, returning the level actually applied.
    pub fn set_level(&self, level: &str) -> LevelFilter {
        let level = parse_level(level);

        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(level_filter(level)) {
                tracing::error!(error = %e, "Failed to reload log filter");
                return self.level();
            }
        }

        if let Ok(mut current) = self.current.write() {
            *current = level;
        }
        tracing::info!(level = level_name(level), "Log level changed");
        level
    }
}

/// Install the global subscriber.
///
/// Logs go to `log_file` (appended, parent directories created) or stderr when
/// no file is configured or it cannot be opened. Without an explicit `level`,
/// `RUST_LOG` is honored before falling back to `info`.
pub fn init(log_file: Option<&Path>, level: Option<&str>) -> LogControl {
    let (filter, initial) = match level {
        Some(level) => {
            let level = parse_level(level);
            (level_filter(level), level)
        }
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => {
                let hint = filter.max_level_hint().unwrap_or(LevelFilter::INFO);
                (filter, hint)
            }
            Err(_) => (level_filter(LevelFilter::INFO), LevelFilter::INFO),
        },
    };

    let (filter_layer, handle) = reload::Layer::new(filter);
    let (writer, ansi) = make_writer(log_file);

    let result = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(ansi))
        .try_init();
    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }

    LogControl {
        handle: Some(handle),
        current: Arc::new(RwLock::new(initial)),
    }
}

fn make_writer(log_file: Option<&Path>) -> (BoxMakeWriter, bool) {
    let Some(path) = log_file else {
        return (BoxMakeWriter::new(std::io::stderr), true);
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating log directory {}: {}", parent.display(), e);
            return (BoxMakeWriter::new(std::io::stderr), true);
        }
    }

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
        Err(e) => {
            eprintln!("Error opening log file {}: {}", path.display(), e);
            (BoxMakeWriter::new(std::io::stderr), true)
        }
    }
}
