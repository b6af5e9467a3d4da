//! Line protocol spoken on both listeners.
//!
//! One request per line: `<command> [arg1] [arg2] ...`, split on whitespace
//! with no quoting. One response line per request.

use crate::plugin_registry::DIAGNOSTIC_DUMP_COMMAND;

pub const HEALTHCHECK_COMMAND: &str = "healthcheck";
pub const HELP_COMMAND: &str = "help";
pub const DEBUG_COMMAND: &str = "debug";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// JSON-encoded health of every plugin
    HealthCheck,
    /// JSON array of supported plugin commands
    Help,
    /// Manual diagnostic dump
    DiagnosticDump,
    /// Change log verbosity
    Debug { level: String },
    /// Anything else, routed to the plugins
    Plugin { command: String, args: Vec<String> },
}

impl Request {
    /// Returns `None` for a line without any tokens.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next()?;

        let request = match command {
            HEALTHCHECK_COMMAND => Request::HealthCheck,
            HELP_COMMAND => Request::Help,
            DIAGNOSTIC_DUMP_COMMAND => Request::DiagnosticDump,
            DEBUG_COMMAND => Request::Debug {
                level: tokens.next().unwrap_or_default().to_string(),
            },
            _ => Request::Plugin {
                command: command.to_string(),
                args: tokens.map(str::to_string).collect(),
            },
        };
        Some(request)
    }
}
