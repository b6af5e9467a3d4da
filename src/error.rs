use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("plugin '{plugin}' failed: {reason}")]
    Plugin { plugin: String, reason: String },

    #[error("command '{0}' not implemented")]
    UnsupportedCommand(String),

    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("no listener could be bound (tcp: {tcp}, unix: {unix})")]
    NoListeners { tcp: String, unix: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DaemonError {
    pub fn plugin(plugin: &str, reason: impl ToString) -> Self {
        DaemonError::Plugin {
            plugin: plugin.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
