use clap::Parser;
use std::path::PathBuf;

use argeos::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "argeos")]
#[command(version)]
#[command(about = "Host diagnostics daemon", long_about = None)]
pub(crate) struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "ARGEOS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the TCP bind address (e.g., :9999 or 127.0.0.1:9999)
    #[arg(long)]
    pub host: Option<String>,

    /// Override the admin socket path
    #[arg(long)]
    pub admin_socket: Option<PathBuf>,

    /// Override the log level (debug, info, warn, error)
    #[arg(short, long, env = "ARGEOS_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Command line flags win over the config file.
    pub fn apply(self, config: &mut argeos::Config) {
        if let Some(host) = self.host {
            config.server.address = host;
        }
        if let Some(socket) = self.admin_socket {
            config.server.admin_socket = socket;
        }
        if let Some(level) = self.log_level {
            config.server.log_level = Some(level);
        }
    }
}
