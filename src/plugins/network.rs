use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, error};

use crate::config::Config;
use crate::daemon::executor::CommandExecutor;
use crate::error::{DaemonError, Result};
use crate::health::HealthStatus;
use crate::plugin::{command_help, CommandHelp, Plugin};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub ss_path: String,
    pub ss_args: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ss_path: "ss".to_string(),
            ss_args: "-tunap".to_string(),
        }
    }
}

/// Socket inspection through `ss`.
pub struct NetworkPlugin {
    help: CommandHelp,
    config: NetworkConfig,
    executor: CommandExecutor,
}

impl NetworkPlugin {
    pub const NAME: &'static str = "network";

    pub fn new(config: NetworkConfig) -> Self {
        Self {
            help: command_help([
                ("check_network", "Check Network Status"),
                ("diagnostic_dump", "Dump network status to a directory"),
            ]),
            config,
            executor: CommandExecutor::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.plugin_config(Self::NAME))
    }

    async fn run_ss(&self) -> Result<String> {
        let args: Vec<String> = self
            .config
            .ss_args
            .split_whitespace()
            .map(str::to_string)
            .collect();
        debug!(?args, "Running ss");

        let output = self.executor.run(&self.config.ss_path, &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status = %output.status, stderr = %stderr.trim(), "ss failed");
            return Err(DaemonError::plugin(
                Self::NAME,
                format!("ss exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn dump(&self, dump_dir: &Path) -> Result<String> {
        let network_dir = dump_dir.join("network");
        tokio::fs::create_dir_all(&network_dir).await?;

        let output = self.run_ss().await?;
        tokio::fs::write(network_dir.join("ss.txt"), output).await?;
        Ok("OK".to_string())
    }
}

#[async_trait]
impl Plugin for NetworkPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn command_help(&self) -> &CommandHelp {
        &self.help
    }

    async fn health_check(&self) -> HealthStatus {
        match self.run_ss().await {
            Ok(_) => HealthStatus::ok("OK"),
            Err(e) => HealthStatus::error(e.to_string()),
        }
    }

    async fn execute(&self, command: &str, args: &[String]) -> Result<String> {
        match command {
            "check_network" => self.run_ss().await,
            "diagnostic_dump" => {
                let dump_dir = args
                    .first()
                    .ok_or(DaemonError::MissingArgument("diagnostic directory"))?;
                self.dump(Path::new(dump_dir)).await
            }
            other => Err(DaemonError::UnsupportedCommand(other.to_string())),
        }
    }
}
