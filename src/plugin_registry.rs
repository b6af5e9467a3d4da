use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::health::HealthStatus;
use crate::plugin::{HealthDaemon, Plugin, PluginEntry};

/// Command every plugin may implement to write diagnostics into a directory.
pub const DIAGNOSTIC_DUMP_COMMAND: &str = "diagnostic_dump";

const DUMPS_SUBDIR: &str = "dumps";
const DUMP_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const MAX_DUMP_DIR_ATTEMPTS: u32 = 1000;

/// Ordered registry of plugins.
///
/// Filled once at startup and read-only afterwards, so it is shared behind a
/// plain `Arc` without locking.
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<PluginEntry>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        info!(plugin = %plugin.name(), "Registering plugin");
        self.plugins.push(PluginEntry::new(plugin));
    }

    /// Register a plugin that can also run as a background health daemon.
    pub fn register_daemon<P: HealthDaemon + 'static>(&mut self, plugin: Arc<P>) {
        info!(plugin = %plugin.name(), "Registering plugin with health daemon");
        self.plugins.push(PluginEntry::with_daemon(plugin));
    }

    pub fn entries(&self) -> &[PluginEntry] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Registered plugins that also run as health daemons, in registration order.
    pub fn health_daemons(&self) -> Vec<Arc<dyn HealthDaemon>> {
        self.plugins
            .iter()
            .filter_map(|entry| entry.daemon.clone())
            .collect()
    }

    /// Fan a command out to every plugin advertising it.
    ///
    /// Successful outputs are joined with newlines in registration order.
    /// Failing plugins are logged and left out.
    pub async fn execute_command(&self, command: &str, args: &[String]) -> String {
        let mut outputs = Vec::new();

        for entry in self.plugins.iter().filter(|e| e.supports(command)) {
            debug!(plugin = %entry.name(), command, ?args, "Dispatching command");
            outputs.push((entry.name(), entry.plugin.execute(command, args).await));
        }

        let results: Vec<String> = outputs
            .into_iter()
            .filter_map(|(plugin, result)| match result {
                Ok(output) => Some(output),
                Err(e) => {
                    error!(plugin = %plugin, command, error = %e, "Error executing command");
                    None
                }
            })
            .collect();

        if results.is_empty() {
            return format!("Command {} not supported", command);
        }
        results.join("\n")
    }

    /// Every advertised command name, duplicates included.
    pub fn command_names(&self) -> Vec<&str> {
        self.plugins
            .iter()
            .flat_map(|entry| entry.plugin.command_help().keys().map(|k| k.as_str()))
            .collect()
    }

    /// JSON array of every advertised command name.
    pub fn supported_commands(&self) -> String {
        match serde_json::to_string(&self.command_names()) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Error encoding supported commands");
                "Error encoding supported commands".to_string()
            }
        }
    }

    /// Run every plugin's health check in registration order, tagging each
    /// result with the plugin's name.
    pub async fn health_check(&self) -> Vec<HealthStatus> {
        info!("Running healthcheck");
        let mut results = Vec::with_capacity(self.plugins.len());
        for entry in &self.plugins {
            let status = entry.plugin.health_check().await.with_component(entry.name());
            debug!(plugin = %status.component_name, state = %status.state, "Healthcheck done");
            results.push(status);
        }
        results
    }

    /// Create `<base_dir>/dumps/dump-<timestamp>` and run every plugin's
    /// dump command against it.
    ///
    /// Directory creation failures are logged; plugins still receive the path.
    pub async fn diagnostic_dump(&self, base_dir: &Path) -> String {
        let dump_dir = match create_dump_dir(base_dir, Local::now()).await {
            Ok(dir) => dir,
            Err(e) => {
                let dir = base_dir.join(DUMPS_SUBDIR).join(dump_dir_name(Local::now()));
                error!(dir = %dir.display(), error = %e, "Error creating dump directory");
                dir
            }
        };

        info!(dir = %dump_dir.display(), "Running diagnostic dump");
        self.execute_command(DIAGNOSTIC_DUMP_COMMAND, &[dump_dir.display().to_string()])
            .await
    }
}

/// `dump-YYYYMMDDThhmmss`; sorts lexically in chronological order.
pub fn dump_dir_name(now: DateTime<Local>) -> String {
    format!("dump-{}", now.format(DUMP_TIMESTAMP_FORMAT))
}

/// Creates a fresh dump directory. A second dump within the same second gets
/// a numeric suffix instead of reusing the existing directory.
async fn create_dump_dir(base_dir: &Path, now: DateTime<Local>) -> std::io::Result<PathBuf> {
    let dumps = base_dir.join(DUMPS_SUBDIR);
    tokio::fs::create_dir_all(&dumps).await?;

    let name = dump_dir_name(now);
    let mut candidate = dumps.join(&name);
    for attempt in 1..=MAX_DUMP_DIR_ATTEMPTS {
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                warn!(dir = %candidate.display(), "Dump directory already exists");
                candidate = dumps.join(format!("{}-{:03}", name, attempt));
            }
            Err(e) => return Err(e),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free dump directory name for {}", name),
    ))
}
