use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::health::HealthStatus;

/// Command name -> human readable description.
///
/// Ordered so that `help` output is stable between calls.
pub type CommandHelp = BTreeMap<String, String>;

/// Build a [`CommandHelp`] table from string pairs.
pub fn command_help<const N: usize>(entries: [(&str, &str); N]) -> CommandHelp {
    entries
        .into_iter()
        .map(|(name, help)| (name.to_string(), help.to_string()))
        .collect()
}

/// Core trait for diagnostic probes.
/// Every command key in `command_help` must be handled by `execute`.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable, unique plugin name
    fn name(&self) -> &str;

    /// Commands this plugin answers to
    fn command_help(&self) -> &CommandHelp;

    /// One-shot health check
    async fn health_check(&self) -> HealthStatus;

    /// Runs one of the advertised commands
    async fn execute(&self, command: &str, args: &[String]) -> Result<String>;
}

/// A plugin that can also run in the background and push health updates.
#[async_trait]
pub trait HealthDaemon: Plugin {
    /// Runs until `cancel` fires or [`HealthDaemon::stop`] is called.
    async fn start(
        &self,
        cancel: CancellationToken,
        updates: mpsc::Sender<HealthStatus>,
    ) -> Result<()>;

    /// Requests early termination. Calling it more than once is harmless.
    fn stop(&self);
}

/// Registry entry: the mandatory plugin capability plus the optional
/// background capability, resolved once at registration.
#[derive(Clone)]
pub struct PluginEntry {
    pub plugin: Arc<dyn Plugin>,
    pub daemon: Option<Arc<dyn HealthDaemon>>,
}

impl PluginEntry {
    pub fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            daemon: None,
        }
    }

    pub fn with_daemon<P: HealthDaemon + 'static>(plugin: Arc<P>) -> Self {
        let daemon: Arc<dyn HealthDaemon> = plugin.clone();
        Self {
            plugin,
            daemon: Some(daemon),
        }
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn supports(&self, command: &str) -> bool {
        self.plugin.command_help().contains_key(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaemonError;

    struct Echo {
        help: CommandHelp,
    }

    #[async_trait]
    impl Plugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn command_help(&self) -> &CommandHelp {
            &self.help
        }

        async fn health_check(&self) -> HealthStatus {
            HealthStatus::ok("fine")
        }

        async fn execute(&self, command: &str, args: &[String]) -> Result<String> {
            match command {
                "echo" => Ok(args.join(" ")),
                other => Err(DaemonError::UnsupportedCommand(other.to_string())),
            }
        }
    }

    #[test]
    fn test_command_help_is_sorted() {
        let help = command_help([("zeta", "last"), ("alpha", "first")]);
        let keys: Vec<&str> = help.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_entry_without_daemon() {
        let entry = PluginEntry::new(Arc::new(Echo {
            help: command_help([("echo", "Echo arguments")]),
        }));
        assert_eq!(entry.name(), "echo");
        assert!(entry.supports("echo"));
        assert!(!entry.supports("diagnostic_dump"));
        assert!(entry.daemon.is_none());

        let out = entry
            .plugin
            .execute("echo", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, "a b");
    }
}
