//! Reachability probe for remote targets.
//!
//! Answers synchronous health checks and, as a [`HealthDaemon`], re-probes
//! its targets on its own interval and pushes a status whenever the overall
//! state changes.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{DaemonError, Result};
use crate::health::{HealthState, HealthStatus};
use crate::plugin::{command_help, CommandHelp, HealthDaemon, Plugin};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// `host:port` pairs
    pub targets: Vec<String>,
    /// Seconds between background probes
    pub interval: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            interval: 30,
            connect_timeout_ms: 2000,
        }
    }
}

impl ProbeConfig {
    fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }
}

pub struct ProbePlugin {
    help: CommandHelp,
    config: ProbeConfig,
    stopped: CancellationToken,
}

impl ProbePlugin {
    pub const NAME: &'static str = "probe";

    pub fn new(config: ProbeConfig) -> Self {
        Self {
            help: command_help([("check_probe", "Check Probe Status")]),
            config,
            stopped: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.plugin_config(Self::NAME))
    }

    async fn is_reachable(&self, target: &str) -> bool {
        match timeout(self.config.connect_timeout(), TcpStream::connect(target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(addr = %target, error = %e, "Probe target refused connection");
                false
            }
            Err(_) => {
                debug!(addr = %target, "Probe target timed out");
                false
            }
        }
    }
}

#[async_trait]
impl Plugin for ProbePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn command_help(&self) -> &CommandHelp {
        &self.help
    }

    async fn health_check(&self) -> HealthStatus {
        if self.config.targets.is_empty() {
            return HealthStatus::ok("no targets configured");
        }

        let mut unreachable = Vec::new();
        for target in &self.config.targets {
            if !self.is_reachable(target).await {
                unreachable.push(target.as_str());
            }
        }

        if unreachable.is_empty() {
            HealthStatus::ok(format!("{} target(s) reachable", self.config.targets.len()))
        } else {
            warn!(targets = ?unreachable, "Probe targets unreachable");
            HealthStatus::fail(format!("unreachable: {}", unreachable.join(", ")))
        }
    }

    async fn execute(&self, command: &str, _args: &[String]) -> Result<String> {
        match command {
            "check_probe" => Ok(self.health_check().await.detail),
            other => Err(DaemonError::UnsupportedCommand(other.to_string())),
        }
    }
}

#[async_trait]
impl HealthDaemon for ProbePlugin {
    async fn start(
        &self,
        cancel: CancellationToken,
        updates: mpsc::Sender<HealthStatus>,
    ) -> Result<()> {
        info!(targets = ?self.config.targets, "Starting probe daemon");

        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<HealthState> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.stopped.cancelled() => break,
                _ = ticker.tick() => {
                    let status = self.health_check().await.with_component(Self::NAME);
                    if last == Some(status.state) {
                        continue;
                    }
                    last = Some(status.state);
                    if updates.send(status).await.is_err() {
                        debug!("Health update channel closed");
                        break;
                    }
                }
            }
        }

        info!("Probe daemon stopped");
        Ok(())
    }

    fn stop(&self) {
        if !self.stopped.is_cancelled() {
            info!("Stopping probe daemon");
            self.stopped.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    fn probe(targets: Vec<String>) -> ProbePlugin {
        ProbePlugin::new(ProbeConfig {
            targets,
            interval: 1,
            connect_timeout_ms: 500,
        })
    }

    #[tokio::test]
    async fn test_no_targets_is_ok() {
        let status = probe(Vec::new()).health_check().await;
        assert_eq!(status.state, HealthState::Ok);
        assert_eq!(status.detail, "no targets configured");
    }

    #[tokio::test]
    async fn test_reachable_and_unreachable_targets() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = listener.local_addr().unwrap().to_string();
        let down = closed_port().await;

        let healthy = probe(vec![up.clone()]).health_check().await;
        assert_eq!(healthy.state, HealthState::Ok);

        let failing = probe(vec![up, down.clone()]).health_check().await;
        assert_eq!(failing.state, HealthState::Fail);
        assert_eq!(failing.detail, format!("unreachable: {}", down));
    }

    #[tokio::test]
    async fn test_check_probe_returns_detail() {
        let out = probe(Vec::new()).execute("check_probe", &[]).await.unwrap();
        assert_eq!(out, "no targets configured");
    }

    #[tokio::test]
    async fn test_daemon_pushes_first_status_and_stops() {
        let plugin = Arc::new(probe(vec![closed_port().await]));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let runner = {
            let plugin = Arc::clone(&plugin);
            let cancel = cancel.clone();
            tokio::spawn(async move { plugin.start(cancel, tx).await })
        };

        let first = rx.recv().await.unwrap();
        assert_eq!(first.state, HealthState::Fail);
        assert_eq!(first.component_name, "probe");

        plugin.stop();
        plugin.stop();
        runner.await.unwrap().unwrap();
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_daemon_exits_on_cancellation() {
        let plugin = Arc::new(probe(Vec::new()));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let runner = {
            let plugin = Arc::clone(&plugin);
            let cancel = cancel.clone();
            tokio::spawn(async move { plugin.start(cancel, tx).await })
        };

        assert!(rx.recv().await.unwrap().is_ok());
        cancel.cancel();
        runner.await.unwrap().unwrap();
    }
}
