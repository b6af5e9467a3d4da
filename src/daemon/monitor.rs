use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::{HealthState, HealthStatus};
use crate::plugin::HealthDaemon;
use crate::plugin_registry::PluginManager;

/// Initial wait unit before the first escalation
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(1);
/// Ceiling for both the wait and the backoff unit
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30 * 60);
const DEFAULT_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Poll interval for health daemons
    pub interval: Duration,
    /// Base directory handed to [`PluginManager::diagnostic_dump`]
    pub diagnostic_dir: PathBuf,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub channel_capacity: usize,
}

impl MonitorConfig {
    pub fn from_server(config: &ServerConfig) -> Self {
        Self {
            interval: config.diagnostic_interval(),
            diagnostic_dir: config.diagnostic_dir.clone(),
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }
}

/// The one-shot escalation timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffTimer {
    Idle,
    Armed { deadline: Instant },
    /// Deadline passed, dump in progress
    Fired,
}

/// Failure escalation state.
///
/// Owned by the single consumer of the health update channel, so it needs no
/// locking. Any `OK` update resets it, whichever component sent it; failures
/// are not tracked per target.
#[derive(Debug)]
pub struct Escalation {
    consecutive_failures: u32,
    backoff: Duration,
    max_backoff: Duration,
    timer: BackoffTimer,
}

impl Escalation {
    pub fn new(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            backoff: base_backoff.min(max_backoff),
            max_backoff,
            timer: BackoffTimer::Idle,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn timer(&self) -> BackoffTimer {
        self.timer
    }

    pub fn is_backing_off(&self) -> bool {
        self.timer != BackoffTimer::Idle
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.timer {
            BackoffTimer::Armed { deadline } => Some(deadline),
            _ => None,
        }
    }

    pub fn on_update(&mut self, status: &HealthStatus, now: Instant) {
        debug!(
            plugin = %status.component_name,
            status = %status.state_label,
            "Received health update"
        );

        match status.state {
            HealthState::Fail => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.timer == BackoffTimer::Idle {
                    let delay = self
                        .backoff
                        .saturating_mul(self.consecutive_failures)
                        .min(self.max_backoff);
                    self.timer = BackoffTimer::Armed {
                        deadline: now + delay,
                    };
                    warn!(
                        plugin = %status.component_name,
                        consecutive_fails = self.consecutive_failures,
                        backoff = ?delay,
                        "Health check failed"
                    );
                }
            }
            HealthState::Ok => {
                if self.is_backing_off() {
                    info!(plugin = %status.component_name, "Health recovered, cancelling escalation");
                }
                self.consecutive_failures = 0;
                self.timer = BackoffTimer::Idle;
            }
            HealthState::Warn | HealthState::Error => {
                info!(
                    plugin = %status.component_name,
                    state = %status.state,
                    detail = %status.detail,
                    "Non-escalating health update"
                );
            }
        }
    }

    /// Returns true when a dump is due.
    pub fn on_timer_fired(&mut self) -> bool {
        match self.timer {
            BackoffTimer::Armed { .. } => {
                self.timer = BackoffTimer::Fired;
                true
            }
            _ => false,
        }
    }

    /// The next failure starts a fresh wait at the doubled unit.
    pub fn dump_completed(&mut self) {
        self.backoff = self.backoff.saturating_mul(2).min(self.max_backoff);
        self.timer = BackoffTimer::Idle;
    }
}

/// Drives every health daemon plugin and escalates sustained failures into
/// diagnostic dumps.
pub struct DiagnosticMonitor {
    config: MonitorConfig,
    plugins: Arc<PluginManager>,
}

impl DiagnosticMonitor {
    pub fn new(config: MonitorConfig, plugins: Arc<PluginManager>) -> Self {
        Self { config, plugins }
    }

    /// Runs until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval = ?self.config.interval, "Starting Diagnostic Monitor");

        let daemons = self.plugins.health_daemons();
        for daemon in &daemons {
            info!(plugin = %daemon.name(), "Registering monitoring plugin");
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let mut tasks = JoinSet::new();

        for daemon in &daemons {
            let daemon = Arc::clone(daemon);
            let cancel = cancel.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                if let Err(e) = daemon.start(cancel, tx).await {
                    error!(plugin = %daemon.name(), error = %e, "Error starting monitoring plugin");
                }
            });
        }

        tasks.spawn(poll_health(
            daemons.clone(),
            self.config.interval,
            tx,
            cancel.clone(),
        ));

        let escalation = self.escalate(rx, &daemons, cancel).await;
        debug!(?escalation, "Escalation state at shutdown");

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Monitoring task panicked");
            }
        }
        info!("Diagnostic Monitor stopped");
    }

    /// Single consumer of the update channel; returns the final state.
    async fn escalate(
        &self,
        mut updates: mpsc::Receiver<HealthStatus>,
        daemons: &[Arc<dyn HealthDaemon>],
        cancel: CancellationToken,
    ) -> Escalation {
        let mut escalation = Escalation::new(self.config.base_backoff, self.config.max_backoff);
        let mut producers_open = true;

        loop {
            let deadline = escalation.deadline();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                update = updates.recv(), if producers_open => match update {
                    Some(status) => escalation.on_update(&status, Instant::now()),
                    None => {
                        debug!("All health producers finished");
                        producers_open = false;
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if escalation.on_timer_fired() {
                        info!(
                            consecutive_fails = escalation.consecutive_failures(),
                            "Dumping diagnostics after backoff"
                        );
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                warn!("Diagnostic dump abandoned on shutdown");
                                break;
                            }
                            _ = self.plugins.diagnostic_dump(&self.config.diagnostic_dir) => {}
                        }
                        escalation.dump_completed();
                        debug!(next_backoff = ?escalation.backoff(), "Backoff increased");
                    }
                }
            }
        }

        info!("Stopping Diagnostic Monitor");
        for daemon in daemons {
            daemon.stop();
        }
        escalation
    }
}

/// Periodically polls each health daemon and feeds the results into the
/// shared update channel.
async fn poll_health(
    daemons: Vec<Arc<dyn HealthDaemon>>,
    period: Duration,
    updates: mpsc::Sender<HealthStatus>,
    cancel: CancellationToken,
) {
    info!("Starting Diagnostic Monitor ticker");
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Running periodic health check");
                for daemon in &daemons {
                    let status = daemon.health_check().await.with_component(daemon.name());
                    if updates.send(status).await.is_err() {
                        debug!("Health update channel closed");
                        return;
                    }
                }
            }
        }
    }
    info!("Stopping Diagnostic Monitor ticker");
}
