pub mod config;
pub mod daemon;
pub mod error;
pub mod health;
pub mod logging;
pub mod plugin;
pub mod plugin_registry;
pub mod plugins;

pub use config::Config;
pub use error::{DaemonError, Result};
pub use health::{HealthState, HealthStatus};
pub use plugin::{HealthDaemon, Plugin};
pub use plugin_registry::PluginManager;
