mod network;
mod probe;
mod script;

pub use network::{NetworkConfig, NetworkPlugin};
pub use probe::{ProbeConfig, ProbePlugin};
pub use script::{ScriptConfig, ScriptPlugin};

use std::sync::Arc;

use crate::config::Config;
use crate::plugin_registry::PluginManager;

/// Creates the registry with every built-in probe, configured from `config`
pub fn create_default_registry(config: &Config) -> PluginManager {
    let mut manager = PluginManager::new();

    manager.register(Arc::new(ScriptPlugin::from_config(config)));
    manager.register(Arc::new(NetworkPlugin::from_config(config)));

    // Background monitoring
    manager.register_daemon(Arc::new(ProbePlugin::from_config(config)));

    manager
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_order_and_daemons() {
        let manager = create_default_registry(&Config::default());
        let names: Vec<&str> = manager.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["script", "network", "probe"]);

        let daemons = manager.health_daemons();
        assert_eq!(daemons.len(), 1);
        assert_eq!(daemons[0].name(), "probe");
    }

    #[test]
    fn test_default_registry_commands() {
        let manager = create_default_registry(&Config::default());
        let commands = manager.command_names();
        assert_eq!(
            commands
                .iter()
                .filter(|c| **c == "diagnostic_dump")
                .count(),
            2
        );
        assert!(commands.contains(&"check_probe"));
        assert!(commands.contains(&"run_script"));
    }
}
