use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/argeos.config.json";
const DEFAULT_ADDRESS: &str = ":9999";
const DEFAULT_ADMIN_SOCKET: &str = "/var/run/argeos.asok";
const DEFAULT_DIAGNOSTIC_DIR: &str = "/var/lib/argeos/diagnostics";
const DEFAULT_DIAGNOSTIC_INTERVAL_SECS: u64 = 60;

/// Why [`Config::load`] fell back to defaults.
#[derive(Debug)]
pub enum ConfigFallback {
    Missing(PathBuf),
    Invalid(anyhow::Error),
}

impl ConfigFallback {
    pub fn log(&self) {
        match self {
            ConfigFallback::Missing(path) => {
                tracing::warn!(path = %path.display(), "Config file does not exist, using defaults")
            }
            ConfigFallback::Invalid(e) => {
                tracing::error!(error = %format!("{:#}", e), "Config unusable, using defaults")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// Opaque per-plugin settings keyed by plugin name
    pub plugins: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP bind address; an empty host (":9999") means all interfaces
    #[serde(rename = "host")]
    pub address: String,
    pub admin_socket: PathBuf,
    pub diagnostic_dir: PathBuf,
    /// Poll interval for health daemons, in seconds
    pub diagnostic_interval: u64,
    pub log_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            admin_socket: PathBuf::from(DEFAULT_ADMIN_SOCKET),
            diagnostic_dir: PathBuf::from(DEFAULT_DIAGNOSTIC_DIR),
            diagnostic_interval: DEFAULT_DIAGNOSTIC_INTERVAL_SECS,
            log_file: None,
            log_level: None,
        }
    }
}

impl ServerConfig {
    /// Address in a form `TcpListener::bind` accepts.
    pub fn bind_address(&self) -> String {
        if self.address.starts_with(':') {
            format!("0.0.0.0{}", self.address)
        } else {
            self.address.clone()
        }
    }

    pub fn diagnostic_interval(&self) -> Duration {
        Duration::from_secs(self.diagnostic_interval.max(1))
    }

    /// Replace empty values with defaults.
    fn fill_defaults(&mut self) {
        let defaults = ServerConfig::default();
        if self.address.trim().is_empty() {
            self.address = defaults.address;
        }
        if self.admin_socket.as_os_str().is_empty() {
            self.admin_socket = defaults.admin_socket;
        }
        if self.diagnostic_dir.as_os_str().is_empty() {
            self.diagnostic_dir = defaults.diagnostic_dir;
        }
        if self.diagnostic_interval == 0 {
            self.diagnostic_interval = 1;
        }
        if self.log_file.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            self.log_file = None;
        }
        if self.log_level.as_ref().is_some_and(|l| l.trim().is_empty()) {
            self.log_level = None;
        }
    }
}

impl Config {
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(content).context("Failed to parse JSON config")?;
        config.server.fill_defaults();
        Ok(config)
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Load the config file, falling back to defaults on any problem.
    ///
    /// Runs before logging is set up, so the reason for a fallback is handed
    /// back for the caller to report once a subscriber exists.
    pub fn load(path: &Path) -> (Self, Option<ConfigFallback>) {
        if !path.exists() {
            return (
                Self::default(),
                Some(ConfigFallback::Missing(path.to_path_buf())),
            );
        }

        match Self::try_load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(ConfigFallback::Invalid(e))),
        }
    }

    /// Typed settings for a plugin; a missing or malformed section yields defaults.
    pub fn plugin_config<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let Some(value) = self.plugins.get(name) else {
            tracing::debug!(plugin = name, "No plugin config, using defaults");
            return T::default();
        };

        match serde_json::from_value(value.clone()) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(plugin = name, error = %e, "Invalid plugin config, using defaults");
                T::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        script_dir: String,
        retries: u32,
    }

    impl Default for SampleConfig {
        fn default() -> Self {
            Self {
                script_dir: "/default".to_string(),
                retries: 1,
            }
        }
    }

    #[test]
    fn test_empty_object_yields_defaults() {
        let config = Config::parse("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.bind_address(), "0.0.0.0:9999");
        assert_eq!(config.server.diagnostic_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_empty_strings_are_replaced() {
        let config = Config::parse(
            r#"{"server": {"host": "", "admin_socket": "", "diagnostic_dir": "/tmp/diag", "log_file": ""}}"#,
        )
        .unwrap();
        assert_eq!(config.server.address, ":9999");
        assert_eq!(config.server.admin_socket, PathBuf::from("/var/run/argeos.asok"));
        assert_eq!(config.server.diagnostic_dir, PathBuf::from("/tmp/diag"));
        assert!(config.server.log_file.is_none());
    }

    #[test]
    fn test_explicit_host_and_zero_interval() {
        let config =
            Config::parse(r#"{"server": {"host": "127.0.0.1:7000", "diagnostic_interval": 0}}"#)
                .unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:7000");
        assert_eq!(config.server.diagnostic_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_missing_and_invalid_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let absent = tmp.path().join("absent.json");
        let (config, fallback) = Config::load(&absent);
        assert_eq!(config, Config::default());
        assert!(matches!(fallback, Some(ConfigFallback::Missing(ref p)) if *p == absent));

        let broken = tmp.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(Config::try_load(&broken).is_err());
        let (config, fallback) = Config::load(&broken);
        assert_eq!(config, Config::default());
        let Some(ConfigFallback::Invalid(e)) = fallback else {
            panic!("expected an invalid-config fallback");
        };
        assert!(format!("{:#}", e).contains("broken.json"));
    }

    #[test]
    fn test_load_valid_file_has_no_fallback() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("argeos.json");
        std::fs::write(&path, r#"{"server": {"diagnostic_interval": 5}}"#).unwrap();

        let (config, fallback) = Config::load(&path);
        assert!(fallback.is_none());
        assert_eq!(config.server.diagnostic_interval, 5);
    }

    #[test]
    fn test_plugin_config_lookup() {
        let config = Config::parse(
            r#"{"plugins": {"script": {"script_dir": "/opt/scripts"}, "bad": {"retries": "many"}}}"#,
        )
        .unwrap();

        let script: SampleConfig = config.plugin_config("script");
        assert_eq!(script.script_dir, "/opt/scripts");
        assert_eq!(script.retries, 1);

        let bad: SampleConfig = config.plugin_config("bad");
        assert_eq!(bad, SampleConfig::default());

        let missing: SampleConfig = config.plugin_config("network");
        assert_eq!(missing, SampleConfig::default());
    }
}
