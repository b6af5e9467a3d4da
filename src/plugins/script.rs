use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::daemon::executor::CommandExecutor;
use crate::error::{DaemonError, Result};
use crate::health::HealthStatus;
use crate::plugin::{command_help, CommandHelp, Plugin};

const DEFAULT_SCRIPT_DIR: &str = "/usr/share/argeos/scripts";
const LEGACY_CONFIG_KEY: &str = "bash";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptConfig {
    pub script_dir: PathBuf,
    /// Extra environment passed to every script
    pub env_vars: BTreeMap<String, String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            script_dir: PathBuf::from(DEFAULT_SCRIPT_DIR),
            env_vars: BTreeMap::new(),
        }
    }
}

/// Runs every executable file of a directory, in lexical order.
pub struct ScriptPlugin {
    help: CommandHelp,
    config: ScriptConfig,
}

impl ScriptPlugin {
    pub const NAME: &'static str = "script";

    pub fn new(config: ScriptConfig) -> Self {
        Self {
            help: command_help([
                ("run_script", "Run all executable scripts"),
                ("diagnostic_dump", "Run all diagnostic scripts"),
            ]),
            config,
        }
    }

    /// Settings under `script`, or under the older `bash` key when only that
    /// one is present.
    pub fn from_config(config: &Config) -> Self {
        let key = if !config.plugins.contains_key(Self::NAME)
            && config.plugins.contains_key(LEGACY_CONFIG_KEY)
        {
            info!(key = LEGACY_CONFIG_KEY, "Reading script plugin config from legacy key");
            LEGACY_CONFIG_KEY
        } else {
            Self::NAME
        };
        Self::new(config.plugin_config(key))
    }

    async fn scripts(&self) -> std::io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.config.script_dir).await?;
        let mut scripts = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    error!(file = %name, error = %e, "Error getting file info");
                    continue;
                }
            };

            if metadata.is_dir() {
                debug!(directory = %name, "Skipping directory");
                continue;
            }
            if !is_executable(&metadata) {
                info!(file = %name, "Skipping non-executable file");
                continue;
            }
            scripts.push(name);
        }

        scripts.sort();
        Ok(scripts)
    }

    async fn run_scripts(&self, dump_dir: &str) -> Result<String> {
        let scripts = self.scripts().await?;
        let executor = CommandExecutor::new()
            .envs(self.config.env_vars.clone())
            .env("DUMP_DIR", dump_dir);

        debug!(?scripts, "Running scripts");
        let mut output = String::new();
        for script in scripts {
            let path = self.config.script_dir.join(&script);
            let text = match executor.run(&path, &[]).await {
                Ok(result) => {
                    if !result.status.success() {
                        error!(script = %script, status = %result.status, "Script failed");
                        output.push_str(&format!(
                            "Error running script {}: {}\n",
                            script, result.status
                        ));
                    }
                    CommandExecutor::combined_output(&result)
                }
                Err(e) => {
                    error!(script = %script, error = %e, "Error running script");
                    output.push_str(&format!("Error running script {}: {}\n", script, e));
                    String::new()
                }
            };
            output.push_str(&format!("=== Running {} ===\n{}\n", script, text));
        }
        Ok(output)
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    metadata.is_file()
}

#[async_trait]
impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn command_help(&self) -> &CommandHelp {
        &self.help
    }

    async fn health_check(&self) -> HealthStatus {
        if !tokio::fs::try_exists(&self.config.script_dir)
            .await
            .unwrap_or(false)
        {
            return HealthStatus::error("Script directory does not exist");
        }

        match self.scripts().await {
            Err(e) => {
                error!(error = %e, "Error reading script directory");
                HealthStatus::error("Error reading script directory")
            }
            Ok(scripts) if scripts.is_empty() => {
                HealthStatus::warn("No scripts found in script directory")
            }
            Ok(_) => HealthStatus::ok("Script plugin is healthy"),
        }
    }

    async fn execute(&self, command: &str, args: &[String]) -> Result<String> {
        match command {
            "run_script" | "diagnostic_dump" => {
                let dump_dir = args
                    .first()
                    .ok_or(DaemonError::MissingArgument("diagnostic directory"))?;
                self.run_scripts(dump_dir).await
            }
            other => Err(DaemonError::UnsupportedCommand(other.to_string())),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::health::HealthState;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;

    #[test]
    fn test_config_from_legacy_key() {
        let legacy = Config::parse(r#"{"plugins": {"bash": {"script_dir": "/opt/legacy"}}}"#)
            .unwrap();
        let plugin = ScriptPlugin::from_config(&legacy);
        assert_eq!(plugin.config.script_dir, PathBuf::from("/opt/legacy"));

        let both = Config::parse(
            r#"{"plugins": {"bash": {"script_dir": "/opt/legacy"}, "script": {"script_dir": "/opt/current"}}}"#,
        )
        .unwrap();
        let plugin = ScriptPlugin::from_config(&both);
        assert_eq!(plugin.config.script_dir, PathBuf::from("/opt/current"));
    }

    fn write_script(dir: &Path, name: &str, body: &str, mode: u32) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    fn plugin_for(dir: &Path) -> ScriptPlugin {
        ScriptPlugin::new(ScriptConfig {
            script_dir: dir.to_path_buf(),
            env_vars: BTreeMap::from([("SITE".to_string(), "lab".to_string())]),
        })
    }

    #[tokio::test]
    async fn test_runs_executables_in_lexical_order() {
        let tmp = TempDir::new().unwrap();
        write_script(tmp.path(), "20-second", "echo second $SITE", 0o755);
        write_script(tmp.path(), "10-first", "echo first $DUMP_DIR", 0o755);
        write_script(tmp.path(), "readme", "echo never", 0o644);
        std::fs::create_dir(tmp.path().join("subdir")).unwrap();

        let out = plugin_for(tmp.path())
            .execute("diagnostic_dump", &["/tmp/dump-x".to_string()])
            .await
            .unwrap();

        let first = out.find("=== Running 10-first ===").unwrap();
        let second = out.find("=== Running 20-second ===").unwrap();
        assert!(first < second);
        assert!(out.contains("first /tmp/dump-x"));
        assert!(out.contains("second lab"));
        assert!(!out.contains("never"));
    }

    #[tokio::test]
    async fn test_failing_script_does_not_stop_the_rest() {
        let tmp = TempDir::new().unwrap();
        write_script(tmp.path(), "a-broken", "exit 3", 0o755);
        write_script(tmp.path(), "b-fine", "echo fine", 0o755);

        let out = plugin_for(tmp.path())
            .execute("run_script", &["/tmp".to_string()])
            .await
            .unwrap();
        assert!(out.contains("Error running script a-broken"));
        assert!(out.contains("fine"));
    }

    #[tokio::test]
    async fn test_requires_dump_directory() {
        let tmp = TempDir::new().unwrap();
        let err = plugin_for(tmp.path())
            .execute("diagnostic_dump", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::MissingArgument(_)));
    }

    #[tokio::test]
    async fn test_unknown_command_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = plugin_for(tmp.path()).execute("reboot", &[]).await.unwrap_err();
        assert!(matches!(err, DaemonError::UnsupportedCommand(_)));
    }

    #[tokio::test]
    async fn test_health_states() {
        let tmp = TempDir::new().unwrap();
        let missing = plugin_for(&tmp.path().join("absent"));
        assert_eq!(missing.health_check().await.state, HealthState::Error);

        let plugin = plugin_for(tmp.path());
        assert_eq!(plugin.health_check().await.state, HealthState::Warn);

        write_script(tmp.path(), "check", "true", 0o755);
        assert_eq!(plugin.health_check().await.state, HealthState::Ok);
    }

    #[test]
    fn test_config_defaults() {
        let config: ScriptConfig = Config::default().plugin_config(ScriptPlugin::NAME);
        assert_eq!(config.script_dir, PathBuf::from(DEFAULT_SCRIPT_DIR));
        assert!(config.env_vars.is_empty());
    }
}
