use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use crate::error::Result;

/// Runs child processes on behalf of plugins, with a fixed set of extra
/// environment variables.
#[derive(Debug, Clone, Default)]
pub struct CommandExecutor {
    env: BTreeMap<String, String>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Runs to completion, capturing stdout and stderr.
    pub async fn run<S: AsRef<OsStr>>(&self, program: S, args: &[String]) -> Result<Output> {
        let program = program.as_ref();
        debug!("Running command: {} {:?}", program.to_string_lossy(), args);

        let output = Command::new(program)
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        debug!(
            "Command finished with exit code: {:?}",
            output.status.code()
        );
        Ok(output)
    }

    /// Stdout and stderr of a finished command, in that order.
    pub fn combined_output(output: &Output) -> String {
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        text
    }
}
