//! Provisioner backed by an external cluster tool.
//!
//! Setup and teardown are plain commands. Provisioning options reach the
//! tool through its environment (see [`ProvisionOptions::to_env_vars`]), so
//! any script that reads `ENABLE_*` variables can act as the cluster tool.

use crate::{ProvisionError, ProvisionOptions, ProvisionResult, Provisioner};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Configuration for [`CommandProvisioner`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Command that brings the cluster up
    pub setup: CommandSpec,
    /// Command that destroys the cluster
    pub teardown: CommandSpec,
    /// Working directory for both commands (defaults to the current one)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    /// Limit for a single command, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            setup: CommandSpec::new("python").with_args(["tools/pcluster/pcluster.py", "setup"]),
            teardown: CommandSpec::new("python")
                .with_args(["tools/pcluster/pcluster.py", "teardown"]),
            work_dir: None,
            timeout_secs: Some(600),
        }
    }
}

impl ProvisionerConfig {
    pub fn with_setup(mut self, setup: CommandSpec) -> Self {
        self.setup = setup;
        self
    }

    pub fn with_teardown(mut self, teardown: CommandSpec) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> ProvisionResult<()> {
        if self.setup.program.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "Setup command cannot be empty".to_string(),
            ));
        }
        if self.teardown.program.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "Teardown command cannot be empty".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(ProvisionError::InvalidConfig(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs the configured setup/teardown commands
pub struct CommandProvisioner {
    config: ProvisionerConfig,
}

impl CommandProvisioner {
    pub fn new(config: ProvisionerConfig) -> ProvisionResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    async fn run(&self, spec: &CommandSpec, env: &BTreeMap<String, String>) -> ProvisionResult<()> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.config.work_dir {
            cmd.current_dir(dir);
        }

        debug!(command = %spec, env = ?env, "running provisioning command");

        let output = match self.config.timeout() {
            Some(limit) => timeout(limit, cmd.output())
                .await
                .map_err(|_| ProvisionError::Timeout {
                    command: spec.to_string(),
                    duration: limit,
                })??,
            None => cmd.output().await?,
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!(command = %spec.program, "{}", line);
        }

        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: spec.to_string(),
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self, options: &ProvisionOptions) -> ProvisionResult<()> {
        options.validate()?;
        info!(command = %self.config.setup, "provisioning local cluster");
        self.run(&self.config.setup, &options.to_env_vars()).await
    }

    async fn destroy(&self) -> ProvisionResult<()> {
        info!(command = %self.config.teardown, "destroying local cluster");
        self.run(&self.config.teardown, &BTreeMap::new()).await
    }

    fn name(&self) -> &str {
        &self.config.setup.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandSpec {
        CommandSpec::new("sh").with_args(["-c", script])
    }

    #[test]
    fn test_default_config_targets_pcluster() {
        let config = ProvisionerConfig::default();
        assert_eq!(
            config.setup.to_string(),
            "python tools/pcluster/pcluster.py setup"
        );
        assert_eq!(
            config.teardown.to_string(),
            "python tools/pcluster/pcluster.py teardown"
        );
        assert_eq!(config.timeout(), Some(Duration::from_secs(600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ProvisionerConfig::default().with_setup(CommandSpec::new(""));
        assert!(config.validate().is_err());

        let config = ProvisionerConfig::default().with_teardown(CommandSpec::new(""));
        assert!(config.validate().is_err());

        let config = ProvisionerConfig::default().with_timeout_secs(Some(0));
        assert!(matches!(
            CommandProvisioner::new(config),
            Err(ProvisionError::InvalidConfig(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_provision_exports_feature_toggles() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProvisionerConfig::default()
            .with_setup(shell("printf '%s' \"$ENABLE_PELOTON\" > setup.out"))
            .with_teardown(shell("touch teardown.out"))
            .with_work_dir(dir.path());
        let provisioner = CommandProvisioner::new(config).unwrap();

        provisioner
            .provision(&ProvisionOptions::new().with_feature("peloton", true))
            .await
            .unwrap();
        let written = std::fs::read_to_string(dir.path().join("setup.out")).unwrap();
        assert_eq!(written, "true");

        provisioner.destroy().await.unwrap();
        assert!(dir.path().join("teardown.out").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let config = ProvisionerConfig::default()
            .with_setup(shell("echo 'port 5050 already bound' >&2; exit 3"));
        let provisioner = CommandProvisioner::new(config).unwrap();

        let err = provisioner
            .provision(&ProvisionOptions::default())
            .await
            .unwrap_err();
        match err {
            ProvisionError::CommandFailed { command, reason } => {
                assert!(command.starts_with("sh -c"));
                assert!(reason.contains("port 5050 already bound"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout() {
        let config = ProvisionerConfig::default()
            .with_teardown(shell("sleep 5"))
            .with_timeout_secs(Some(1));
        let provisioner = CommandProvisioner::new(config).unwrap();

        let err = provisioner.destroy().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let config = ProvisionerConfig::default()
            .with_setup(CommandSpec::new("cluster-harness-no-such-binary"));
        let provisioner = CommandProvisioner::new(config).unwrap();

        let err = provisioner
            .provision(&ProvisionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Io(_)));
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_running() {
        let config = ProvisionerConfig::default()
            .with_setup(CommandSpec::new("cluster-harness-no-such-binary"));
        let provisioner = CommandProvisioner::new(config).unwrap();

        let err = provisioner
            .provision(&ProvisionOptions::new().with_feature("bad name", true))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidConfig(_)));
    }
}
