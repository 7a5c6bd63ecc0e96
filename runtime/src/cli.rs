//! Runtime client that drives the `docker` or `podman` command line.

use crate::client::{RuntimeClient, RuntimeError, RuntimeResult};
use crate::config::{RuntimeConfig, RuntimePreference};
use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Container runtime types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Podman container runtime
    Podman,
    /// Docker container runtime
    Docker,
    /// No container runtime available
    None,
}

impl ContainerRuntime {
    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Podman => "podman",
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::None => "",
        }
    }

    /// Check if this runtime is available
    pub fn is_available(&self) -> bool {
        matches!(self, ContainerRuntime::Podman | ContainerRuntime::Docker)
    }

    /// Environment variable the runtime reads its daemon address from
    pub fn host_env(&self) -> Option<&'static str> {
        match self {
            ContainerRuntime::Podman => Some("CONTAINER_HOST"),
            ContainerRuntime::Docker => Some("DOCKER_HOST"),
            ContainerRuntime::None => None,
        }
    }
}

/// Detect available container runtime in order of preference
pub async fn detect_runtime() -> ContainerRuntime {
    for runtime in [ContainerRuntime::Podman, ContainerRuntime::Docker] {
        let probe = Command::new(runtime.command())
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        if probe.is_ok_and(|status| status.success()) {
            return runtime;
        }
    }

    ContainerRuntime::None
}

pub struct CliRuntimeClient {
    runtime: ContainerRuntime,
    config: RuntimeConfig,
}

impl CliRuntimeClient {
    /// Build a client for the configured runtime, probing the PATH when the
    /// preference is `Auto`.
    pub async fn new(config: RuntimeConfig) -> RuntimeResult<Self> {
        let runtime = match config.runtime {
            RuntimePreference::Auto => detect_runtime().await,
            RuntimePreference::Docker => ContainerRuntime::Docker,
            RuntimePreference::Podman => ContainerRuntime::Podman,
        };

        Self::with_runtime(runtime, config)
    }

    pub fn with_runtime(runtime: ContainerRuntime, config: RuntimeConfig) -> RuntimeResult<Self> {
        config
            .validate()
            .map_err(|message| RuntimeError::InvalidConfig { message })?;

        if !runtime.is_available() {
            return Err(RuntimeError::NoRuntimeAvailable);
        }

        Ok(Self { runtime, config })
    }

    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The runtime CLI only accepts whole seconds; sub-second grace periods
    /// round down to an immediate kill.
    fn grace_seconds(grace_period: Duration) -> String {
        grace_period.as_secs().to_string()
    }

    fn start_args(name: &str) -> Vec<String> {
        vec!["start".to_string(), name.to_string()]
    }

    fn stop_args(name: &str, grace_period: Duration) -> Vec<String> {
        vec![
            "stop".to_string(),
            "-t".to_string(),
            Self::grace_seconds(grace_period),
            name.to_string(),
        ]
    }

    fn restart_args(name: &str, grace_period: Duration) -> Vec<String> {
        vec![
            "restart".to_string(),
            "-t".to_string(),
            Self::grace_seconds(grace_period),
            name.to_string(),
        ]
    }

    fn logs_args(name: &str) -> Vec<String> {
        vec!["logs".to_string(), name.to_string()]
    }

    async fn execute(
        &self,
        operation: &str,
        container: &str,
        args: Vec<String>,
    ) -> RuntimeResult<Output> {
        let mut cmd = Command::new(self.runtime.command());
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let (Some(host), Some(var)) = (&self.config.host, self.runtime.host_env()) {
            cmd.env(var, host);
        }

        debug!(
            runtime = self.runtime.command(),
            args = ?args,
            "running container runtime command"
        );

        let result = match self.config.command_timeout() {
            Some(limit) => timeout(limit, cmd.output()).await.map_err(|_| {
                RuntimeError::OperationTimeout {
                    operation: operation.to_string(),
                    container: container.to_string(),
                    timeout: limit,
                }
            })?,
            None => cmd.output().await,
        };

        let output = result.map_err(|e| RuntimeError::CommandFailed {
            operation: operation.to_string(),
            container: container.to_string(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                operation: operation.to_string(),
                container: container.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl RuntimeClient for CliRuntimeClient {
    async fn start(&self, name: &str) -> RuntimeResult<()> {
        self.execute("start", name, Self::start_args(name)).await?;
        Ok(())
    }

    async fn stop(&self, name: &str, grace_period: Duration) -> RuntimeResult<()> {
        self.execute("stop", name, Self::stop_args(name, grace_period))
            .await?;
        Ok(())
    }

    async fn restart(&self, name: &str, grace_period: Duration) -> RuntimeResult<()> {
        self.execute("restart", name, Self::restart_args(name, grace_period))
            .await?;
        Ok(())
    }

    /// Container stdout followed by container stderr. The runtime splits the
    /// two streams, so interleaving between them is not preserved.
    async fn fetch_logs(&self, name: &str) -> RuntimeResult<String> {
        let output = self.execute("logs", name, Self::logs_args(name)).await?;

        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    fn runtime_name(&self) -> &'static str {
        self.runtime.command()
    }
}
