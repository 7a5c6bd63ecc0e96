//! Session-scoped lifecycle of the cluster under test.
//!
//! The controller brings the environment up once before any test runs and
//! tears it down once after the last one. Teardown picks exactly one action,
//! checked in this order:
//!
//! | condition                | action                                   |
//! |--------------------------|------------------------------------------|
//! | externally-managed mode  | log only                                 |
//! | skip-teardown override   | nothing                                  |
//! | setup never ran          | nothing                                  |
//! | already torn down        | nothing                                  |
//! | otherwise                | capture diagnostic logs, then destroy    |
//!
//! Log capture never fails teardown; each capture is reported as a
//! [`DiagnosticCapture`] and destruction runs regardless.
//!
//! [`LifecycleController::force_teardown`] skips the state checks so a
//! cluster left behind by an earlier run can still be destroyed.

use crate::config::{EnvironmentMode, HarnessConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::session::SessionContext;
use provisioner::{ProvisionOptions, Provisioner};
use runtime::{RuntimeClient, RuntimeError};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Log retrieval for one diagnostic container failed
#[derive(Error, Debug)]
#[error("Failed to capture logs for '{container}': {source}")]
pub struct DiagnosticCaptureError {
    pub container: String,
    #[source]
    pub source: RuntimeError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLogs {
    pub container: String,
    pub logs: String,
}

/// Outcome of capturing one container's logs during teardown
pub type DiagnosticCapture = Result<CapturedLogs, DiagnosticCaptureError>;

/// Where the controller is in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentState {
    /// Setup has not run
    Pending,
    /// Using an externally-managed cluster
    Attached,
    /// Local cluster provisioned by this controller
    Provisioned,
    /// Local cluster destroyed
    Released,
}

/// What teardown did
#[derive(Debug)]
pub enum TeardownOutcome {
    /// Externally-managed cluster; nothing destroyed
    ExternallyManaged,
    /// Skip-teardown override; nothing done
    Skipped,
    /// Setup never ran, so there was nothing to destroy
    NotStarted,
    /// Cluster was already destroyed earlier in the session
    AlreadyReleased,
    /// Logs captured (best effort) and cluster destroyed
    Destroyed { diagnostics: Vec<DiagnosticCapture> },
}

impl TeardownOutcome {
    pub fn destroyed(&self) -> bool {
        matches!(self, TeardownOutcome::Destroyed { .. })
    }
}

pub struct LifecycleController {
    config: HarnessConfig,
    diagnostic_containers: Vec<String>,
    provisioner: Arc<dyn Provisioner>,
    runtime: Arc<dyn RuntimeClient>,
    state: EnvironmentState,
}

impl LifecycleController {
    pub fn new(
        config: HarnessConfig,
        provisioner: Arc<dyn Provisioner>,
        runtime: Arc<dyn RuntimeClient>,
    ) -> HarnessResult<Self> {
        config.validate()?;
        let diagnostic_containers = config.diagnostic_containers()?;

        Ok(Self {
            config,
            diagnostic_containers,
            provisioner,
            runtime,
            state: EnvironmentState::Pending,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> EnvironmentState {
        self.state
    }

    pub fn runtime(&self) -> Arc<dyn RuntimeClient> {
        Arc::clone(&self.runtime)
    }

    /// Handle for building container groups against this environment
    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(self.runtime(), self.config.topology.clone())
    }

    /// Bring the environment up.
    ///
    /// Must run at most once per session. In externally-managed mode this
    /// only records that the cluster is assumed to be running. Otherwise the
    /// cluster is provisioned with `options` and the settle delay elapses
    /// before returning. A provisioning failure is fatal to the session.
    pub async fn setup(&mut self, options: &ProvisionOptions) -> HarnessResult<()> {
        info!("setup cluster");
        if self.state != EnvironmentState::Pending {
            warn!(state = ?self.state, "setup called more than once in a session");
        }

        if self.config.mode == EnvironmentMode::External {
            info!("cluster mode");
            self.state = EnvironmentState::Attached;
            return Ok(());
        }

        info!(provisioner = self.provisioner.name(), "local cluster mode");
        if let Err(e) = self.provisioner.provision(options).await {
            error!("provisioning failed: {}", e);
            return Err(HarnessError::Provisioning(e));
        }
        self.state = EnvironmentState::Provisioned;

        let settle_delay = self.config.settle_delay();
        if !settle_delay.is_zero() {
            info!(delay = ?settle_delay, "waiting for cluster to settle");
            sleep(settle_delay).await;
        }

        Ok(())
    }

    /// Tear the environment down. Never fails when setup never ran or
    /// teardown already completed.
    pub async fn teardown(&mut self) -> HarnessResult<TeardownOutcome> {
        info!("teardown cluster");
        if let Some(outcome) = self.held_back() {
            return Ok(outcome);
        }

        match self.state {
            EnvironmentState::Pending => {
                info!("cluster was never started, nothing to tear down");
                Ok(TeardownOutcome::NotStarted)
            }
            EnvironmentState::Released => {
                info!("cluster already torn down");
                Ok(TeardownOutcome::AlreadyReleased)
            }
            EnvironmentState::Attached | EnvironmentState::Provisioned => self.release().await,
        }
    }

    /// Capture diagnostics and destroy the local cluster whether or not this
    /// controller started it. Externally-managed mode and the skip-teardown
    /// override still apply.
    pub async fn force_teardown(&mut self) -> HarnessResult<TeardownOutcome> {
        info!("forced teardown of local cluster");
        if let Some(outcome) = self.held_back() {
            return Ok(outcome);
        }
        self.release().await
    }

    fn held_back(&self) -> Option<TeardownOutcome> {
        if self.config.mode == EnvironmentMode::External {
            info!("cluster mode, no teardown actions");
            return Some(TeardownOutcome::ExternallyManaged);
        }

        if self.config.skip_teardown {
            info!("skip teardown");
            return Some(TeardownOutcome::Skipped);
        }

        None
    }

    async fn release(&mut self) -> HarnessResult<TeardownOutcome> {
        info!("teardown, writing logs");
        let diagnostics = self.capture_diagnostics().await;

        if let Err(e) = self.provisioner.destroy().await {
            error!("failed to destroy local cluster: {}", e);
            return Err(HarnessError::Destroy(e));
        }
        self.state = EnvironmentState::Released;

        Ok(TeardownOutcome::Destroyed { diagnostics })
    }

    /// Fetch logs of every diagnostic container. Failures are logged and
    /// returned, never raised.
    pub async fn capture_diagnostics(&self) -> Vec<DiagnosticCapture> {
        let mut captures = Vec::with_capacity(self.diagnostic_containers.len());

        for container in &self.diagnostic_containers {
            let capture = match self.runtime.fetch_logs(container).await {
                Ok(logs) => {
                    info!(container = %container, "{}", logs);
                    Ok(CapturedLogs {
                        container: container.clone(),
                        logs,
                    })
                }
                Err(source) => {
                    let failure = DiagnosticCaptureError {
                        container: container.clone(),
                        source,
                    };
                    warn!("{}", failure);
                    Err(failure)
                }
            };
            captures.push(capture);
        }

        captures
    }
}
