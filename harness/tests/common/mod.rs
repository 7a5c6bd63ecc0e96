//! Recording fakes for the runtime and provisioning boundaries.

#![allow(dead_code)]

use async_trait::async_trait;
use provisioner::{ProvisionError, ProvisionOptions, ProvisionResult, Provisioner};
use runtime::{RuntimeClient, RuntimeError, RuntimeResult};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Start(String),
    Stop(String, Duration),
    Restart(String, Duration),
    Logs(String),
}

#[derive(Default)]
pub struct FakeRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    fail_start: Vec<String>,
    fail_logs: bool,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_start(names: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_start: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn failing_logs() -> Arc<Self> {
        Arc::new(Self {
            fail_logs: true,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RuntimeClient for FakeRuntime {
    async fn start(&self, name: &str) -> RuntimeResult<()> {
        self.record(RuntimeCall::Start(name.to_string()));
        if self.fail_start.iter().any(|n| n == name) {
            return Err(RuntimeError::CommandFailed {
                operation: "start".to_string(),
                container: name.to_string(),
                reason: "no such container".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self, name: &str, grace_period: Duration) -> RuntimeResult<()> {
        self.record(RuntimeCall::Stop(name.to_string(), grace_period));
        Ok(())
    }

    async fn restart(&self, name: &str, grace_period: Duration) -> RuntimeResult<()> {
        self.record(RuntimeCall::Restart(name.to_string(), grace_period));
        Ok(())
    }

    async fn fetch_logs(&self, name: &str) -> RuntimeResult<String> {
        self.record(RuntimeCall::Logs(name.to_string()));
        if self.fail_logs {
            return Err(RuntimeError::CommandFailed {
                operation: "logs".to_string(),
                container: name.to_string(),
                reason: "Cannot connect to the Docker daemon at unix:///var/run/docker.sock"
                    .to_string(),
            });
        }
        Ok(format!("{} ready", name))
    }

    fn runtime_name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionCall {
    Provision(ProvisionOptions),
    Destroy,
}

/// Provisioner that reports an error when asked to destroy a cluster that
/// does not exist, like a strict cluster tool would.
#[derive(Default)]
pub struct FakeProvisioner {
    calls: Mutex<Vec<ProvisionCall>>,
    running: Mutex<bool>,
    fail_provision: bool,
}

impl FakeProvisioner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_provision: true,
            ..Default::default()
        })
    }

    /// Pretend a cluster from an earlier run is still up
    pub fn already_running() -> Arc<Self> {
        let provisioner = Self::default();
        *provisioner.running.lock().unwrap() = true;
        Arc::new(provisioner)
    }

    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Cluster goes away without the harness asking, e.g. killed by hand
    pub fn vanish(&self) {
        *self.running.lock().unwrap() = false;
    }

    pub fn destroy_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ProvisionCall::Destroy))
            .count()
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(&self, options: &ProvisionOptions) -> ProvisionResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(ProvisionCall::Provision(options.clone()));
        if self.fail_provision {
            return Err(ProvisionError::CommandFailed {
                command: "pcluster setup".to_string(),
                reason: "exit status: 2: mesos-master failed to bind :5050".to_string(),
            });
        }
        *self.running.lock().unwrap() = true;
        Ok(())
    }

    async fn destroy(&self) -> ProvisionResult<()> {
        self.calls.lock().unwrap().push(ProvisionCall::Destroy);
        let mut running = self.running.lock().unwrap();
        if !*running {
            return Err(ProvisionError::CommandFailed {
                command: "pcluster teardown".to_string(),
                reason: "no cluster to tear down".to_string(),
            });
        }
        *running = false;
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
