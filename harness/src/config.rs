use crate::error::{HarnessError, HarnessResult};
use crate::topology::{ClusterTopology, JOB_MANAGER};
use provisioner::{ProvisionOptions, ProvisionerConfig};
use runtime::RuntimeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Non-empty: run against an already-running cluster
pub const CLUSTER_ENV: &str = "CLUSTER";
/// Non-empty: leave the local cluster running after the session
pub const NO_TEARDOWN_ENV: &str = "NO_TEARDOWN";

/// Where the cluster under test comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentMode {
    /// Cluster is managed elsewhere; never provision or destroy it
    External,
    /// Harness provisions and destroys a cluster on this machine
    #[default]
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub mode: EnvironmentMode,
    pub skip_teardown: bool,
    /// Roles whose logs are captured before the cluster is destroyed
    pub diagnostic_roles: Vec<String>,
    /// Seconds to wait after provisioning so services can bind ports and register
    pub settle_delay_secs: u64,
    pub topology: ClusterTopology,
    pub provision: ProvisionOptions,
    pub provisioner: ProvisionerConfig,
    pub runtime: RuntimeConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            mode: EnvironmentMode::Local,
            skip_teardown: false,
            diagnostic_roles: vec![JOB_MANAGER.to_string()],
            settle_delay_secs: 5,
            topology: ClusterTopology::default(),
            provision: ProvisionOptions::new().with_feature("peloton", true),
            provisioner: ProvisionerConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: EnvironmentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_skip_teardown(mut self, skip_teardown: bool) -> Self {
        self.skip_teardown = skip_teardown;
        self
    }

    pub fn with_settle_delay_secs(mut self, secs: u64) -> Self {
        self.settle_delay_secs = secs;
        self
    }

    pub fn with_topology(mut self, topology: ClusterTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_diagnostic_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.diagnostic_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_provision_options(mut self, provision: ProvisionOptions) -> Self {
        self.provision = provision;
        self
    }

    pub fn with_provisioner(mut self, provisioner: ProvisionerConfig) -> Self {
        self.provisioner = provisioner;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Read a TOML configuration file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> HarnessResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> HarnessResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Self {
        Self::default().apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `CLUSTER` and `NO_TEARDOWN` through `lookup`.
    ///
    /// A flag counts as set when its value is non-empty. Unset or empty
    /// flags leave the current value alone.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_set = |key: &str| lookup(key).is_some_and(|value| !value.is_empty());

        if is_set(CLUSTER_ENV) {
            self.mode = EnvironmentMode::External;
        }
        if is_set(NO_TEARDOWN_ENV) {
            self.skip_teardown = true;
        }
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Container names whose logs teardown captures, role by role
    pub fn diagnostic_containers(&self) -> HarnessResult<Vec<String>> {
        let mut containers = Vec::new();
        for role in &self.diagnostic_roles {
            containers.extend(self.topology.container_names(role)?);
        }
        Ok(containers)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        self.topology.validate()?;
        self.diagnostic_containers()?;

        self.provision
            .validate()
            .map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        self.provisioner
            .validate()
            .map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        self.runtime
            .validate()
            .map_err(HarnessError::InvalidConfig)?;

        Ok(())
    }
}
