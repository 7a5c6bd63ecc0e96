//! Provisioning boundary for locally-provisioned test clusters.
//!
//! The harness never builds a cluster itself; it asks a [`Provisioner`] to
//! bring one up with a set of [`ProvisionOptions`] and later to destroy it.
//! [`CommandProvisioner`] is the stock implementation, driving an external
//! cluster tool through configured commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub mod command;

pub use command::{CommandProvisioner, CommandSpec, ProvisionerConfig};

/// Errors related to cluster provisioning
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },
    #[error("Command '{command}' timed out after {duration:?}")]
    Timeout { command: String, duration: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Options passed to a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionOptions {
    /// Named feature toggles, e.g. `peloton = true`
    pub features: BTreeMap<String, bool>,
    /// Extra environment passed verbatim to the provisioning tool
    pub env: BTreeMap<String, String>,
}

impl ProvisionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.features.insert(name.into(), enabled);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn is_enabled(&self, feature: &str) -> bool {
        self.features.get(feature).copied().unwrap_or(false)
    }

    /// Flatten the options into the environment a provisioning tool sees.
    ///
    /// Each feature becomes `ENABLE_<NAME>=true|false`, with the name
    /// upper-cased and `-` mapped to `_`. Explicit `env` entries win over
    /// generated ones.
    pub fn to_env_vars(&self) -> BTreeMap<String, String> {
        let mut vars: BTreeMap<String, String> = self
            .features
            .iter()
            .map(|(name, enabled)| {
                let key = format!("ENABLE_{}", name.to_uppercase().replace('-', "_"));
                (key, enabled.to_string())
            })
            .collect();

        for (key, value) in &self.env {
            vars.insert(key.clone(), value.clone());
        }

        vars
    }

    pub fn validate(&self) -> ProvisionResult<()> {
        for name in self.features.keys() {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(ProvisionError::InvalidConfig(format!(
                    "Feature name '{}' must be non-empty and contain only [A-Za-z0-9_-]",
                    name
                )));
            }
        }

        if let Some(key) = self.env.keys().find(|key| key.is_empty() || key.contains('=')) {
            return Err(ProvisionError::InvalidConfig(format!(
                "Invalid environment variable name '{}'",
                key
            )));
        }

        Ok(())
    }
}

/// Brings a local test cluster up and tears it down
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, options: &ProvisionOptions) -> ProvisionResult<()>;

    /// Destroy the cluster. Implementations should tolerate a cluster that
    /// is already gone.
    async fn destroy(&self) -> ProvisionResult<()>;

    fn name(&self) -> &str;
}
