//! Cluster roles and the container names they map to.
//!
//! A role is a set of interchangeable replicas of one service. Indexed roles
//! name their containers `{prefix}-{role}{i}`; a single non-indexed role is
//! just `{prefix}-{role}`. Replica counts come from configuration, so a
//! cluster with more agents only needs a different topology.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MESOS_MASTER: &str = "mesos-master";
pub const JOB_MANAGER: &str = "jobmgr";
pub const MESOS_AGENT: &str = "mesos-agent";

fn default_replicas() -> usize {
    1
}

fn default_indexed() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default = "default_indexed")]
    pub indexed: bool,
}

impl RoleSpec {
    /// Role whose containers carry a replica index
    pub fn indexed(name: impl Into<String>, replicas: usize) -> Self {
        Self {
            name: name.into(),
            replicas,
            indexed: true,
        }
    }

    /// Role backed by exactly one container without an index suffix
    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replicas: 1,
            indexed: false,
        }
    }

    pub fn container_names(&self, prefix: &str) -> Vec<String> {
        if self.indexed {
            (0..self.replicas)
                .map(|i| format!("{}-{}{}", prefix, self.name, i))
                .collect()
        } else {
            vec![format!("{}-{}", prefix, self.name)]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterTopology {
    pub prefix: String,
    pub roles: Vec<RoleSpec>,
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self {
            prefix: "peloton".to_string(),
            roles: vec![
                RoleSpec::single(MESOS_MASTER),
                RoleSpec::indexed(JOB_MANAGER, 2),
                RoleSpec::indexed(MESOS_AGENT, 3),
            ],
        }
    }
}

impl ClusterTopology {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            roles: Vec::new(),
        }
    }

    /// Add a role, replacing any existing role of the same name
    pub fn with_role(mut self, role: RoleSpec) -> Self {
        match self.roles.iter_mut().find(|r| r.name == role.name) {
            Some(existing) => *existing = role,
            None => self.roles.push(role),
        }
        self
    }

    pub fn with_replicas(mut self, role: &str, replicas: usize) -> Self {
        if let Some(existing) = self.roles.iter_mut().find(|r| r.name == role) {
            existing.replicas = replicas;
        }
        self
    }

    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }

    /// Container names of one role, in replica order
    pub fn container_names(&self, role: &str) -> HarnessResult<Vec<String>> {
        self.role(role)
            .map(|spec| spec.container_names(&self.prefix))
            .ok_or_else(|| HarnessError::UnknownRole {
                role: role.to_string(),
                known: self.role_names(),
            })
    }

    /// Every container in the cluster, role by role
    pub fn all_container_names(&self) -> Vec<String> {
        self.roles
            .iter()
            .flat_map(|spec| spec.container_names(&self.prefix))
            .collect()
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if !is_valid_name(&self.prefix) {
            return Err(HarnessError::InvalidConfig(format!(
                "Container prefix '{}' must be non-empty and contain only [A-Za-z0-9_.-]",
                self.prefix
            )));
        }

        let mut role_names = HashSet::new();
        for role in &self.roles {
            if !is_valid_name(&role.name) {
                return Err(HarnessError::InvalidConfig(format!(
                    "Role name '{}' must be non-empty and contain only [A-Za-z0-9_.-]",
                    role.name
                )));
            }
            if !role_names.insert(role.name.as_str()) {
                return Err(HarnessError::InvalidConfig(format!(
                    "Role '{}' is defined more than once",
                    role.name
                )));
            }
            if role.replicas == 0 {
                return Err(HarnessError::InvalidConfig(format!(
                    "Role '{}' must have at least one replica",
                    role.name
                )));
            }
            if !role.indexed && role.replicas != 1 {
                return Err(HarnessError::InvalidConfig(format!(
                    "Role '{}' is not indexed and can only have one replica",
                    role.name
                )));
            }
        }

        let mut containers = HashSet::new();
        for name in self.all_container_names() {
            if !containers.insert(name.clone()) {
                return Err(HarnessError::DuplicateContainer(name));
            }
        }

        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
