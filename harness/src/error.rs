use crate::group::GroupOperation;
use provisioner::ProvisionError;
use runtime::RuntimeError;
use thiserror::Error;

/// A runtime call against one named container failed
#[derive(Error, Debug)]
#[error("Failed to {operation} container '{container}': {source}")]
pub struct ContainerOperationError {
    pub operation: GroupOperation,
    pub container: String,
    #[source]
    pub source: RuntimeError,
}

/// Errors surfaced by the harness to the test session
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Setup could not provision the local cluster
    #[error("Provisioning failed: {0}")]
    Provisioning(#[source] ProvisionError),

    /// Teardown could not destroy the local cluster
    #[error("Failed to destroy local cluster: {0}")]
    Destroy(#[source] ProvisionError),

    #[error(transparent)]
    ContainerOperation(#[from] ContainerOperationError),

    /// Best-effort group operation finished with one or more failures
    #[error("{operation} failed for {} container(s): {failures}", .failures.len())]
    GroupOperation {
        operation: GroupOperation,
        failures: ContainerFailures,
    },

    #[error("Container '{0}' appears more than once in the group")]
    DuplicateContainer(String),

    #[error("Unknown role '{role}'. Known roles: {}", .known.join(", "))]
    UnknownRole { role: String, known: Vec<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Test session interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Failures collected by a best-effort group operation, in group order
#[derive(Debug, Default)]
pub struct ContainerFailures(pub Vec<ContainerOperationError>);

impl std::ops::Deref for ContainerFailures {
    type Target = [ContainerOperationError];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ContainerFailures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{} ({})", failure.container, failure.source)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(container: &str) -> ContainerOperationError {
        ContainerOperationError {
            operation: GroupOperation::Stop,
            container: container.to_string(),
            source: RuntimeError::CommandFailed {
                operation: "stop".to_string(),
                container: container.to_string(),
                reason: "no such container".to_string(),
            },
        }
    }

    #[test]
    fn test_container_operation_error_names_container_and_operation() {
        let message = failure("peloton-mesos-agent1").to_string();
        assert!(message.starts_with("Failed to stop container 'peloton-mesos-agent1'"));
        assert!(message.contains("no such container"));
    }

    #[test]
    fn test_group_operation_error_lists_every_failure() {
        let error = HarnessError::GroupOperation {
            operation: GroupOperation::Stop,
            failures: ContainerFailures(vec![failure("a"), failure("c")]),
        };
        let message = error.to_string();
        assert!(message.starts_with("stop failed for 2 container(s)"));
        assert!(message.contains("a ("));
        assert!(message.contains("c ("));
    }

    #[test]
    fn test_unknown_role_lists_known_roles() {
        let error = HarnessError::UnknownRole {
            role: "scheduler".to_string(),
            known: vec!["jobmgr".to_string(), "mesos-agent".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Unknown role 'scheduler'. Known roles: jobmgr, mesos-agent"
        );
    }
}
