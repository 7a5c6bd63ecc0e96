//! Ordered groups of containers that tests start, stop and restart together.

use crate::error::{ContainerFailures, ContainerOperationError, HarnessError, HarnessResult};
use runtime::{RuntimeClient, RuntimeResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Grace period used for stop and restart: kill without waiting
pub const IMMEDIATE: Duration = Duration::ZERO;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOperation {
    Start,
    Stop,
    Restart,
    FetchLogs,
}

impl GroupOperation {
    fn past_tense(&self) -> &'static str {
        match self {
            GroupOperation::Start => "started",
            GroupOperation::Stop => "stopped",
            GroupOperation::Restart => "restarted",
            GroupOperation::FetchLogs => "logs fetched",
        }
    }
}

impl std::fmt::Display for GroupOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupOperation::Start => write!(f, "start"),
            GroupOperation::Stop => write!(f, "stop"),
            GroupOperation::Restart => write!(f, "restart"),
            GroupOperation::FetchLogs => write!(f, "fetch logs of"),
        }
    }
}

/// What a group does when one container's operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Surface the first failure and leave the remaining containers alone
    #[default]
    AbortOnFirst,
    /// Attempt every container, then report all failures together
    BestEffort,
}

/// Named, ordered set of containers driven as a unit.
///
/// The group only references containers by name; it owns neither the
/// containers nor the runtime client. Operations run sequentially in list
/// order, so a group listed master-first starts the master first.
#[derive(Clone)]
pub struct ContainerGroup {
    client: Arc<dyn RuntimeClient>,
    names: Vec<String>,
    policy: FailurePolicy,
}

impl std::fmt::Debug for ContainerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerGroup")
            .field("runtime", &self.client.runtime_name())
            .field("names", &self.names)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ContainerGroup {
    /// Build a group without touching the runtime. Names must be unique.
    pub fn new<I, S>(client: Arc<dyn RuntimeClient>, names: I) -> HarnessResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        if let Some(duplicate) = names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(HarnessError::DuplicateContainer(duplicate.clone()));
        }

        Ok(Self {
            client,
            names,
            policy: FailurePolicy::default(),
        })
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    pub async fn start(&self) -> HarnessResult<()> {
        self.apply(GroupOperation::Start).await.map(drop)
    }

    /// Kill every container immediately (zero grace period)
    pub async fn stop(&self) -> HarnessResult<()> {
        self.apply(GroupOperation::Stop).await.map(drop)
    }

    /// Restart every container with a zero grace period
    pub async fn restart(&self) -> HarnessResult<()> {
        self.apply(GroupOperation::Restart).await.map(drop)
    }

    /// Fetch each container's logs, in group order
    pub async fn logs(&self) -> HarnessResult<Vec<(String, String)>> {
        self.apply(GroupOperation::FetchLogs).await
    }

    /// Run `operation` on every container in order. Only log fetches
    /// produce output.
    async fn apply(&self, operation: GroupOperation) -> HarnessResult<Vec<(String, String)>> {
        let mut output = Vec::new();
        let mut failures = Vec::new();

        for name in &self.names {
            match self.invoke(operation, name).await {
                Ok(logs) => {
                    info!("{} {}", name, operation.past_tense());
                    if let Some(logs) = logs {
                        output.push((name.clone(), logs));
                    }
                }
                Err(source) => self.fail(operation, name, source, &mut failures)?,
            }
        }

        Self::finish(operation, failures)?;
        Ok(output)
    }

    async fn invoke(&self, operation: GroupOperation, name: &str) -> RuntimeResult<Option<String>> {
        match operation {
            GroupOperation::Start => self.client.start(name).await.map(|()| None),
            GroupOperation::Stop => self.client.stop(name, IMMEDIATE).await.map(|()| None),
            GroupOperation::Restart => self.client.restart(name, IMMEDIATE).await.map(|()| None),
            GroupOperation::FetchLogs => self.client.fetch_logs(name).await.map(Some),
        }
    }

    /// Record a failure. Under `AbortOnFirst` this returns the error so the
    /// caller stops iterating.
    fn fail(
        &self,
        operation: GroupOperation,
        name: &str,
        source: runtime::RuntimeError,
        failures: &mut Vec<ContainerOperationError>,
    ) -> HarnessResult<()> {
        let failure = ContainerOperationError {
            operation,
            container: name.to_string(),
            source,
        };
        error!(container = %name, operation = %operation, "{}", failure);

        match self.policy {
            FailurePolicy::AbortOnFirst => Err(failure.into()),
            FailurePolicy::BestEffort => {
                failures.push(failure);
                Ok(())
            }
        }
    }

    fn finish(
        operation: GroupOperation,
        failures: Vec<ContainerOperationError>,
    ) -> HarnessResult<()> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::GroupOperation {
                operation,
                failures: ContainerFailures(failures),
            })
        }
    }
}
