//! Scoped test sessions.
//!
//! [`run_session`] is the usual entry point: it sets the environment up,
//! runs the test body, and tears the environment down exactly once however
//! the body ends. [`TestSession`] exposes the same guarantee as an explicit
//! guard for callers that need to interleave their own steps.

use crate::error::{HarnessError, HarnessResult};
use crate::group::ContainerGroup;
use crate::lifecycle::{LifecycleController, TeardownOutcome};
use crate::topology::{ClusterTopology, JOB_MANAGER, MESOS_AGENT, MESOS_MASTER};
use futures::FutureExt;
use provisioner::ProvisionOptions;
use runtime::RuntimeClient;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What tests use to reach the cluster's containers. Cheap to clone.
#[derive(Clone)]
pub struct SessionContext {
    runtime: Arc<dyn RuntimeClient>,
    topology: ClusterTopology,
}

impl SessionContext {
    pub fn new(runtime: Arc<dyn RuntimeClient>, topology: ClusterTopology) -> Self {
        Self { runtime, topology }
    }

    pub fn runtime(&self) -> Arc<dyn RuntimeClient> {
        Arc::clone(&self.runtime)
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    /// All containers of a role, in replica order
    pub fn group(&self, role: &str) -> HarnessResult<ContainerGroup> {
        let names = self.topology.container_names(role)?;
        ContainerGroup::new(self.runtime(), names)
    }

    /// Arbitrary containers, in the given order
    pub fn group_of<I, S>(&self, names: I) -> HarnessResult<ContainerGroup>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ContainerGroup::new(self.runtime(), names)
    }

    pub fn mesos_master(&self) -> HarnessResult<ContainerGroup> {
        self.group(MESOS_MASTER)
    }

    pub fn job_managers(&self) -> HarnessResult<ContainerGroup> {
        self.group(JOB_MANAGER)
    }

    pub fn mesos_agents(&self) -> HarnessResult<ContainerGroup> {
        self.group(MESOS_AGENT)
    }
}

/// Guard for a set-up environment. Call [`TestSession::end`] to tear it down.
pub struct TestSession {
    controller: Option<LifecycleController>,
    context: SessionContext,
}

impl TestSession {
    /// Run setup. If it fails the controller is dropped without teardown,
    /// since nothing usable was brought up.
    pub async fn begin(
        mut controller: LifecycleController,
        options: &ProvisionOptions,
    ) -> HarnessResult<Self> {
        controller.setup(options).await?;
        let context = controller.session_context();

        Ok(Self {
            controller: Some(controller),
            context,
        })
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn group(&self, role: &str) -> HarnessResult<ContainerGroup> {
        self.context.group(role)
    }

    /// Tear the environment down. Consumes the session so teardown cannot
    /// run twice through it.
    pub async fn end(mut self) -> HarnessResult<TeardownOutcome> {
        match self.controller.take() {
            Some(mut controller) => controller.teardown().await,
            None => Ok(TeardownOutcome::AlreadyReleased),
        }
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if self.controller.is_some() {
            warn!("test session dropped without teardown; the cluster may still be running");
        }
    }
}

/// Result of a session whose body ran to completion.
///
/// The body's value is kept even when teardown fails afterwards.
#[derive(Debug)]
pub struct SessionReport<T> {
    pub value: T,
    pub teardown: HarnessResult<TeardownOutcome>,
}

/// Run `body` inside a set-up environment, tearing down on Ctrl-C.
pub async fn run_session<F, Fut, T>(
    controller: LifecycleController,
    options: &ProvisionOptions,
    body: F,
) -> HarnessResult<SessionReport<T>>
where
    F: FnOnce(SessionContext) -> Fut,
    Fut: Future<Output = T>,
{
    run_session_until(controller, options, body, ctrl_c()).await
}

/// Like [`run_session`], with the interrupt source supplied by the caller.
///
/// Teardown runs exactly once after setup succeeds: when the body returns
/// (a teardown error is reported alongside the body's value), when it panics
/// (the panic resumes after teardown), and when `interrupt` resolves first
/// (the session then fails with `Interrupted`).
pub async fn run_session_until<F, Fut, T, I>(
    controller: LifecycleController,
    options: &ProvisionOptions,
    body: F,
    interrupt: I,
) -> HarnessResult<SessionReport<T>>
where
    F: FnOnce(SessionContext) -> Fut,
    Fut: Future<Output = T>,
    I: Future<Output = ()>,
{
    let session = TestSession::begin(controller, options).await?;
    let context = session.context().clone();

    let finished = tokio::select! {
        result = AssertUnwindSafe(body(context)).catch_unwind() => Some(result),
        _ = interrupt => None,
    };

    let teardown = session.end().await;

    match finished {
        Some(Ok(value)) => {
            if let Err(e) = &teardown {
                error!("teardown after session: {}", e);
            }
            Ok(SessionReport { value, teardown })
        }
        Some(Err(panic)) => {
            if let Err(e) = teardown {
                error!("teardown after failed session: {}", e);
            }
            std::panic::resume_unwind(panic)
        }
        None => {
            info!("session interrupted");
            teardown?;
            Err(HarnessError::Interrupted)
        }
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("unable to listen for Ctrl-C; interruption will not trigger teardown");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::RoleSpec;
    use async_trait::async_trait;
    use runtime::RuntimeResult;
    use std::time::Duration;

    struct NullRuntime;

    #[async_trait]
    impl RuntimeClient for NullRuntime {
        async fn start(&self, _name: &str) -> RuntimeResult<()> {
            Ok(())
        }

        async fn stop(&self, _name: &str, _grace_period: Duration) -> RuntimeResult<()> {
            Ok(())
        }

        async fn restart(&self, _name: &str, _grace_period: Duration) -> RuntimeResult<()> {
            Ok(())
        }

        async fn fetch_logs(&self, _name: &str) -> RuntimeResult<String> {
            Ok(String::new())
        }

        fn runtime_name(&self) -> &'static str {
            "null"
        }
    }

    #[test]
    fn test_context_groups_follow_topology() {
        let context = SessionContext::new(Arc::new(NullRuntime), ClusterTopology::default());

        assert_eq!(
            context.mesos_master().unwrap().names(),
            ["peloton-mesos-master".to_string()]
        );
        assert_eq!(context.job_managers().unwrap().len(), 2);
        assert_eq!(context.mesos_agents().unwrap().len(), 3);
        assert!(matches!(
            context.group("scheduler"),
            Err(HarnessError::UnknownRole { .. })
        ));
    }

    #[test]
    fn test_context_with_custom_topology() {
        let topology = ClusterTopology::new("ci").with_role(RoleSpec::indexed("worker", 2));
        let context = SessionContext::new(Arc::new(NullRuntime), topology);

        let workers = context.group("worker").unwrap();
        assert_eq!(workers.names(), ["ci-worker0".to_string(), "ci-worker1".to_string()]);
        assert!(context.mesos_master().is_err());

        let adhoc = context.group_of(["ci-worker1", "ci-worker0"]).unwrap();
        assert_eq!(adhoc.names()[0], "ci-worker1");
        assert!(context.group_of(["x", "x"]).is_err());
    }
}
