pub mod config;
pub mod error;
pub mod group;
pub mod lifecycle;
pub mod session;
pub mod topology;

pub use config::{EnvironmentMode, HarnessConfig, CLUSTER_ENV, NO_TEARDOWN_ENV};
pub use error::{ContainerFailures, ContainerOperationError, HarnessError, HarnessResult};
pub use group::{ContainerGroup, FailurePolicy, GroupOperation, IMMEDIATE};
pub use lifecycle::{
    CapturedLogs, DiagnosticCapture, DiagnosticCaptureError, EnvironmentState,
    LifecycleController, TeardownOutcome,
};
pub use session::{run_session, run_session_until, SessionContext, SessionReport, TestSession};
pub use topology::{ClusterTopology, RoleSpec, JOB_MANAGER, MESOS_AGENT, MESOS_MASTER};
