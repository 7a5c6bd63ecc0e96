pub mod cli;
pub mod client;
pub mod config;

pub use cli::{detect_runtime, CliRuntimeClient, ContainerRuntime};
pub use client::{RuntimeClient, RuntimeError, RuntimeResult};
pub use config::{RuntimeConfig, RuntimePreference};
