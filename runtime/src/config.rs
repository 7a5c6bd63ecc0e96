use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which container runtime binary to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimePreference {
    /// Probe for podman, then docker
    #[default]
    Auto,
    Docker,
    Podman,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub runtime: RuntimePreference,
    /// Daemon socket, e.g. `unix:///var/run/docker.sock`. Unset uses the
    /// runtime's own default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Upper bound on a single runtime command, in seconds. Unset waits
    /// indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimePreference::Auto,
            host: None,
            command_timeout_secs: None,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime(mut self, runtime: RuntimePreference) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = Some(secs);
        self
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(host) = &self.host {
            if host.is_empty() {
                return Err("Runtime host cannot be empty".to_string());
            }

            let known_scheme = ["unix://", "tcp://", "ssh://", "npipe://"]
                .iter()
                .any(|scheme| host.starts_with(scheme));
            if !known_scheme {
                return Err(format!(
                    "Runtime host '{}' must start with unix://, tcp://, ssh:// or npipe://",
                    host
                ));
            }
        }

        if self.command_timeout_secs == Some(0) {
            return Err("Command timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.runtime, RuntimePreference::Auto);
        assert!(config.host.is_none());
        assert!(config.command_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RuntimeConfig::new()
            .with_runtime(RuntimePreference::Docker)
            .with_host("unix:///var/run/docker.sock")
            .with_command_timeout_secs(30);

        assert_eq!(config.runtime, RuntimePreference::Docker);
        assert_eq!(config.host.as_deref(), Some("unix:///var/run/docker.sock"));
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = RuntimeConfig::default();

        config.host = Some(String::new());
        assert!(config.validate().is_err());

        config.host = Some("/var/run/docker.sock".to_string());
        assert!(config.validate().is_err());

        config.host = Some("tcp://127.0.0.1:2375".to_string());
        assert!(config.validate().is_ok());

        config.command_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_preference_serializes_lowercase() {
        let json = serde_json::to_string(&RuntimePreference::Podman).unwrap();
        assert_eq!(json, "\"podman\"");

        let parsed: RuntimeConfig = serde_json::from_str(r#"{"runtime":"docker"}"#).unwrap();
        assert_eq!(parsed.runtime, RuntimePreference::Docker);
        assert!(parsed.host.is_none());

        let parsed: RuntimeConfig =
            serde_json::from_str(r#"{"command_timeout_secs":45}"#).unwrap();
        assert_eq!(parsed.command_timeout(), Some(Duration::from_secs(45)));
    }
}
