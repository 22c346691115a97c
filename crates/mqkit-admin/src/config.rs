//! Provisioner configuration.
//!
//! Values come from defaults, a TOML file, or environment variables:
//!
//! ```bash
//! MQKIT_NAMESRV_ADDR=127.0.0.1:9876
//! MQKIT_DEFAULT_WAIT_SECS=5
//! MQKIT_POLL_INTERVAL_MS=100
//! MQKIT_FAILURE_PAUSE_MS=1000
//! MQKIT_INSTANCE_PREFIX=mqkit-admin
//! MQKIT_RPC_TIMEOUT_MS=3000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::poll::MIN_POLL_INTERVAL;

/// Timing and endpoint settings shared by every provisioning call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Name-server address used when a test does not pass its own
    pub namesrv_addr: String,

    /// Wait budget for read-back polling (default: 5s)
    pub default_wait_secs: u64,

    /// Interval between read-back queries (default: 100ms)
    pub poll_interval_ms: u64,

    /// Pause after a failed fan-out target (default: 1s)
    pub failure_pause_ms: u64,

    /// Prefix of the per-session instance name
    pub instance_prefix: String,

    /// Per-call RPC timeout handed to the admin client (default: 3s)
    pub rpc_timeout_ms: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            namesrv_addr: "127.0.0.1:9876".to_string(),
            default_wait_secs: 5,
            poll_interval_ms: 100,
            failure_pause_ms: 1000,
            instance_prefix: "mqkit-admin".to_string(),
            rpc_timeout_ms: 3000,
        }
    }
}

impl ProvisionConfig {
    /// Load from environment variables, falling back to defaults for unset
    /// or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            namesrv_addr: std::env::var("MQKIT_NAMESRV_ADDR").unwrap_or(defaults.namesrv_addr),
            default_wait_secs: env_parse("MQKIT_DEFAULT_WAIT_SECS").unwrap_or(defaults.default_wait_secs),
            poll_interval_ms: env_parse("MQKIT_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval_ms),
            failure_pause_ms: env_parse("MQKIT_FAILURE_PAUSE_MS").unwrap_or(defaults.failure_pause_ms),
            instance_prefix: std::env::var("MQKIT_INSTANCE_PREFIX").unwrap_or(defaults.instance_prefix),
            rpc_timeout_ms: env_parse("MQKIT_RPC_TIMEOUT_MS").unwrap_or(defaults.rpc_timeout_ms),
        }
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn default_wait(&self) -> Duration {
        Duration::from_secs(self.default_wait_secs)
    }

    /// Never shorter than [`MIN_POLL_INTERVAL`], whatever `poll_interval_ms` says.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }

    pub fn failure_pause(&self) -> Duration {
        Duration::from_millis(self.failure_pause_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ProvisionConfig::default();

        assert_eq!(config.default_wait(), Duration::from_secs(5));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.failure_pause(), Duration::from_secs(1));
        assert_eq!(config.rpc_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ProvisionConfig::from_toml_str(
            r#"
            namesrv_addr = "10.0.0.5:9876"
            poll_interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.namesrv_addr, "10.0.0.5:9876");
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.default_wait_secs, 5);
        assert_eq!(config.instance_prefix, "mqkit-admin");
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_wait_secs = 1").unwrap();
        writeln!(file, "failure_pause_ms = 10").unwrap();

        let config = ProvisionConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.default_wait(), Duration::from_secs(1));
        assert_eq!(config.failure_pause(), Duration::from_millis(10));
    }

    #[test]
    fn test_from_env_reads_vars_and_falls_back() {
        // Only this test touches these variables.
        std::env::set_var("MQKIT_POLL_INTERVAL_MS", "50");
        std::env::set_var("MQKIT_DEFAULT_WAIT_SECS", "abc");
        std::env::remove_var("MQKIT_FAILURE_PAUSE_MS");

        let config = ProvisionConfig::from_env();

        std::env::remove_var("MQKIT_POLL_INTERVAL_MS");
        std::env::remove_var("MQKIT_DEFAULT_WAIT_SECS");

        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.default_wait(), Duration::from_secs(5));
        assert_eq!(config.failure_pause(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = ProvisionConfig::from_toml_str("poll_interval_ms = 0").unwrap();

        assert_eq!(config.poll_interval_ms, 0);
        assert_eq!(config.poll_interval(), MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ProvisionConfig::from_toml_str("poll_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, crate::ProvisionError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProvisionConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, crate::ProvisionError::Config(_)));
    }
}
