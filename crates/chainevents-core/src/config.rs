//! Network and subscriber configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::EventFilter;

/// Tuning for the subscriber's listeners and shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriberConfig {
    /// How long shutdown waits for listeners before aborting them.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Consecutive stream closures tolerated before a listener gives up.
    #[serde(default = "default_max_closed_retries")]
    pub max_closed_retries: u32,
    /// Pause between receive attempts on a closed stream.
    #[serde(default = "default_closed_retry_delay_ms")]
    pub closed_retry_delay_ms: u64,
}

fn default_grace_period_ms() -> u64 { 5_000 }
fn default_max_closed_retries() -> u32 { 5 }
fn default_closed_retry_delay_ms() -> u64 { 500 }

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            max_closed_retries: default_max_closed_retries(),
            closed_retry_delay_ms: default_closed_retry_delay_ms(),
        }
    }
}

impl SubscriberConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn closed_retry_delay(&self) -> Duration {
        Duration::from_millis(self.closed_retry_delay_ms)
    }
}

/// Where to connect and what to subscribe to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Event gateway endpoint, e.g. `"ws://localhost:7053"`.
    pub endpoint: String,
    /// Channel to query and subscribe on.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Enrolled user the gateway acts as.
    #[serde(default = "default_user")]
    pub user: String,
    /// Organization of `user`.
    #[serde(default = "default_org")]
    pub org: String,
    /// Chaincode whose events are subscribed to.
    #[serde(default = "default_chaincode_id")]
    pub chaincode_id: String,
    /// Event-name regular expression for the chaincode subscription.
    #[serde(default = "default_event_filter")]
    pub event_filter: String,
    /// How long the subscriber runs before shutting down on its own.
    #[serde(default = "default_run_duration_secs")]
    pub run_duration_secs: u64,
    /// Timeout for individual gateway requests.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_channel() -> String { "mychannel".into() }
fn default_user() -> String { "User1".into() }
fn default_org() -> String { "Org1".into() }
fn default_chaincode_id() -> String { "mycc".into() }
fn default_event_filter() -> String { ".*".into() }
fn default_run_duration_secs() -> u64 { 3_600 }
fn default_request_timeout_ms() -> u64 { 10_000 }

impl NetworkConfig {
    /// Create a config for `endpoint` with every other field defaulted.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            channel: default_channel(),
            user: default_user(),
            org: default_org(),
            chaincode_id: default_chaincode_id(),
            event_filter: default_event_filter(),
            run_duration_secs: default_run_duration_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// The chaincode filter this config subscribes with.
    pub fn chaincode_filter(&self) -> EventFilter {
        EventFilter::chaincode(&self.chaincode_id, &self.event_filter)
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_duration_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Check for values that would make setup fail later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".into()));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigError::Invalid("channel must not be empty".into()));
        }
        self.chaincode_filter()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Parse a YAML document into any config type.
pub fn from_yaml_str<T: serde::de::DeserializeOwned>(yaml: &str) -> Result<T, ConfigError> {
    Ok(serde_yaml::from_str(yaml)?)
}

/// Read and parse a YAML config file.
pub fn from_yaml_file<T: serde::de::DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_yaml_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_defaults_fill_in() {
        let cfg: NetworkConfig = from_yaml_str("endpoint: ws://localhost:7053\n").unwrap();
        assert_eq!(cfg.channel, "mychannel");
        assert_eq!(cfg.user, "User1");
        assert_eq!(cfg.org, "Org1");
        assert_eq!(cfg.chaincode_id, "mycc");
        assert_eq!(cfg.event_filter, ".*");
        assert_eq!(cfg.run_duration(), Duration::from_secs(3_600));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn subscriber_overrides() {
        let cfg: SubscriberConfig =
            from_yaml_str("grace_period_ms: 250\nmax_closed_retries: 2\n").unwrap();
        assert_eq!(cfg.grace_period(), Duration::from_millis(250));
        assert_eq!(cfg.max_closed_retries, 2);
        assert_eq!(cfg.closed_retry_delay_ms, 500);
    }

    #[test]
    fn invalid_pattern_fails_validation() {
        let mut cfg = NetworkConfig::new("ws://localhost:7053");
        cfg.event_filter = "[".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = from_yaml_file::<NetworkConfig>("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
