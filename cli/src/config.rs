//! Config file loading and environment overrides.

use std::path::Path;

use anyhow::{Context, Result};
use chainevents_core::config::from_yaml_file;
use chainevents_core::{NetworkConfig, SubscriberConfig};
use chainevents_observability::LogConfig;
use clap::Args;
use serde::{Deserialize, Serialize};

/// Everything the binary reads from `first-network.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub subscriber: SubscriberConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::new(""),
            subscriber: SubscriberConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Command-line / environment overrides, applied on top of the file.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Event gateway endpoint, e.g. ws://localhost:7053
    #[arg(long, global = true, env = "CHAINEVENTS_ENDPOINT")]
    pub endpoint: Option<String>,
    /// Channel name
    #[arg(long, global = true, env = "CHAINEVENTS_CHANNEL")]
    pub channel: Option<String>,
    /// Enrolled user name
    #[arg(long, global = true, env = "CHAINEVENTS_USER")]
    pub user: Option<String>,
    /// Organization of the user
    #[arg(long, global = true, env = "CHAINEVENTS_ORG")]
    pub org: Option<String>,
    /// Chaincode to receive events from
    #[arg(long, global = true, env = "CHAINEVENTS_CHAINCODE_ID")]
    pub chaincode_id: Option<String>,
    /// Event-name regular expression
    #[arg(long, global = true, env = "CHAINEVENTS_EVENT_FILTER")]
    pub event_filter: Option<String>,
    /// Seconds to run before shutting down
    #[arg(long, global = true, env = "CHAINEVENTS_DURATION")]
    pub duration: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, network: &mut NetworkConfig) {
        if let Some(v) = &self.endpoint {
            network.endpoint = v.clone();
        }
        if let Some(v) = &self.channel {
            network.channel = v.clone();
        }
        if let Some(v) = &self.user {
            network.user = v.clone();
        }
        if let Some(v) = &self.org {
            network.org = v.clone();
        }
        if let Some(v) = &self.chaincode_id {
            network.chaincode_id = v.clone();
        }
        if let Some(v) = &self.event_filter {
            network.event_filter = v.clone();
        }
        if let Some(v) = self.duration {
            network.run_duration_secs = v;
        }
    }
}

/// A resolved config and whether it came from a file.
#[derive(Debug)]
pub struct Loaded {
    pub app: AppConfig,
    pub from_file: bool,
}

/// Load `path`, apply `overrides` and validate the result.
///
/// A missing file is only tolerated when `required` is false; the endpoint
/// then has to come from the overrides.
pub fn load(path: &Path, required: bool, overrides: &Overrides) -> Result<Loaded> {
    let from_file = path.exists() || required;
    let mut app = if from_file {
        from_yaml_file::<AppConfig>(path)
            .with_context(|| format!("loading config from {}", path.display()))?
    } else {
        AppConfig::default()
    };

    overrides.apply(&mut app.network);
    app.network.validate().context("invalid network config")?;
    Ok(Loaded { app, from_file })
}
