use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw YAML representation of a node's config file. Unknown keys are
/// rejected at load time (§6 Configuration).
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub node_name: String,
    pub node_location: Option<String>,
    pub api_address: String,
    #[serde(default)]
    pub cluster_auto: bool,
    #[serde(default)]
    pub disable_auth: bool,
    #[serde(default = "default_db_cleanup_interval")]
    pub db_cleanup_interval: u64,
    #[serde(default = "default_cleanup_startup_grace")]
    pub cleanup_startup_grace: u64,
    #[serde(default = "default_label_remove_at_max")]
    pub label_remove_at_max: u64,
    pub node_slots_limit: Option<u32>,
    #[serde(default = "default_allocation_retry")]
    pub allocation_retry: u32,
    pub cpu_limit: Option<u32>,
    pub mem_target: Option<u32>,
    #[serde(default)]
    pub drivers: RawDriversConfig,
    #[serde(default)]
    pub election: RawElectionConfig,
}

fn default_db_cleanup_interval() -> u64 {
    600
}

/// Time a restarted node waits before the cleanup sweeper first runs, so
/// in-flight cluster reconciliation for recently-written state can land.
fn default_cleanup_startup_grace() -> u64 {
    120
}

fn default_label_remove_at_max() -> u64 {
    86_400
}

fn default_allocation_retry() -> u32 {
    1
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawDriversConfig {
    /// Drivers acting as gateways into remote/shared capacity.
    #[serde(default)]
    pub gates: HashMap<String, RawDriverConfig>,
    /// Drivers provisioning local or cloud resources directly.
    #[serde(default)]
    pub providers: HashMap<String, RawDriverConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct RawDriverConfig {
    pub cpu_limit: Option<u32>,
    pub ram_limit: Option<u32>,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub fail_allocate: bool,
    pub delay_available_capacity_ms: Option<u64>,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawElectionConfig {
    #[serde(default = "default_vote_window_secs")]
    pub vote_window_secs: u64,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

impl Default for RawElectionConfig {
    fn default() -> Self {
        RawElectionConfig {
            vote_window_secs: default_vote_window_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

fn default_vote_window_secs() -> u64 {
    5
}

fn default_retry_backoff_secs() -> u64 {
    5
}
