use std::collections::HashMap;
use std::time::Duration;

/// Per-instance driver configuration resolved from YAML.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub cpu_limit: Option<u32>,
    pub ram_limit: Option<u32>,
    pub is_remote: bool,
    pub fail_allocate: bool,
    pub delay_available_capacity: Option<Duration>,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriversConfig {
    pub gates: HashMap<String, DriverConfig>,
    pub providers: HashMap<String, DriverConfig>,
}

impl DriversConfig {
    /// Looks up a driver's config by its registry key (`provider` or `provider/instance`).
    pub fn get(&self, key: &str) -> Option<&DriverConfig> {
        self.providers.get(key).or_else(|| self.gates.get(key))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElectionConfig {
    pub vote_window: Duration,
    pub retry_backoff: Duration,
}

/// A validated node configuration, ready to drive process startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub node_name: String,
    pub node_location: String,
    pub api_address: String,
    pub cluster_auto: bool,
    pub disable_auth: bool,
    pub db_cleanup_interval: Duration,
    pub cleanup_startup_grace: Duration,
    pub label_remove_at_max: Duration,
    pub node_slots_limit: Option<u32>,
    pub allocation_retry: u32,
    pub cpu_limit: Option<u32>,
    pub mem_target: Option<u32>,
    pub drivers: DriversConfig,
    pub election: ElectionConfig,
}
