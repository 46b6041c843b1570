use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;
use crate::model::{Config, DriverConfig, DriversConfig, ElectionConfig};
use crate::raw::{RawConfig, RawDriverConfig};

/// Loads and validates a node's YAML config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!(path = %path.display(), "loading node config");
    let raw: RawConfig = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    convert_config(raw, path)
}

fn convert_config(raw: RawConfig, path: &Path) -> Result<Config, ConfigError> {
    if raw.node_name.trim().is_empty() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "node_name must not be empty".to_string(),
        });
    }

    let gates = convert_driver_map(raw.drivers.gates, path)?;
    let providers = convert_driver_map(raw.drivers.providers, path)?;

    Ok(Config {
        node_name: raw.node_name,
        node_location: raw.node_location.unwrap_or_default(),
        api_address: raw.api_address,
        cluster_auto: raw.cluster_auto,
        disable_auth: raw.disable_auth,
        db_cleanup_interval: Duration::from_secs(raw.db_cleanup_interval),
        cleanup_startup_grace: Duration::from_secs(raw.cleanup_startup_grace),
        label_remove_at_max: Duration::from_secs(raw.label_remove_at_max),
        node_slots_limit: raw.node_slots_limit,
        allocation_retry: raw.allocation_retry,
        cpu_limit: raw.cpu_limit,
        mem_target: raw.mem_target,
        drivers: DriversConfig { gates, providers },
        election: ElectionConfig {
            vote_window: Duration::from_secs(raw.election.vote_window_secs),
            retry_backoff: Duration::from_secs(raw.election.retry_backoff_secs),
        },
    })
}

fn convert_driver_map(
    raw: HashMap<String, RawDriverConfig>,
    _path: &Path,
) -> Result<HashMap<String, DriverConfig>, ConfigError> {
    Ok(raw
        .into_iter()
        .map(|(name, cfg)| (name, convert_driver_config(cfg)))
        .collect())
}

fn convert_driver_config(raw: RawDriverConfig) -> DriverConfig {
    DriverConfig {
        cpu_limit: raw.cpu_limit,
        ram_limit: raw.ram_limit,
        is_remote: raw.is_remote,
        fail_allocate: raw.fail_allocate,
        delay_available_capacity: raw.delay_available_capacity_ms.map(Duration::from_millis),
        options: raw.options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_minimal_config() {
        let f = write_fixture(
            r#"
node_name: node-a
api_address: "0.0.0.0:8001"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.node_name, "node-a");
        assert_eq!(cfg.db_cleanup_interval, Duration::from_secs(600));
        assert_eq!(cfg.allocation_retry, 1);
    }

    #[test]
    fn rejects_unknown_keys() {
        let f = write_fixture(
            r#"
node_name: node-a
api_address: "0.0.0.0:8001"
bogus_key: true
"#,
        );
        let err = load_config(f.path()).unwrap_err();
        assert!(matches!(err, ConfigError::YamlParse { .. }));
    }

    #[test]
    fn loads_driver_sections() {
        let f = write_fixture(
            r#"
node_name: node-a
api_address: "0.0.0.0:8001"
drivers:
  providers:
    test:
      cpu_limit: 4
      ram_limit: 8
    test/dev:
      cpu_limit: 2
      fail_allocate: true
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.drivers.providers.len(), 2);
        assert!(cfg.drivers.get("test/dev").unwrap().fail_allocate);
        assert_eq!(cfg.drivers.get("test").unwrap().cpu_limit, Some(4));
    }

    #[test]
    fn missing_file_returns_io_error() {
        let err = load_config(Path::new("/no/such/config.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
