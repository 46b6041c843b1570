use std::path::Path;
use std::time::Duration;

use aqfish_config::{load_config, ConfigError};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn loads_a_real_node_config_file() {
    let config = load_config(&fixture("node-a.yaml")).expect("should load without error");
    assert_eq!(config.node_name, "node-a");
    assert_eq!(config.node_location, "rack-3");
    assert!(config.cluster_auto);
    assert_eq!(config.db_cleanup_interval, Duration::from_secs(300));
    assert_eq!(config.election.vote_window, Duration::from_secs(3));
    assert_eq!(config.drivers.providers.len(), 1);
    assert!(config.drivers.get("test/remote").unwrap().is_remote);
}

#[test]
fn unknown_keys_in_the_file_are_rejected() {
    let err = load_config(&fixture("unknown-key.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::YamlParse { .. }));
}

#[test]
fn missing_file_returns_io_error() {
    let err = load_config(Path::new("/no/such/config.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
