// Loading relay.toml from disk and the file-backed store behind it

use std::io::Write;
use tempfile::{NamedTempFile, tempdir};

use ntp_relay::config::{ConfigError, load_config};
use ntp_relay::server_config::{Address, ServerConfig};
use ntp_relay::storage::{FileStore, load_server_config, save_server_config};

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn loads_a_full_file() {
    let file = write_config(
        r#"
[master]
port = "/dev/ttyUSB0"
baud = 57600

[downstream]
port = "/dev/ttyUSB1"

[time]
utc_offset_secs = 0
query_timeout_ms = 800

[delivery]
target_ms = 100
tolerance_ms = 10

[watchdog]
timeout_secs = 30
feed_interval_ms = 2000

[logging]
level = "debug"
"#,
    );
    let config = load_config(file.path()).unwrap();
    assert_eq!(config.master.port, "/dev/ttyUSB0");
    assert_eq!(config.master.baud, 57600);
    assert_eq!(config.downstream.baud, 115200);
    assert_eq!(config.time.utc_offset_secs, 0);
    assert_eq!(config.time.ntp_port, 123);
    assert_eq!(config.delivery.target_ms, 100);
    assert_eq!(config.retry.attempts, 5);
    assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
}

#[test]
fn rejects_invalid_values_at_load() {
    let file = write_config("[delivery]\ntolerance_ms = 1\ntick_ms = 1\n");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));

    let file = write_config("[watchdog]\ntimeout_secs = 60\nfeed_interval_ms = 6000\n");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));

    let file = write_config("[failover]\nthreshold = 0\n");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));
}

#[test]
fn reports_toml_and_io_errors() {
    let file = write_config("[delivery\n");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Toml(_))));

    let dir = tempdir().unwrap();
    let missing = dir.path().join("relay.toml");
    assert!(matches!(load_config(&missing), Err(ConfigError::Io(_))));
}

#[test]
fn stored_servers_survive_a_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("store.json");
    {
        let mut store = FileStore::open(&path).unwrap();
        let config = ServerConfig::new(
            Address::new("192.168.1.2"),
            Some(Address::new("192.169.1.1")),
        );
        save_server_config(&mut store, &config).unwrap();
    }
    let store = FileStore::open(&path).unwrap();
    let config = load_server_config(&store).unwrap();
    assert_eq!(config.primary().as_str(), "192.168.1.2");
    assert_eq!(config.secondary().map(Address::as_str), Some("192.169.1.1"));
}

#[test]
fn corrupt_store_is_an_error() {
    let file = write_config("{ not json");
    assert!(FileStore::open(file.path()).is_err());
}
