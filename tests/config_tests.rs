use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use vitalstream::config::{ConfigError, StreamConfig};

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"{
            "port": "/dev/ttyUSB1",
            "reconnect": { "backoff_secs": 0.5, "max_attempts": 5 },
            "alarms": {
                "thresholds": { "heart_rate": { "low": 40.0, "high": 140.0 } },
                "not_available_grace_secs": 5.0
            }
        }"#,
    );

    let config = StreamConfig::load(file.path()).unwrap();

    assert_eq!(config.port, "/dev/ttyUSB1");
    assert_eq!(config.reconnect.max_attempts, Some(5));
    assert!(config.reconnect.blocking);
    assert_eq!(config.alarms.thresholds.heart_rate.low, Some(40.0));
    assert_eq!(config.alarms.grace(), Duration::from_secs(5));
    // Untouched sections keep their defaults
    assert_eq!(config.alarms.thresholds.spo2.low, Some(90.0));
    assert_eq!(config.sampled_data_secs, 7);
}

#[test]
fn test_saved_config_loads_back_unchanged() {
    let mut config = StreamConfig::default();
    config.port = "/dev/ttyACM0".to_string();
    config.pipeline.estimator_restarts = 7;

    let file = write_config(&serde_json::to_string_pretty(&config).unwrap());

    assert_eq!(StreamConfig::load(file.path()).unwrap(), config);
}

#[test]
fn test_missing_file_reports_path() {
    let err = StreamConfig::load("/nonexistent/vitalstream.json").unwrap_err();

    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("/nonexistent/vitalstream.json"));
}

#[test]
fn test_malformed_json_rejected() {
    let file = write_config("{ \"port\": ");
    assert!(matches!(
        StreamConfig::load(file.path()),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_zero_window_rejected() {
    let file = write_config(r#"{ "pipeline": { "estimation_window": 0 } }"#);
    assert!(matches!(
        StreamConfig::load(file.path()),
        Err(ConfigError::Invalid(_))
    ));
}
