use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::alarm::AlarmThresholds;
use crate::core::channels;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// A streamed channel and its sampling frequency in Hz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub frequency: u32,
}

impl ChannelConfig {
    pub fn new(name: impl Into<String>, frequency: u32) -> Self {
        Self {
            name: name.into(),
            frequency,
        }
    }
}

/// Session timing and retry bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Silence tolerated before the data stream counts as dead
    pub read_timeout_secs: f64,
    /// Per-receive transport timeout
    pub receive_timeout_secs: f64,
    /// Consecutive recoverable handshake errors before escalating
    pub max_io_retries: u32,
    pub retry_pause_secs: f64,
    pub keep_alive_margin_secs: f64,
    pub poll_duration_secs: u64,
    pub priority_confirm_receives: u32,
    pub close_resend_every: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 10.0,
            receive_timeout_secs: 1.0,
            max_io_retries: 12,
            retry_pause_secs: 2.0,
            keep_alive_margin_secs: 5.0,
            poll_duration_secs: 72 * 60 * 60,
            priority_confirm_receives: 12,
            close_resend_every: 12,
        }
    }
}

impl SessionConfig {
    pub fn read_timeout(&self) -> Duration {
        secs(self.read_timeout_secs)
    }

    pub fn receive_timeout(&self) -> Duration {
        secs(self.receive_timeout_secs)
    }

    pub fn retry_pause(&self) -> Duration {
        secs(self.retry_pause_secs)
    }

    pub fn keep_alive_margin(&self) -> Duration {
        secs(self.keep_alive_margin_secs)
    }

    pub fn poll_duration(&self) -> Duration {
        Duration::from_secs(self.poll_duration_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub backoff_secs: f64,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub blocking: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 1.0,
            max_attempts: None,
            blocking: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub estimation_window: usize,
    pub submit_interval_secs: f64,
    pub queue_capacity: usize,
    pub moving_average: usize,
    pub frame_rate: f64,
    pub blink_interval_secs: f64,
    pub watchdog_secs: f64,
    pub estimator_restarts: u32,
    pub lowpass_cutoff_hz: f64,
    pub lowpass_sample_rate_hz: f64,
    /// Numerics and estimates older than this are treated as missing
    pub stale_after_secs: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            estimation_window: 1024,
            submit_interval_secs: 0.8,
            queue_capacity: 4,
            moving_average: 20,
            frame_rate: 30.0,
            blink_interval_secs: 0.5,
            watchdog_secs: 5.0,
            estimator_restarts: 3,
            lowpass_cutoff_hz: 12.0,
            lowpass_sample_rate_hz: 125.0,
            stale_after_secs: 2.0,
        }
    }
}

impl PipelineConfig {
    pub fn submit_interval(&self) -> Duration {
        secs(self.submit_interval_secs)
    }

    pub fn frame_period(&self) -> Duration {
        if self.frame_rate > 0.0 {
            secs(1.0 / self.frame_rate)
        } else {
            Duration::from_millis(33)
        }
    }

    pub fn blink_interval(&self) -> Duration {
        secs(self.blink_interval_secs)
    }

    pub fn watchdog(&self) -> Duration {
        secs(self.watchdog_secs)
    }

    pub fn stale_after(&self) -> Duration {
        secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub thresholds: AlarmThresholds,
    pub not_available_grace_secs: f64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            thresholds: AlarmThresholds::default(),
            not_available_grace_secs: 3.0,
        }
    }
}

impl AlarmConfig {
    pub fn grace(&self) -> Duration {
        secs(self.not_available_grace_secs)
    }
}

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub port: String,
    pub channels: Vec<ChannelConfig>,
    pub polling_interval_secs: f64,
    /// Seconds of history kept per channel
    pub sampled_data_secs: u32,
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
    pub pipeline: PipelineConfig,
    pub alarms: AlarmConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            channels: vec![
                ChannelConfig::new(channels::PLETH, 128),
                ChannelConfig::new(channels::ECG, 256),
            ],
            polling_interval_secs: 0.05,
            sampled_data_secs: 7,
            session: SessionConfig::default(),
            reconnect: ReconnectConfig::default(),
            pipeline: PipelineConfig::default(),
            alarms: AlarmConfig::default(),
        }
    }
}

impl StreamConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(channel) = self.channels.iter().find(|c| c.frequency == 0) {
            return Err(ConfigError::Invalid(format!(
                "channel {} has zero frequency",
                channel.name
            )));
        }
        if self.sampled_data_secs == 0 {
            return Err(ConfigError::Invalid("sampled_data_secs must be positive".into()));
        }
        if self.pipeline.estimation_window == 0 || self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "estimation_window and queue_capacity must be positive".into(),
            ));
        }
        if self.pipeline.moving_average == 0 {
            return Err(ConfigError::Invalid("moving_average must be positive".into()));
        }
        let stale = self.pipeline.stale_after_secs;
        if !stale.is_finite() || stale <= 0.0 {
            return Err(ConfigError::Invalid("stale_after_secs must be positive".into()));
        }
        Ok(())
    }

    /// Wave labels requested in the priority list
    pub fn wave_labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    pub fn polling_interval(&self) -> Duration {
        secs(self.polling_interval_secs)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.session.max_io_retries, 12);
        assert_eq!(config.pipeline.estimation_window, 1024);
        assert_eq!(config.wave_labels(), vec!["Pleth".to_string(), "ECG".to_string()]);
        assert_eq!(config.polling_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = StreamConfig::from_json(json!({
            "port": "/dev/ttyS3",
            "pipeline": { "submit_interval_secs": 1.5 }
        }))
        .unwrap();

        assert_eq!(config.port, "/dev/ttyS3");
        assert_eq!(config.pipeline.submit_interval(), Duration::from_millis(1500));
        assert_eq!(config.pipeline.queue_capacity, 4);
        assert_eq!(config.session.read_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let result = StreamConfig::from_json(json!({
            "channels": [{ "name": "Pleth", "frequency": 0 }]
        }));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
