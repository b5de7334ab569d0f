use crate::commandline::OutputFormat;
use anyhow::{Context, Result};
use basenbms_lib::protocol::POLL_SEQUENCE;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Settings of the daemon mode, either taken from the command line or from a YAML file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DaemonConfig {
    #[serde(
        default = "DaemonConfig::default_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
    #[serde(default)]
    pub format: OutputFormat,
    /// Frame types requested round robin, one per interval.
    #[serde(default = "DaemonConfig::default_frame_types")]
    pub frame_types: Vec<u8>,
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

impl DaemonConfig {
    fn default_interval() -> Duration {
        Duration::from_secs(10)
    }

    fn default_frame_types() -> Vec<u8> {
        POLL_SEQUENCE.iter().map(|t| *t as u8).collect()
    }

    pub fn new(interval: Duration, format: OutputFormat) -> Self {
        Self {
            interval,
            format,
            frame_types: Self::default_frame_types(),
        }
    }

    pub fn load(config_file_path: &str) -> Result<Self> {
        log::debug!("Loading config file from {config_file_path:?}");
        let config_file = std::fs::File::open(config_file_path)
            .with_context(|| format!("Cannot open daemon config file {config_file_path:?}"))?;
        let config: Self = serde_yaml::from_reader(&config_file).with_context(|| {
            format!("Cannot read daemon config from file: {config_file_path:?}")
        })?;
        Ok(config)
    }
}
