use serde::Deserializer;
use serde_derive::Deserialize;
use std::io::Read;
use std::time::Duration;
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use thiserror::*;

/// Capacity of the cache change broadcast channel.
pub const EVENT_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error {0} when reading config")]
    IoError(#[from] std::io::Error),
    #[error("cannot open config file '{0}' : {1}")]
    OpeningError(PathBuf, std::io::Error),
    #[error("UTF8 format error when reading config")]
    Utf8Error,
    #[error("format error {0} when reading config")]
    FormatError(#[from] serde_yaml::Error),
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(deserialize_with = "human_duration", default = "default_latency_min")]
    pub latency_min: Duration,
    #[serde(deserialize_with = "human_duration", default = "default_latency_max")]
    pub latency_max: Duration,
    #[serde(default)]
    pub failure_rate: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            latency_min: default_latency_min(),
            latency_max: default_latency_max(),
            failure_rate: 0.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            event_capacity: EVENT_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UiConfig {
    /// Where the persisted part of the UI state is kept between sessions.
    pub state_file: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
pub struct Config {
    pub log: Option<crate::log::Log>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

impl Config {
    pub fn from_str(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let p = path.as_ref();
        let mut file = File::open(p).map_err(|e| ConfigError::OpeningError(p.to_owned(), e))?;
        let mut contents = vec![];
        file.read_to_end(&mut contents)?;
        let contents = String::from_utf8(contents).map_err(|_| ConfigError::Utf8Error)?;
        let config = Config::from_str(&contents)?;
        Ok(config)
    }
}

fn default_latency_min() -> Duration {
    Duration::from_millis(300)
}

fn default_latency_max() -> Duration {
    Duration::from_millis(1200)
}

fn default_event_capacity() -> usize {
    EVENT_CAPACITY
}

// "300ms", "1s 200ms", ...
fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

pub mod testdata {
    use super::Config;

    #[allow(dead_code)]
    pub fn test_config() -> Config {
        Config::from_str(
            r#"
        log:
            level: trace
            backend:
                type: Stdout
            structured: false
        storage:
            latency_min: 0ms
            latency_max: 0ms
            failure_rate: 0.0
        cache:
            event_capacity: 64
        ui:
            state_file: /tmp/todocache-ui.json
        "#,
        )
        .unwrap()
    }
}
