use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::hwmon::DEFAULT_HWMON_ROOT;

// Shortest accepted update interval in seconds
pub const MIN_UPDATE_INTERVAL: f64 = 0.1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open configuration file \"{}\"", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Update interval must be a number of seconds no lower than 0.1, got {0}")]
    InvalidInterval(f64),
    #[error("The sensor group name can't be empty")]
    EmptySensorGroup,
}

// Daemon settings, every field can be left out of the file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    // Sensor group holding the CPU temperature
    pub sensor_group: String,

    // Seconds between two updates
    pub update_interval: f64,

    // Discover and initialize the fan devices before every update
    pub rediscover_each_tick: bool,

    // Give the fans back to automatic control when quitting
    pub restore_auto_on_exit: bool,

    pub hwmon_root: PathBuf,

    // Chip names of the fan controllers to drive, all of them if unset
    pub device_filter: Option<Vec<String>>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sensor_group: "coretemp".to_string(),
            update_interval: 2.,
            rediscover_each_tick: true,
            restore_auto_on_exit: true,
            hwmon_root: PathBuf::from(DEFAULT_HWMON_ROOT),
            device_filter: None,
        }
    }
}

impl DaemonConfig {
    // Parse the Json configuration file at the given path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: DaemonConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;

        Ok(config)
    }

    // Load the file if one was given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interval()?;

        if self.sensor_group.trim().is_empty() {
            return Err(ConfigError::EmptySensorGroup);
        }

        Ok(())
    }

    // Time between two updates, rejects values that don't fit a Duration
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        if self.update_interval.is_nan() || self.update_interval < MIN_UPDATE_INTERVAL {
            return Err(ConfigError::InvalidInterval(self.update_interval));
        }

        Duration::try_from_secs_f64(self.update_interval)
            .map_err(|_| ConfigError::InvalidInterval(self.update_interval))
    }
}
