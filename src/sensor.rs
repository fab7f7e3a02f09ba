use std::{collections::HashMap, path::PathBuf};

use thiserror::Error;

// A single sensor value in °C
#[derive(Debug, Clone, PartialEq)]
pub struct TempReading {
    pub label: Option<String>,
    pub current: f64,
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("No temperature sensor in group \"{group}\"")]
    Unavailable { group: String },
    #[error("Sensor group \"{group}\" reported an invalid temperature: {value}")]
    InvalidReading { group: String, value: f64 },
    #[error("Failed to read sensors at \"{}\"", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// Supply the temperature readings of the system, grouped by sensor name
pub trait SensorSource: Send {
    fn temperatures(&self) -> Result<HashMap<String, Vec<TempReading>>, SensorError>;
}

// Pick the representative CPU temperature out of a sensor source
pub struct SensorReader {
    source: Box<dyn SensorSource>,

    // Sensor group holding the CPU temperature, the first entry is used
    group: String,
}

impl SensorReader {
    pub fn new(source: Box<dyn SensorSource>, group: &str) -> Self {
        Self {
            source,
            group: group.to_string(),
        }
    }

    // Return the current CPU temperature in °C
    pub fn current_cpu_temperature(&self) -> Result<f64, SensorError> {
        let readings = self.source.temperatures()?;

        let reading = readings
            .get(&self.group)
            .and_then(|group| group.first())
            .ok_or_else(|| SensorError::Unavailable {
                group: self.group.clone(),
            })?;

        if !reading.current.is_finite() {
            return Err(SensorError::InvalidReading {
                group: self.group.clone(),
                value: reading.current,
            });
        }

        Ok(reading.current)
    }
}
