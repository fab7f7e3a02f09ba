use std::{fmt, path::PathBuf};

use thiserror::Error;

// Identify a fan device in the diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub description: String,
    pub bus: String,
    pub address: String,
}

impl DeviceIdentity {
    pub fn new(description: &str, bus: &str, address: &str) -> Self {
        Self {
            description: description.to_string(),
            bus: bus.to_string(),
            address: address.to_string(),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.description, self.bus, self.address)
    }
}

// A single initialization parameter reported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusItem {
    pub key: String,
    pub value: String,
    pub unit: String,
}

impl StatusItem {
    pub fn new(key: &str, value: impl ToString, unit: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            unit: unit.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device discovery failed: {0}")]
    Discovery(String),
    #[error("Could not access {device}: {reason}")]
    Access { device: String, reason: String },
    #[error("Initialisation of {device} failed: {reason}")]
    Init { device: String, reason: String },
    #[error("{device} returned no initialisation status")]
    NoInitFeedback { device: String },
    #[error("Failed to set {device} channel \"{channel}\": {reason}")]
    Actuation {
        device: String,
        channel: String,
        reason: String,
    },
    #[error("{device} has no speed channel \"{channel}\"")]
    UnknownChannel { device: String, channel: String },
    #[error("I/O error on \"{}\"", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// Enumerate the controllable fan devices on the system
pub trait DeviceSource: Send {
    fn discover(&mut self) -> Result<Vec<Box<dyn FanDevice>>, DeviceError>;
}

// Handle to a physical fan controller
pub trait FanDevice: Send {
    fn identity(&self) -> DeviceIdentity;

    // Names of the channels accepting a fixed speed
    fn channels(&self) -> Vec<String>;

    // Open a session with the device.
    // The session is closed when the returned value is dropped.
    fn connect(&mut self) -> Result<Box<dyn DeviceConnection + '_>, DeviceError>;
}

// Open session with a fan device
pub trait DeviceConnection {
    // Prepare the device for fixed speed control.
    // `None` means the device gave no feedback, which counts as a failure.
    fn initialize(&mut self) -> Result<Option<Vec<StatusItem>>, DeviceError>;

    // Set the channel to a fixed duty (0-100)
    fn set_fixed_speed(&mut self, channel: &str, duty: u8) -> Result<(), DeviceError>;

    // Hand the device channels back to their automatic control
    fn restore_automatic(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_names_bus_and_address() {
        let identity = DeviceIdentity::new("Kraken X", "hid", "/dev/hidraw3");

        assert_eq!(identity.to_string(), "Kraken X at hid:/dev/hidraw3");
    }

    #[test]
    fn status_item_formats_value() {
        let item = StatusItem::new("fan1 speed", 1240, "rpm");

        assert_eq!(item.value, "1240");
        assert_eq!(item.unit, "rpm");
    }
}
