use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, Seek, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::{
    device::{
        DeviceConnection, DeviceError, DeviceIdentity, DeviceSource, FanDevice,
        StatusItem,
    },
    hwmon::{attribute_indices, chips, extract_index, read_trimmed},
};

// Values of the pwmN_enable attribute
const PWM_MODE_MANUAL: &str = "1";
const PWM_MODE_AUTOMATIC: &str = "2";

const PWM_DEFAULT_MAX: u32 = 255;

// Mode found in each pwmN_enable attribute before it was switched to manual.
// Devices are rediscovered every update so the record lives in the source.
type SavedModes = Arc<Mutex<HashMap<PathBuf, String>>>;

// Fan controllers exposed through the Linux hwmon sysfs interface.
// Every chip with at least one `pwmN` attribute is a device.
#[derive(Debug, Clone)]
pub struct HwmonDeviceSource {
    root: PathBuf,

    // Only control the chips with one of these names
    filter: Option<Vec<String>>,

    saved_modes: SavedModes,
}

impl HwmonDeviceSource {
    pub fn new(root: &Path, filter: Option<Vec<String>>) -> Self {
        Self {
            root: root.to_path_buf(),
            filter,
            saved_modes: SavedModes::default(),
        }
    }
}

impl DeviceSource for HwmonDeviceSource {
    fn discover(&mut self) -> Result<Vec<Box<dyn FanDevice>>, DeviceError> {
        let chips = chips(&self.root).map_err(|err| {
            DeviceError::Discovery(format!("{}: {err}", self.root.display()))
        })?;

        let mut devices: Vec<Box<dyn FanDevice>> = Vec::new();

        for chip in chips {
            if let Some(filter) = &self.filter {
                if !filter.contains(&chip.name) {
                    continue;
                }
            }

            let pwms = attribute_indices(&chip.dir, "pwm", "").unwrap_or_default();
            if pwms.is_empty() {
                continue;
            }

            devices.push(Box::new(HwmonFanDevice {
                identity: DeviceIdentity::new(&chip.name, "hwmon", &chip.address()),
                dir: chip.dir,
                pwms,
                saved_modes: self.saved_modes.clone(),
            }));
        }

        Ok(devices)
    }
}

#[derive(Debug, Clone)]
pub struct HwmonFanDevice {
    identity: DeviceIdentity,
    dir: PathBuf,

    // Indices of the pwmN attributes
    pwms: Vec<u32>,

    saved_modes: SavedModes,
}

impl HwmonFanDevice {
    fn attribute(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    // Raw value written for a 100% duty
    fn pwm_max(&self, index: u32) -> u32 {
        read_trimmed(self.attribute(&format!("pwm{index}_max")))
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|max| *max > 0)
            .unwrap_or(PWM_DEFAULT_MAX)
    }
}

impl FanDevice for HwmonFanDevice {
    fn identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    fn channels(&self) -> Vec<String> {
        self.pwms.iter().map(|i| format!("pwm{i}")).collect()
    }

    // Open every pwm attribute for writing,
    // the files are closed with the connection
    fn connect(&mut self) -> Result<Box<dyn DeviceConnection + '_>, DeviceError> {
        let mut outputs = Vec::with_capacity(self.pwms.len());

        for &index in &self.pwms {
            let path = self.attribute(&format!("pwm{index}"));

            let file = OpenOptions::new().write(true).open(&path).map_err(|err| {
                DeviceError::Access {
                    device: self.identity.to_string(),
                    reason: format!("{}: {err}", path.display()),
                }
            })?;

            outputs.push((index, file));
        }

        Ok(Box::new(HwmonConnection {
            device: self,
            outputs,
        }))
    }
}

pub struct HwmonConnection<'a> {
    device: &'a HwmonFanDevice,
    outputs: Vec<(u32, File)>,
}

impl HwmonConnection<'_> {
    // Switch the channel to manual control, remembering the mode
    // it was in the first time it's switched
    fn enable_manual(&self, index: u32) -> io::Result<()> {
        let enable = self.device.attribute(&format!("pwm{index}_enable"));

        // Chips without mode selection are always manual
        if !enable.exists() {
            return Ok(());
        }

        let current = read_trimmed(&enable)?;
        if current != PWM_MODE_MANUAL {
            if let Ok(mut saved) = self.device.saved_modes.lock() {
                saved.entry(enable.clone()).or_insert(current);
            }
        }

        fs::write(enable, PWM_MODE_MANUAL)
    }

    // Put back the mode saved by `enable_manual`,
    // plain automatic mode if none was saved
    fn restore_mode(&self, index: u32) -> io::Result<()> {
        let enable = self.device.attribute(&format!("pwm{index}_enable"));

        if !enable.exists() {
            return Ok(());
        }

        let mode = self
            .device
            .saved_modes
            .lock()
            .ok()
            .and_then(|saved| saved.get(&enable).cloned())
            .unwrap_or_else(|| PWM_MODE_AUTOMATIC.to_string());

        fs::write(enable, mode)
    }

    fn actuation_error(&self, channel: &str, reason: String) -> DeviceError {
        DeviceError::Actuation {
            device: self.device.identity.to_string(),
            channel: channel.to_string(),
            reason,
        }
    }
}

impl DeviceConnection for HwmonConnection<'_> {
    fn initialize(&mut self) -> Result<Option<Vec<StatusItem>>, DeviceError> {
        let mut status = Vec::new();

        for &(index, _) in &self.outputs {
            self.enable_manual(index)
                .map_err(|err| DeviceError::Init {
                    device: self.device.identity.to_string(),
                    reason: format!("pwm{index} manual mode: {err}"),
                })?;

            let pwm = read_trimmed(self.device.attribute(&format!("pwm{index}")))
                .ok()
                .and_then(|v| v.parse::<u32>().ok());

            if let Some(raw) = pwm {
                let duty = raw * 100 / self.device.pwm_max(index);
                status.push(StatusItem::new(&format!("pwm{index} duty"), duty, "%"));
            }

            let rpm = read_trimmed(self.device.attribute(&format!("fan{index}_input")))
                .ok()
                .and_then(|v| v.parse::<u32>().ok());

            if let Some(rpm) = rpm {
                status.push(StatusItem::new(&format!("fan{index} speed"), rpm, "rpm"));
            }
        }

        if status.is_empty() {
            return Ok(None);
        }

        Ok(Some(status))
    }

    fn set_fixed_speed(&mut self, channel: &str, duty: u8) -> Result<(), DeviceError> {
        let index = extract_index(channel, "pwm", "");

        let max = match index {
            Some(index) => self.device.pwm_max(index),
            None => PWM_DEFAULT_MAX,
        };

        let Some((_, file)) = self
            .outputs
            .iter_mut()
            .find(|(i, _)| Some(*i) == index)
        else {
            return Err(DeviceError::UnknownChannel {
                device: self.device.identity.to_string(),
                channel: channel.to_string(),
            });
        };

        let value = u32::from(duty.min(100)) * max / 100;

        write_value(file, value).map_err(|err| self.actuation_error(channel, err.to_string()))
    }

    fn restore_automatic(&mut self) -> Result<(), DeviceError> {
        let mut first_error = None;

        // Attempt every channel even if one fails
        for &(index, _) in &self.outputs {
            if let Err(err) = self.restore_mode(index) {
                first_error.get_or_insert_with(|| {
                    self.actuation_error(&format!("pwm{index}"), err.to_string())
                });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// Replace the whole content of an attribute file with the value
fn write_value(file: &mut File, value: u32) -> io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    file.write_all(format!("{value}\n").as_bytes())
}
