use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    hwmon::{attribute_indices, chips, read_trimmed},
    sensor::{SensorError, SensorSource, TempReading},
};

// Temperature sensors exposed through the Linux hwmon sysfs interface.
// Each chip name ("coretemp", "k10temp", ...) is a sensor group and
// its `tempN_input` files are the group entries, in index order.
#[derive(Debug, Clone)]
pub struct HwmonSensors {
    root: PathBuf,
}

impl HwmonSensors {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl SensorSource for HwmonSensors {
    fn temperatures(&self) -> Result<HashMap<String, Vec<TempReading>>, SensorError> {
        let chips = chips(&self.root).map_err(|source| SensorError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut groups: HashMap<String, Vec<TempReading>> = HashMap::new();

        for chip in chips {
            let Ok(indices) = attribute_indices(&chip.dir, "temp", "_input") else {
                continue;
            };

            for i in indices {
                let input = chip.dir.join(format!("temp{i}_input"));

                // Values are reported in millidegrees, unreadable sensors are skipped
                let current = match read_trimmed(&input).map(|v| v.parse::<i64>()) {
                    Ok(Ok(milli)) => milli as f64 / 1000.,
                    _ => continue,
                };

                let label = read_trimmed(chip.dir.join(format!("temp{i}_label"))).ok();

                groups
                    .entry(chip.name.clone())
                    .or_default()
                    .push(TempReading { label, current });
            }
        }

        Ok(groups)
    }
}
