use std::{path::Path, sync::Arc, time::Duration};

use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::{
    config::DaemonConfig,
    devices_manager::{ActuationReport, DevicesManager},
    diagnostics::{Diagnostic, DiagnosticSink},
    errors::LiquifanError,
    fan_curve::{FanCurve, csv_loader::load_curve},
    hwmon::{devices::HwmonDeviceSource, sensors::HwmonSensors},
    sensor::SensorReader,
};

// Result of a single control update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Actuated {
        temp: f64,
        duty: u8,
        report: ActuationReport,
    },
    SensorSkipped,
}

// Read the CPU temperature, map it through the fan curve
// and drive the fans, once per update interval
pub struct Controller {
    curve: Box<dyn FanCurve + Send>,
    devices: DevicesManager,
    sensor: SensorReader,
    sink: Arc<dyn DiagnosticSink>,

    // Time to sleep between two updates
    update_interval: Duration,
}

impl Controller {
    pub fn new(
        curve: Box<dyn FanCurve + Send>,
        devices: DevicesManager,
        sensor: SensorReader,
        sink: Arc<dyn DiagnosticSink>,
        update_interval: Duration,
    ) -> Self {
        Self {
            curve,
            devices,
            sensor,
            sink,
            update_interval,
        }
    }

    // Build a controller driving the hwmon devices of the system
    pub fn from_config(
        curve_path: &Path,
        config: &DaemonConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, LiquifanError> {
        config.validate()?;
        let update_interval = config.interval()?;

        let curve = load_curve(curve_path, sink.as_ref())?;

        let source = HwmonDeviceSource::new(
            &config.hwmon_root,
            config.device_filter.clone(),
        );
        let devices = DevicesManager::new(
            Box::new(source),
            sink.clone(),
            config.rediscover_each_tick,
        )
        .with_restore_on_release(config.restore_auto_on_exit);

        let sensor = SensorReader::new(
            Box::new(HwmonSensors::new(&config.hwmon_root)),
            &config.sensor_group,
        );

        Ok(Self::new(
            Box::new(curve),
            devices,
            sensor,
            sink,
            update_interval,
        ))
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    // Run the controller until the token is cancelled.
    // An update in progress is always completed before quitting.
    pub async fn run(&mut self, run_token: CancellationToken) {
        self.sink.record(Diagnostic::Started {
            interval_secs: self.update_interval.as_secs_f64(),
        });

        loop {
            if run_token.is_cancelled() {
                break;
            }

            self.tick();

            select! {
                _ = run_token.cancelled() => break,
                _ = tokio::time::sleep(self.update_interval) => {}
            }
        }

        self.sink.record(Diagnostic::Stopped {
            reason: "cancellation requested".to_string(),
        });

        self.devices.release();
    }

    // Run a single update
    pub fn tick(&mut self) -> TickOutcome {
        let temp = match self.sensor.current_cpu_temperature() {
            Ok(temp) => temp,
            Err(err) => {
                self.sink.record(Diagnostic::SensorSkipped {
                    error: err.to_string(),
                });

                return TickOutcome::SensorSkipped;
            }
        };

        let duty = self.curve.get_speed(temp);
        let report = self.devices.update(duty);

        self.sink.record(Diagnostic::Tick {
            temp,
            duty,
            devices: report.devices,
            channels: report.channels,
        });

        TickOutcome::Actuated { temp, duty, report }
    }
}
