use std::sync::Mutex;

use tracing::{debug, error, info, warn};

// Everything the daemon components want to report.
// Components never log directly, they hand a record to the sink
// they were constructed with.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    CurveLoaded { table: Vec<(f64, f64)> },

    DevicesDiscovered { count: usize },
    DiscoveryFailed { error: String },
    DeviceStatus {
        device: String,
        key: String,
        value: String,
        unit: String,
    },
    DeviceFailed { device: String, error: String },
    ActuationFailed {
        device: String,
        channel: Option<String>,
        error: String,
    },
    DeviceReleased { device: String },

    SensorSkipped { error: String },

    Tick {
        temp: f64,
        duty: u8,
        devices: usize,
        channels: usize,
    },

    Started { interval_secs: f64 },
    Stopped { reason: String },
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

// Forward every record to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::CurveLoaded { table } => {
                info!("Loaded fan curve with {} temp/duty pairs", table.len());

                for (temp, duty) in table {
                    info!("  {temp:>6.1}°C -> {duty:>5.1}%");
                }
            }
            Diagnostic::DevicesDiscovered { count } => {
                debug!("Initialised {count} fan device(s)");
            }
            Diagnostic::DiscoveryFailed { error } => {
                error!("Fan device discovery failed: {error}");
            }
            Diagnostic::DeviceStatus {
                device,
                key,
                value,
                unit,
            } => {
                info!("{device} - {key}: {value} {unit}");
            }
            Diagnostic::DeviceFailed { device, error } => {
                error!("Error initialising {device}: {error}");
            }
            Diagnostic::ActuationFailed {
                device,
                channel,
                error,
            } => match channel {
                Some(channel) => {
                    error!("Failed to set {device} channel \"{channel}\": {error}")
                }
                None => error!("Failed to set {device}: {error}"),
            },
            Diagnostic::DeviceReleased { device } => {
                debug!("Returned {device} to automatic control");
            }
            Diagnostic::SensorSkipped { error } => {
                warn!("Skipping update, no usable temperature: {error}");
            }
            Diagnostic::Tick {
                temp,
                duty,
                devices,
                channels,
            } => {
                info!(
                    "Temp: {temp:.1}°C, Fan duty: {duty}% \
                    ({channels} channel(s) on {devices} device(s))"
                );
            }
            Diagnostic::Started { interval_secs } => {
                info!("Fan controller: Running, update interval {interval_secs}s");
            }
            Diagnostic::Stopped { reason } => {
                info!("Fan controller: Quiting, {reason}");
            }
        }
    }
}

// Keep every record in memory, used to inspect what a component reported
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    // Return a copy of all the records received so far
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    // Return the number of recorded tick reports
    pub fn ticks(&self) -> usize {
        self.records()
            .iter()
            .filter(|r| matches!(r, Diagnostic::Tick { .. }))
            .count()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, diagnostic: Diagnostic) {
        if let Ok(mut records) = self.records.lock() {
            records.push(diagnostic);
        }
    }
}
