use std::sync::Arc;

use crate::{
    device::{DeviceError, DeviceIdentity, DeviceSource, FanDevice, StatusItem},
    diagnostics::{Diagnostic, DiagnosticSink},
};

// Lifecycle of a device within the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Discovered,
    Initializing,
    Live,
    Failed,
}

// A fixed speed command for one channel, built for every update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DutyCommand {
    pub channel: String,
    pub duty: u8,
}

// Summary of a duty application
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActuationReport {
    // Devices where every channel accepted the duty
    pub devices: usize,
    // Channels that accepted the duty
    pub channels: usize,
    // Channels or connections that failed
    pub failures: usize,
}

// A discovered device and its current state
pub struct ManagedDevice {
    handle: Box<dyn FanDevice>,
    identity: DeviceIdentity,
    state: DeviceState,
}

impl ManagedDevice {
    fn new(handle: Box<dyn FanDevice>) -> Self {
        let identity = handle.identity();

        Self {
            handle,
            identity,
            state: DeviceState::Discovered,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == DeviceState::Live
    }
}

pub struct DevicesManager {
    source: Box<dyn DeviceSource>,
    sink: Arc<dyn DiagnosticSink>,

    // Discover and initialize the devices again before every update,
    // otherwise keep the live devices from the previous update
    rediscover_each_tick: bool,

    // Give the channels back to automatic control on release
    restore_on_release: bool,

    // Devices kept between updates when rediscovery is disabled
    cached: Vec<ManagedDevice>,
}

impl DevicesManager {
    pub fn new(
        source: Box<dyn DeviceSource>,
        sink: Arc<dyn DiagnosticSink>,
        rediscover_each_tick: bool,
    ) -> Self {
        Self {
            source,
            sink,
            rediscover_each_tick,
            restore_on_release: false,
            cached: Vec::new(),
        }
    }

    pub fn with_restore_on_release(mut self, restore: bool) -> Self {
        self.restore_on_release = restore;
        self
    }

    // Find the devices on the system and initialize them.
    // Only the devices that initialized successfully are returned,
    // a device failure is reported and never stops the others.
    pub fn discover_and_initialize(&mut self) -> Vec<ManagedDevice> {
        let handles = match self.source.discover() {
            Ok(handles) => handles,
            Err(err) => {
                self.sink.record(Diagnostic::DiscoveryFailed {
                    error: err.to_string(),
                });

                return Vec::new();
            }
        };

        let mut live = Vec::with_capacity(handles.len());

        for handle in handles {
            let mut device = ManagedDevice::new(handle);
            device.state = DeviceState::Initializing;

            match Self::initialize_device(&mut device) {
                Ok(status) => {
                    for item in status {
                        self.sink.record(Diagnostic::DeviceStatus {
                            device: device.identity.to_string(),
                            key: item.key,
                            value: item.value,
                            unit: item.unit,
                        });
                    }

                    device.state = DeviceState::Live;
                    live.push(device);
                }
                Err(err) => {
                    device.state = DeviceState::Failed;

                    self.sink.record(Diagnostic::DeviceFailed {
                        device: device.identity.to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        self.sink.record(Diagnostic::DevicesDiscovered { count: live.len() });

        live
    }

    // Apply the duty to every channel of every live device.
    // Failures are reported per channel and the remaining
    // channels and devices are still attempted.
    pub fn apply_duty(
        &self,
        devices: &mut [ManagedDevice],
        duty: u8,
    ) -> ActuationReport {
        let duty = duty.min(100);
        let mut report = ActuationReport::default();

        for device in devices.iter_mut().filter(|d| d.is_live()) {
            let commands: Vec<DutyCommand> = device
                .handle
                .channels()
                .into_iter()
                .map(|channel| DutyCommand { channel, duty })
                .collect();

            let failures = self.actuate_device(device, &commands, &mut report);

            if failures == 0 {
                report.devices += 1;
            } else {
                report.failures += failures;
                device.state = DeviceState::Failed;
            }
        }

        report
    }

    // Get the live devices according to the discovery policy
    // and apply the duty to them
    pub fn update(&mut self, duty: u8) -> ActuationReport {
        if self.rediscover_each_tick {
            let mut devices = self.discover_and_initialize();

            return self.apply_duty(&mut devices, duty);
        }

        // Cached devices must still be live to be used again
        self.cached.retain(ManagedDevice::is_live);

        // Nothing left to drive, run a new discovery
        if self.cached.is_empty() {
            self.cached = self.discover_and_initialize();
        }

        let mut devices = std::mem::take(&mut self.cached);
        let report = self.apply_duty(&mut devices, duty);
        self.cached = devices;

        report
    }

    // Give every discoverable device back to automatic control
    // if requested, then drop the cached devices
    pub fn release(&mut self) {
        self.cached.clear();

        if !self.restore_on_release {
            return;
        }

        let handles = match self.source.discover() {
            Ok(handles) => handles,
            Err(err) => {
                self.sink.record(Diagnostic::DiscoveryFailed {
                    error: err.to_string(),
                });

                return;
            }
        };

        for mut handle in handles {
            let identity = handle.identity();

            let result = handle
                .connect()
                .and_then(|mut connection| connection.restore_automatic());

            match result {
                Ok(()) => self.sink.record(Diagnostic::DeviceReleased {
                    device: identity.to_string(),
                }),
                Err(err) => self.sink.record(Diagnostic::ActuationFailed {
                    device: identity.to_string(),
                    channel: None,
                    error: err.to_string(),
                }),
            }
        }
    }

    // Connect and initialize the device,
    // the connection is closed before returning
    fn initialize_device(
        device: &mut ManagedDevice,
    ) -> Result<Vec<StatusItem>, DeviceError> {
        let mut connection = device.handle.connect()?;

        connection
            .initialize()?
            .ok_or_else(|| DeviceError::NoInitFeedback {
                device: device.identity.to_string(),
            })
    }

    // Send the commands to the device over a single connection,
    // return the number of failures
    fn actuate_device(
        &self,
        device: &mut ManagedDevice,
        commands: &[DutyCommand],
        report: &mut ActuationReport,
    ) -> usize {
        let mut connection = match device.handle.connect() {
            Ok(connection) => connection,
            Err(err) => {
                self.sink.record(Diagnostic::ActuationFailed {
                    device: device.identity.to_string(),
                    channel: None,
                    error: err.to_string(),
                });

                return 1;
            }
        };

        let mut failures = 0;

        for command in commands {
            match connection.set_fixed_speed(&command.channel, command.duty) {
                Ok(()) => report.channels += 1,
                Err(err) => {
                    failures += 1;

                    self.sink.record(Diagnostic::ActuationFailed {
                        device: device.identity.to_string(),
                        channel: Some(command.channel.clone()),
                        error: err.to_string(),
                    });
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;
    use crate::{device::DeviceConnection, diagnostics::RecordingSink};

    // Shared record of what the fake hardware went through
    #[derive(Default)]
    struct Bench {
        commands: Mutex<Vec<(String, String, u8)>>,
        opened: AtomicUsize,
        closed: AtomicUsize,
        discoveries: AtomicUsize,
        restored: AtomicUsize,
    }

    impl Bench {
        fn commands(&self) -> Vec<(String, String, u8)> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[derive(Clone, Default)]
    struct Profile {
        name: &'static str,
        channels: Vec<&'static str>,
        refuse_connect: bool,
        // Accept the first connection only, the one used for initialization
        refuse_after_init: bool,
        fail_init: bool,
        no_feedback: bool,
        fail_set: bool,
    }

    fn profile(name: &'static str) -> Profile {
        Profile {
            name,
            channels: vec!["fan1", "pump"],
            ..Default::default()
        }
    }

    struct FakeDevice {
        profile: Profile,
        bench: Arc<Bench>,
        connects: usize,
    }

    struct FakeConnection<'a> {
        device: &'a FakeDevice,
    }

    impl Drop for FakeConnection<'_> {
        fn drop(&mut self) {
            self.device.bench.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl FanDevice for FakeDevice {
        fn identity(&self) -> DeviceIdentity {
            DeviceIdentity::new(self.profile.name, "usb", "1:2")
        }

        fn channels(&self) -> Vec<String> {
            self.profile.channels.iter().map(|c| c.to_string()).collect()
        }

        fn connect(
            &mut self,
        ) -> Result<Box<dyn DeviceConnection + '_>, DeviceError> {
            if self.profile.refuse_connect
                || (self.profile.refuse_after_init && self.connects > 0)
            {
                return Err(DeviceError::Access {
                    device: self.profile.name.to_string(),
                    reason: "permission denied".to_string(),
                });
            }

            self.connects += 1;
            self.bench.opened.fetch_add(1, Ordering::SeqCst);

            Ok(Box::new(FakeConnection { device: self }))
        }
    }

    impl DeviceConnection for FakeConnection<'_> {
        fn initialize(&mut self) -> Result<Option<Vec<StatusItem>>, DeviceError> {
            let profile = &self.device.profile;

            if profile.fail_init {
                return Err(DeviceError::Init {
                    device: profile.name.to_string(),
                    reason: "firmware did not answer".to_string(),
                });
            }
            if profile.no_feedback {
                return Ok(None);
            }

            Ok(Some(vec![StatusItem::new("Firmware version", "1.2.0", "")]))
        }

        fn set_fixed_speed(
            &mut self,
            channel: &str,
            duty: u8,
        ) -> Result<(), DeviceError> {
            let profile = &self.device.profile;

            if profile.fail_set {
                return Err(DeviceError::Actuation {
                    device: profile.name.to_string(),
                    channel: channel.to_string(),
                    reason: "write timed out".to_string(),
                });
            }

            self.device.bench.commands.lock().unwrap().push((
                profile.name.to_string(),
                channel.to_string(),
                duty,
            ));

            Ok(())
        }

        fn restore_automatic(&mut self) -> Result<(), DeviceError> {
            self.device.bench.restored.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeSource {
        profiles: Arc<Mutex<Vec<Profile>>>,
        bench: Arc<Bench>,
    }

    impl DeviceSource for FakeSource {
        fn discover(&mut self) -> Result<Vec<Box<dyn FanDevice>>, DeviceError> {
            self.bench.discoveries.fetch_add(1, Ordering::SeqCst);

            Ok(self
                .profiles
                .lock()
                .unwrap()
                .iter()
                .map(|profile| {
                    Box::new(FakeDevice {
                        profile: profile.clone(),
                        bench: self.bench.clone(),
                        connects: 0,
                    }) as Box<dyn FanDevice>
                })
                .collect())
        }
    }

    struct Rig {
        manager: DevicesManager,
        bench: Arc<Bench>,
        profiles: Arc<Mutex<Vec<Profile>>>,
        sink: Arc<RecordingSink>,
    }

    fn rig(profiles: Vec<Profile>, rediscover: bool) -> Rig {
        let bench = Arc::new(Bench::default());
        let profiles = Arc::new(Mutex::new(profiles));
        let sink = Arc::new(RecordingSink::new());

        let source = FakeSource {
            profiles: profiles.clone(),
            bench: bench.clone(),
        };

        Rig {
            manager: DevicesManager::new(Box::new(source), sink.clone(), rediscover),
            bench,
            profiles,
            sink,
        }
    }

    fn names(devices: &[ManagedDevice]) -> Vec<String> {
        devices.iter().map(|d| d.identity().description.clone()).collect()
    }

    #[test]
    fn failed_initialization_is_isolated() {
        let mut rig = rig(
            vec![
                profile("dev1"),
                Profile {
                    fail_init: true,
                    ..profile("dev2")
                },
                profile("dev3"),
            ],
            true,
        );

        let devices = rig.manager.discover_and_initialize();

        assert_eq!(names(&devices), vec!["dev1", "dev3"]);
        assert!(devices.iter().all(ManagedDevice::is_live));

        let failures: Vec<_> = rig
            .sink
            .records()
            .into_iter()
            .filter_map(|r| match r {
                Diagnostic::DeviceFailed { device, error } => Some((device, error)),
                _ => None,
            })
            .collect();

        assert_eq!(failures.len(), 1);
        assert!(failures[0].0.contains("dev2"));
        assert!(failures[0].1.contains("firmware did not answer"));
    }

    #[test]
    fn missing_feedback_and_refused_access_fail() {
        let mut rig = rig(
            vec![
                Profile {
                    no_feedback: true,
                    ..profile("quiet")
                },
                Profile {
                    refuse_connect: true,
                    ..profile("locked")
                },
                profile("good"),
            ],
            true,
        );

        let devices = rig.manager.discover_and_initialize();

        assert_eq!(names(&devices), vec!["good"]);
        assert_eq!(
            rig.sink
                .records()
                .iter()
                .filter(|r| matches!(r, Diagnostic::DeviceFailed { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn initialization_status_is_reported() {
        let mut rig = rig(vec![profile("dev1")], true);

        rig.manager.discover_and_initialize();

        assert!(rig.sink.records().contains(&Diagnostic::DeviceStatus {
            device: "dev1 at usb:1:2".to_string(),
            key: "Firmware version".to_string(),
            value: "1.2.0".to_string(),
            unit: String::new(),
        }));
    }

    #[test]
    fn sessions_are_always_closed() {
        let mut rig = rig(
            vec![
                profile("dev1"),
                Profile {
                    fail_init: true,
                    ..profile("dev2")
                },
                Profile {
                    fail_set: true,
                    ..profile("dev3")
                },
            ],
            true,
        );

        rig.manager.update(40);

        let opened = rig.bench.opened.load(Ordering::SeqCst);
        assert_eq!(opened, 5);
        assert_eq!(rig.bench.closed.load(Ordering::SeqCst), opened);
    }

    #[test]
    fn actuation_failure_is_isolated() {
        let mut rig = rig(
            vec![
                Profile {
                    fail_set: true,
                    ..profile("dev1")
                },
                profile("dev2"),
            ],
            true,
        );

        let mut devices = rig.manager.discover_and_initialize();
        let report = rig.manager.apply_duty(&mut devices, 62);

        assert_eq!(
            rig.bench.commands(),
            vec![
                ("dev2".to_string(), "fan1".to_string(), 62),
                ("dev2".to_string(), "pump".to_string(), 62),
            ]
        );
        assert_eq!(
            report,
            ActuationReport {
                devices: 1,
                channels: 2,
                failures: 2
            }
        );
        assert_eq!(devices[0].state(), DeviceState::Failed);
        assert_eq!(devices[1].state(), DeviceState::Live);
    }

    #[test]
    fn lost_connection_is_isolated() {
        let mut rig = rig(
            vec![
                Profile {
                    refuse_after_init: true,
                    ..profile("unplugged")
                },
                profile("dev2"),
            ],
            true,
        );

        let mut devices = rig.manager.discover_and_initialize();
        assert_eq!(names(&devices), vec!["unplugged", "dev2"]);

        let report = rig.manager.apply_duty(&mut devices, 45);

        assert_eq!(
            rig.bench.commands(),
            vec![
                ("dev2".to_string(), "fan1".to_string(), 45),
                ("dev2".to_string(), "pump".to_string(), 45),
            ]
        );
        assert_eq!(
            report,
            ActuationReport {
                devices: 1,
                channels: 2,
                failures: 1
            }
        );
        assert_eq!(devices[0].state(), DeviceState::Failed);
        assert!(rig.sink.records().iter().any(|r| matches!(
            r,
            Diagnostic::ActuationFailed { device, channel: None, .. }
                if device.contains("unplugged")
        )));
    }

    #[test]
    fn failed_devices_are_skipped() {
        let mut rig = rig(vec![profile("dev1"), profile("dev2")], true);

        let mut devices = rig.manager.discover_and_initialize();
        devices[0].state = DeviceState::Failed;

        rig.manager.apply_duty(&mut devices, 30);

        assert!(rig.bench.commands().iter().all(|(name, _, _)| name == "dev2"));
    }

    #[test]
    fn duty_is_capped() {
        let mut rig = rig(vec![profile("dev1")], true);

        let mut devices = rig.manager.discover_and_initialize();
        rig.manager.apply_duty(&mut devices, 180);

        assert!(rig.bench.commands().iter().all(|(_, _, duty)| *duty == 100));
    }

    #[test]
    fn rediscovers_every_update() {
        let mut rig = rig(vec![profile("dev1")], true);

        rig.manager.update(20);
        rig.profiles.lock().unwrap().push(profile("hotplug"));
        rig.manager.update(25);

        assert_eq!(rig.bench.discoveries.load(Ordering::SeqCst), 2);
        assert!(
            rig.bench
                .commands()
                .contains(&("hotplug".to_string(), "fan1".to_string(), 25))
        );
    }

    #[test]
    fn cached_policy_discovers_once() {
        let mut rig = rig(vec![profile("dev1"), profile("dev2")], false);

        rig.manager.update(20);
        rig.manager.update(25);
        rig.manager.update(30);

        assert_eq!(rig.bench.discoveries.load(Ordering::SeqCst), 1);
        assert_eq!(rig.bench.commands().len(), 12);
    }

    #[test]
    fn cached_policy_drops_failed_devices() {
        let mut rig = rig(
            vec![
                Profile {
                    fail_set: true,
                    ..profile("flaky")
                },
                profile("dev2"),
            ],
            false,
        );

        let first = rig.manager.update(20);
        let second = rig.manager.update(25);

        assert_eq!(first.failures, 2);
        assert_eq!(second.failures, 0);
        assert_eq!(second.devices, 1);
        assert_eq!(rig.bench.discoveries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn discovery_failure_yields_no_devices() {
        struct BrokenSource;

        impl DeviceSource for BrokenSource {
            fn discover(
                &mut self,
            ) -> Result<Vec<Box<dyn FanDevice>>, DeviceError> {
                Err(DeviceError::Discovery("bus unavailable".to_string()))
            }
        }

        let sink = Arc::new(RecordingSink::new());
        let mut manager = DevicesManager::new(Box::new(BrokenSource), sink.clone(), true);

        let report = manager.update(50);

        assert_eq!(report, ActuationReport::default());
        assert!(
            sink.records()
                .iter()
                .any(|r| matches!(r, Diagnostic::DiscoveryFailed { .. }))
        );
    }

    #[test]
    fn release_restores_automatic_control() {
        let mut rig = rig(vec![profile("dev1"), profile("dev2")], false);
        rig.manager.restore_on_release = true;

        rig.manager.update(40);
        rig.manager.release();

        assert_eq!(rig.bench.restored.load(Ordering::SeqCst), 2);
        assert_eq!(rig.bench.discoveries.load(Ordering::SeqCst), 2);
        assert_eq!(
            rig.sink
                .records()
                .iter()
                .filter(|r| matches!(r, Diagnostic::DeviceReleased { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn release_without_restore_leaves_devices() {
        let mut rig = rig(vec![profile("dev1")], true);

        rig.manager.release();

        assert_eq!(rig.bench.restored.load(Ordering::SeqCst), 0);
        assert_eq!(rig.bench.discoveries.load(Ordering::SeqCst), 0);
    }
}
