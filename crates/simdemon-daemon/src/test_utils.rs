//! Test utilities for catalog types
//!
//! Builders for [`DeviceRuntime`] and [`DetectionResult`] fixtures.

use std::path::PathBuf;

use simdemon_core::{Capabilities, DetectionResult, DeviceRuntime};

/// Builder for a test [`DeviceRuntime`]
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    device: DeviceRuntime,
}

/// Start building an iPhone simulator with the given udid and OS version.
///
/// Paths point at `/tmp/simdemon-test/<udid>` and do not exist unless the
/// test creates them.
pub fn device(udid: &str, os_version: &str) -> DeviceBuilder {
    let root = PathBuf::from("/tmp/simdemon-test").join(udid);
    DeviceBuilder {
        device: DeviceRuntime {
            udid: udid.to_string(),
            device_type: "com.apple.CoreSimulator.SimDeviceType.iPhone-15".to_string(),
            family: "iPhone".to_string(),
            name: "iPhone 15".to_string(),
            os_version: os_version.to_string(),
            capabilities: Capabilities {
                retina: true,
                tall: true,
                sixty_four_bit: true,
                resizable: false,
                supports_watch: true,
            },
            toolchain_version: "15.2".to_string(),
            toolchain_path: PathBuf::from("/Applications/Xcode.app/Contents/Developer"),
            simulator: PathBuf::from(
                "/Applications/Xcode.app/Contents/Developer/Applications/Simulator.app/Contents/MacOS/Simulator",
            ),
            simctl: PathBuf::from("/Applications/Xcode.app/Contents/Developer/usr/bin/simctl"),
            system_log: Some(root.join("system.log")),
            log_paths: vec![root.join("data")],
        },
    }
}

/// Start building a watch simulator
pub fn watch(udid: &str, os_version: &str) -> DeviceBuilder {
    device(udid, os_version)
        .name("Apple Watch Series 9 (45mm)")
        .family("Apple Watch")
        .device_type("com.apple.CoreSimulator.SimDeviceType.Apple-Watch-Series-9-45mm")
}

impl DeviceBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.device.name = name.to_string();
        self
    }

    pub fn family(mut self, family: &str) -> Self {
        self.device.family = family.to_string();
        self.device.capabilities.supports_watch = family == "iPhone";
        self
    }

    pub fn device_type(mut self, device_type: &str) -> Self {
        self.device.device_type = device_type.to_string();
        self
    }

    pub fn simctl(mut self, path: impl Into<PathBuf>) -> Self {
        self.device.simctl = path.into();
        self
    }

    pub fn simulator(mut self, path: impl Into<PathBuf>) -> Self {
        self.device.simulator = path.into();
        self
    }

    pub fn system_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.device.system_log = Some(path.into());
        self
    }

    pub fn without_system_log(mut self) -> Self {
        self.device.system_log = None;
        self
    }

    pub fn build(self) -> DeviceRuntime {
        self.device
    }
}

/// Build a detection result from primary and watch devices.
///
/// Devices are grouped by OS version in the order given; `pairs` are
/// `(watch udid, phone udid)`.
pub fn detection(
    primaries: Vec<DeviceRuntime>,
    watches: Vec<DeviceRuntime>,
    pairs: &[(&str, &str)],
) -> DetectionResult {
    let mut result = DetectionResult {
        crash_dir: PathBuf::from("/tmp/simdemon-test/DiagnosticReports"),
        ..Default::default()
    };
    for d in primaries {
        result.simulators.entry(d.os_version.clone()).or_default().push(d);
    }
    for w in watches {
        result
            .watch_simulators
            .entry(w.os_version.clone())
            .or_default()
            .push(w);
    }
    for (watch, phone) in pairs {
        result
            .device_pairs
            .insert(watch.to_string(), phone.to_string());
    }
    result
}
