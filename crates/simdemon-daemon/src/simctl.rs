//! Device control through `simctl`
//!
//! [`DeviceControl`] is the seam the Session Supervisor drives a simulator
//! through. [`SimctlControl`] implements it with the `simctl` executable of the
//! device's own toolchain, selected through `DEVELOPER_DIR`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::mpsc;

use simdemon_core::prelude::*;
use simdemon_core::{DeviceRuntime, ProcessEvent, ProcessRole};

use crate::process::ManagedProcess;

/// Operations the Session Supervisor needs from a simulator
#[trait_variant::make(DeviceControl: Send)]
pub trait LocalDeviceControl {
    /// Ask the device to boot. Booting an already booted device is not an error.
    async fn boot(&self, device: &DeviceRuntime) -> Result<()>;

    /// Boot state, polled while the session is starting
    async fn is_booted(&self, device: &DeviceRuntime) -> Result<bool>;

    /// Spawn the Simulator window process for the device
    async fn open_window(
        &self,
        device: &DeviceRuntime,
        activate: bool,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ManagedProcess>;

    async fn install(&self, device: &DeviceRuntime, app: &Path) -> Result<()>;

    /// Launch an installed app with its console attached.
    ///
    /// The returned process lives as long as the app does; its exit is the
    /// app-exit notification.
    async fn launch_app(
        &self,
        device: &DeviceRuntime,
        bundle_id: &str,
        role: ProcessRole,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ManagedProcess>;

    async fn terminate_app(&self, device: &DeviceRuntime, bundle_id: &str) -> Result<()>;

    /// Data container of an installed app, if the device knows about it
    async fn app_data_container(
        &self,
        device: &DeviceRuntime,
        bundle_id: &str,
    ) -> Result<Option<PathBuf>>;

    /// Shut the device down. Shutting down a stopped device is not an error.
    async fn shutdown(&self, device: &DeviceRuntime) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Shutdown,
    Booted,
    Booting,
    ShuttingDown,
    Unknown,
}

impl From<&str> for SimulatorState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "shutdown" => SimulatorState::Shutdown,
            "booted" => SimulatorState::Booted,
            "booting" => SimulatorState::Booting,
            "shutting down" => SimulatorState::ShuttingDown,
            _ => SimulatorState::Unknown,
        }
    }
}

/// JSON output from `simctl list devices -j`
#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: HashMap<String, Vec<DeviceEntry>>,
}

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    udid: String,
    state: String,
}

/// State of `udid` in a `simctl list devices -j` listing
pub fn parse_device_state(json: &str, udid: &str) -> Result<Option<SimulatorState>> {
    let list: DeviceList = serde_json::from_str(json)?;
    Ok(list
        .devices
        .values()
        .flatten()
        .find(|d| d.udid == udid)
        .map(|d| SimulatorState::from(d.state.as_str())))
}

/// [`DeviceControl`] backed by `simctl`
#[derive(Debug, Clone, Copy, Default)]
pub struct SimctlControl;

impl SimctlControl {
    pub fn new() -> Self {
        Self
    }

    fn command(device: &DeviceRuntime) -> Command {
        let mut cmd = Command::new(&device.simctl);
        cmd.env("DEVELOPER_DIR", &device.toolchain_path);
        cmd
    }

    /// Run a short-lived simctl subcommand, returning stdout.
    ///
    /// A failing command whose stderr contains `tolerated` counts as success.
    async fn run(device: &DeviceRuntime, args: &[&str], tolerated: Option<&str>) -> Result<String> {
        debug!("simctl {}", args.join(" "));
        let output = Self::command(device)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::simctl(format!("Failed to run simctl {}: {}", args[0], e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if tolerated.is_some_and(|t| stderr.contains(t)) {
                return Ok(String::new());
            }
            return Err(Error::simctl(format!(
                "simctl {} failed: {}",
                args[0],
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl DeviceControl for SimctlControl {
    async fn boot(&self, device: &DeviceRuntime) -> Result<()> {
        info!("Booting {}", device);
        // "Unable to boot device in current state: Booted"
        Self::run(device, &["boot", device.udid.as_str()], Some("current state: Booted")).await?;
        Ok(())
    }

    async fn is_booted(&self, device: &DeviceRuntime) -> Result<bool> {
        let json = Self::run(device, &["list", "devices", "-j"], None).await?;
        let state = parse_device_state(&json, &device.udid)?
            .ok_or_else(|| Error::unknown_device(&device.udid))?;
        trace!("{} is {:?}", device.udid, state);
        Ok(state == SimulatorState::Booted)
    }

    async fn open_window(
        &self,
        device: &DeviceRuntime,
        activate: bool,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ManagedProcess> {
        let process = ManagedProcess::spawn(
            ProcessRole::Device,
            &device.simulator,
            ["-CurrentDeviceUDID", device.udid.as_str()],
            event_tx,
        )?;

        if activate {
            // Simulator.app/Contents/MacOS/Simulator → Simulator.app
            if let Some(bundle) = device.simulator.ancestors().nth(3) {
                let status = Command::new("open")
                    .arg("-a")
                    .arg(bundle)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await;
                if let Err(e) = status {
                    debug!("Could not activate Simulator window: {}", e);
                }
            }
        }

        Ok(process)
    }

    async fn install(&self, device: &DeviceRuntime, app: &Path) -> Result<()> {
        info!("Installing {} on {}", app.display(), device.udid);
        let app = app.to_string_lossy();
        Self::run(device, &["install", device.udid.as_str(), &*app], None).await?;
        Ok(())
    }

    async fn launch_app(
        &self,
        device: &DeviceRuntime,
        bundle_id: &str,
        role: ProcessRole,
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<ManagedProcess> {
        let mut cmd = Self::command(device);
        cmd.args([
            "launch",
            "--console-pty",
            "--terminate-running-process",
            device.udid.as_str(),
            bundle_id,
        ]);
        ManagedProcess::spawn_command(role, cmd, event_tx)
    }

    async fn terminate_app(&self, device: &DeviceRuntime, bundle_id: &str) -> Result<()> {
        // Terminating an app that already quit reports "found nothing to terminate"
        Self::run(
            device,
            &["terminate", device.udid.as_str(), bundle_id],
            Some("found nothing to terminate"),
        )
        .await?;
        Ok(())
    }

    async fn app_data_container(
        &self,
        device: &DeviceRuntime,
        bundle_id: &str,
    ) -> Result<Option<PathBuf>> {
        let out = match Self::run(
            device,
            &["get_app_container", device.udid.as_str(), bundle_id, "data"],
            None,
        )
        .await
        {
            Ok(out) => out,
            Err(e) => {
                debug!("No data container for {}: {}", bundle_id, e);
                return Ok(None);
            }
        };
        let path = out.trim();
        Ok((!path.is_empty()).then(|| PathBuf::from(path)))
    }

    async fn shutdown(&self, device: &DeviceRuntime) -> Result<()> {
        info!("Shutting down {}", device);
        // "Unable to shutdown device in current state: Shutdown"
        Self::run(device, &["shutdown", device.udid.as_str()], Some("current state: Shutdown")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES_JSON: &str = r#"{
        "devices": {
            "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
                {"udid": "ABC-123", "name": "iPhone 15 Pro", "state": "Booted", "isAvailable": true},
                {"udid": "DEF-456", "name": "iPhone 15", "state": "Shutdown", "isAvailable": true}
            ],
            "com.apple.CoreSimulator.SimRuntime.watchOS-10-2": [
                {"udid": "W-1", "name": "Apple Watch", "state": "Shutting Down", "isAvailable": true}
            ]
        }
    }"#;

    #[test]
    fn test_simulator_state_from_str() {
        assert_eq!(SimulatorState::from("Shutdown"), SimulatorState::Shutdown);
        assert_eq!(SimulatorState::from("Booted"), SimulatorState::Booted);
        assert_eq!(SimulatorState::from("Booting"), SimulatorState::Booting);
        assert_eq!(SimulatorState::from("Shutting Down"), SimulatorState::ShuttingDown);
        assert_eq!(SimulatorState::from("weird"), SimulatorState::Unknown);
    }

    #[test]
    fn test_parse_device_state() {
        assert_eq!(
            parse_device_state(DEVICES_JSON, "ABC-123").unwrap(),
            Some(SimulatorState::Booted)
        );
        assert_eq!(
            parse_device_state(DEVICES_JSON, "DEF-456").unwrap(),
            Some(SimulatorState::Shutdown)
        );
        assert_eq!(
            parse_device_state(DEVICES_JSON, "W-1").unwrap(),
            Some(SimulatorState::ShuttingDown)
        );
        assert_eq!(parse_device_state(DEVICES_JSON, "nope").unwrap(), None);
    }

    #[test]
    fn test_parse_device_state_invalid_json() {
        assert!(matches!(
            parse_device_state("not json", "ABC"),
            Err(Error::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_simctl_is_simctl_error() {
        let device = crate::test_utils::device("ABC-123", "17.2")
            .simctl("/nonexistent/simctl")
            .build();
        let err = DeviceControl::boot(&SimctlControl::new(), &device)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Simctl { .. }));
        assert!(err.is_recoverable());
    }
}
