//! Runtime Catalog
//!
//! Enumerates every simulator the installed toolchains provide by running
//! `simctl list -j` and joining its device types, runtimes, devices and
//! watch pairs. Detection never fails outright: anomalies are collected as
//! [`Issue`]s next to a best-effort [`DetectionResult`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use simdemon_core::prelude::*;
use simdemon_core::types::issue_ids;
use simdemon_core::{version, Capabilities, DetectionResult, DeviceRuntime, Issue};

use crate::toolchain::{Toolchain, ToolchainDiscovery};

/// Catalog query seam consumed by the Session Supervisor
#[trait_variant::make(RuntimeDetector: Send)]
pub trait LocalRuntimeDetector {
    /// Enumerate installed simulators. Read-only.
    async fn detect(&self) -> DetectionResult;
}

// ─────────────────────────────────────────────────────────────────────────────
// simctl JSON
// ─────────────────────────────────────────────────────────────────────────────

/// JSON output from `simctl list -j`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SimctlList {
    devicetypes: Vec<SimctlDeviceType>,
    runtimes: Vec<SimctlRuntime>,
    devices: BTreeMap<String, Vec<SimctlDevice>>,
    pairs: BTreeMap<String, SimctlPair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimctlDeviceType {
    name: String,
    identifier: String,
    product_family: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimctlRuntime {
    identifier: String,
    version: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimctlDevice {
    udid: String,
    name: String,
    device_type_identifier: Option<String>,
    is_available: Option<bool>,
    availability_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimctlPair {
    watch: SimctlPairMember,
    phone: SimctlPairMember,
}

#[derive(Debug, Deserialize)]
struct SimctlPairMember {
    udid: String,
}

impl SimctlList {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Per-user locations the catalog resolves simulator paths against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPaths {
    pub home: PathBuf,
    pub crash_dir: PathBuf,
}

impl CatalogPaths {
    pub fn for_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let crash_dir = home.join("Library/Logs/DiagnosticReports");
        Self { home, crash_dir }
    }

    pub fn with_crash_dir(mut self, crash_dir: impl Into<PathBuf>) -> Self {
        self.crash_dir = crash_dir.into();
        self
    }

    /// `~/Library/Logs/CoreSimulator/<udid>/system.log`
    pub fn system_log(&self, udid: &str) -> PathBuf {
        self.home
            .join("Library/Logs/CoreSimulator")
            .join(udid)
            .join("system.log")
    }

    /// App data locations inside the device's data directory
    pub fn log_paths(&self, udid: &str) -> Vec<PathBuf> {
        let data = self
            .home
            .join("Library/Developer/CoreSimulator/Devices")
            .join(udid)
            .join("data");
        vec![
            data.join("Containers/Data/Application"),
            data.join("Applications"),
        ]
    }
}

impl Default for CatalogPaths {
    fn default() -> Self {
        Self::for_home(dirs::home_dir().unwrap_or_default())
    }
}

/// `simctl`-backed Runtime Catalog
#[derive(Debug, Clone)]
pub struct RuntimeCatalog<T> {
    discovery: T,
    paths: CatalogPaths,
}

impl<T: ToolchainDiscovery> RuntimeCatalog<T> {
    pub fn new(discovery: T) -> Self {
        Self {
            discovery,
            paths: CatalogPaths::default(),
        }
    }

    pub fn with_paths(mut self, paths: CatalogPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn paths(&self) -> &CatalogPaths {
        &self.paths
    }
}

impl<T: ToolchainDiscovery + Sync> RuntimeDetector for RuntimeCatalog<T> {
    async fn detect(&self) -> DetectionResult {
        let mut result = DetectionResult {
            crash_dir: self.paths.crash_dir.clone(),
            ..Default::default()
        };

        let toolchains = match self.discovery.detect_toolchains().await {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => {
                result.issues.push(Issue::error(
                    issue_ids::NO_TOOLCHAIN,
                    Error::ToolchainNotFound.to_string(),
                ));
                return result;
            }
            Err(e) => {
                result.issues.push(Issue::error(issue_ids::NO_TOOLCHAIN, e.to_string()));
                return result;
            }
        };

        let Some(listing) = newest(&toolchains) else {
            return result;
        };

        let list = match run_simctl_list(&listing.executables.simctl, &listing.path).await {
            Ok(list) => list,
            Err(e) => {
                warn!("simctl list failed: {}", e);
                result.issues.push(Issue::error(issue_ids::SIMCTL_FAILED, e.to_string()));
                return result;
            }
        };

        build_detection(&list, &toolchains, &self.paths)
    }
}

/// Run `simctl list -j` with the given toolchain selected
pub async fn run_simctl_list(simctl: &Path, developer_dir: &Path) -> Result<SimctlList> {
    let output = Command::new(simctl)
        .args(["list", "-j"])
        .env("DEVELOPER_DIR", developer_dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::simctl(format!("Failed to run simctl: {}", e)))?;

    if !output.status.success() {
        return Err(Error::simctl(format!(
            "simctl list exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    SimctlList::parse(&String::from_utf8_lossy(&output.stdout))
}

fn newest(toolchains: &BTreeMap<String, Toolchain>) -> Option<&Toolchain> {
    toolchains
        .values()
        .max_by(|a, b| version::compare(&a.version, &b.version))
}

/// OS family and version of a runtime key.
///
/// Handles both `com.apple.CoreSimulator.SimRuntime.iOS-17-2` and the older
/// `iOS 9.3` keys. Returns `None` for platforms other than iOS and watchOS.
pub fn parse_runtime_key(key: &str) -> Option<(&'static str, String)> {
    let suffix = key
        .strip_prefix("com.apple.CoreSimulator.SimRuntime.")
        .unwrap_or(key);
    let (os, ver) = suffix.split_once(['-', ' '])?;
    let os = match os {
        "iOS" => "iOS",
        "watchOS" => "watchOS",
        _ => return None,
    };
    Some((os, ver.replace('-', ".")))
}

/// Device types that predate 64-bit hardware
const LEGACY_32BIT: &[&str] = &["iPhone-4s", "iPhone-5", "iPad-2", "iPad-Retina", "iPad-mini"];

/// Derive capability flags from a device type identifier
pub fn capabilities_for(device_type: &str, family: &str, os_version: &str) -> Capabilities {
    let model = device_type.rsplit('.').next().unwrap_or(device_type);
    let is_iphone = family == "iPhone";
    let sixty_four_bit = !LEGACY_32BIT.contains(&model);

    Capabilities {
        retina: !matches!(model, "iPad-2" | "iPad-mini"),
        tall: is_iphone && !matches!(model, "iPhone-4" | "iPhone-4s"),
        sixty_four_bit,
        resizable: model.contains("Resizable"),
        supports_watch: is_iphone && sixty_four_bit && version::gte(os_version, "8.2"),
    }
}

fn family_for(device_type: Option<&SimctlDeviceType>, name: &str) -> String {
    if let Some(family) = device_type.and_then(|t| t.product_family.clone()) {
        return family;
    }
    let name = device_type.map(|t| t.name.as_str()).unwrap_or(name);
    if name.contains("iPad") {
        "iPad".to_string()
    } else if name.contains("Watch") {
        "Apple Watch".to_string()
    } else {
        "iPhone".to_string()
    }
}

/// Newest toolchain with an SDK covering `os_version`
fn toolchain_for<'a>(
    toolchains: &'a BTreeMap<String, Toolchain>,
    os_version: &str,
    watch: bool,
) -> Option<&'a Toolchain> {
    let mut candidates: Vec<&Toolchain> = toolchains.values().collect();
    candidates.sort_by(|a, b| version::compare(&b.version, &a.version));
    candidates
        .into_iter()
        .find(|tc| tc.supports(os_version, watch))
}

/// Join a parsed listing with the discovered toolchains
pub fn build_detection(
    list: &SimctlList,
    toolchains: &BTreeMap<String, Toolchain>,
    paths: &CatalogPaths,
) -> DetectionResult {
    let mut result = DetectionResult {
        crash_dir: paths.crash_dir.clone(),
        ..Default::default()
    };

    let Some(listing) = newest(toolchains) else {
        result.issues.push(Issue::error(
            issue_ids::NO_TOOLCHAIN,
            Error::ToolchainNotFound.to_string(),
        ));
        return result;
    };

    let device_types: HashMap<&str, &SimctlDeviceType> = list
        .devicetypes
        .iter()
        .map(|t| (t.identifier.as_str(), t))
        .collect();
    let runtimes: HashMap<&str, &SimctlRuntime> = list
        .runtimes
        .iter()
        .flat_map(|r| [(r.identifier.as_str(), r), (r.name.as_str(), r)])
        .collect();

    let mut seen = HashSet::new();
    let mut fallback_reported = HashSet::new();

    for (runtime_key, devices) in &list.devices {
        let Some((os, key_version)) = parse_runtime_key(runtime_key) else {
            trace!("Skipping runtime {}", runtime_key);
            continue;
        };
        let os_version = runtimes
            .get(runtime_key.as_str())
            .map(|r| r.version.clone())
            .unwrap_or(key_version);
        let is_watch_os = os == "watchOS";

        let toolchain = match toolchain_for(toolchains, &os_version, is_watch_os) {
            Some(tc) => tc,
            None => {
                if fallback_reported.insert(runtime_key.clone()) {
                    result.issues.push(Issue::info(
                        issue_ids::TOOLCHAIN_FALLBACK,
                        format!(
                            "No Xcode SDK covers {} {}, using Xcode {}",
                            os, os_version, listing.version
                        ),
                    ));
                }
                listing
            }
        };

        for device in devices {
            if !seen.insert(device.udid.clone()) {
                debug!("Duplicate simulator {} ignored", device.udid);
                continue;
            }

            if device.is_available == Some(false) {
                result.issues.push(Issue::info(
                    issue_ids::SIMULATOR_UNAVAILABLE,
                    format!(
                        "{} ({} {}) is unavailable{}",
                        device.name,
                        os,
                        os_version,
                        device
                            .availability_error
                            .as_deref()
                            .map(|e| format!(": {}", e))
                            .unwrap_or_default()
                    ),
                ));
                continue;
            }

            let device_type_id = device.device_type_identifier.clone().unwrap_or_default();
            let family = family_for(device_types.get(device_type_id.as_str()).copied(), &device.name);

            let simulator = if is_watch_os {
                toolchain
                    .executables
                    .watch_simulator
                    .clone()
                    .unwrap_or_else(|| toolchain.executables.simulator.clone())
            } else {
                toolchain.executables.simulator.clone()
            };

            let runtime = DeviceRuntime {
                udid: device.udid.clone(),
                capabilities: capabilities_for(&device_type_id, &family, &os_version),
                device_type: device_type_id,
                family,
                name: device.name.clone(),
                os_version: os_version.clone(),
                toolchain_version: toolchain.version.clone(),
                toolchain_path: toolchain.path.clone(),
                simulator,
                simctl: toolchain.executables.simctl.clone(),
                system_log: Some(paths.system_log(&device.udid)).filter(|p| p.exists()),
                log_paths: paths
                    .log_paths(&device.udid)
                    .into_iter()
                    .filter(|p| p.exists())
                    .collect(),
            };

            let missing = runtime.missing_paths();
            if !missing.is_empty() {
                let missing: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
                result.issues.push(Issue::warning(
                    issue_ids::SIMULATOR_EXECUTABLE_MISSING,
                    format!("{} excluded, missing: {}", runtime, missing.join(", ")),
                ));
                continue;
            }
            if runtime.log_paths.is_empty() {
                result.issues.push(Issue::info(
                    issue_ids::LOG_PATHS_MISSING,
                    format!("{} has no app data directories yet", runtime),
                ));
            }

            let bucket = if is_watch_os {
                &mut result.watch_simulators
            } else {
                &mut result.simulators
            };
            bucket.entry(os_version.clone()).or_default().push(runtime);
        }
    }

    for pair in list.pairs.values() {
        let watch = &pair.watch.udid;
        let phone = &pair.phone.udid;
        if result.find(watch).is_some() && result.find(phone).is_some() {
            result.device_pairs.insert(watch.clone(), phone.clone());
        }
    }

    info!(
        "Detected {} simulators, {} pairs, {} issues",
        result.all_devices().count(),
        result.device_pairs.len(),
        result.issues.len()
    );

    result
}
