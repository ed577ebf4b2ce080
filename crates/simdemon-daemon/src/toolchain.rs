//! Xcode toolchain discovery
//!
//! Finds installed Xcode toolchains (the `xcode-select` developer directory plus
//! any `/Applications/Xcode*.app`), reads their version and simulator SDKs, and
//! resolves the executables the catalog and supervisor need.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;

use simdemon_core::prelude::*;
use simdemon_core::version;

/// Executables provided by one toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainExecutables {
    pub xcodebuild: PathBuf,
    pub simctl: PathBuf,
    pub simulator: PathBuf,
    pub watch_simulator: Option<PathBuf>,
}

/// One installed Xcode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolchain {
    pub version: String,
    pub build: Option<String>,
    /// The `Contents/Developer` directory
    pub path: PathBuf,
    /// iOS simulator SDK versions, e.g. `["17.2"]`
    pub sdks: Vec<String>,
    /// watchOS simulator SDK versions
    pub watch_sdks: Vec<String>,
    pub executables: ToolchainExecutables,
}

impl Toolchain {
    /// Whether this toolchain can drive a runtime of the given OS version
    pub fn supports(&self, os_version: &str, watch: bool) -> bool {
        let sdks = if watch { &self.watch_sdks } else { &self.sdks };
        let wanted = version::format(os_version, 2, 2);
        sdks.iter().any(|sdk| version::gte(sdk, &wanted))
    }
}

/// Toolchain discovery collaborator.
///
/// Returns `version → Toolchain`; an empty map means nothing is installed.
#[trait_variant::make(ToolchainDiscovery: Send)]
pub trait LocalToolchainDiscovery {
    async fn detect_toolchains(&self) -> Result<BTreeMap<String, Toolchain>>;
}

/// Pick the newest toolchain with an iOS simulator SDK satisfying `constraint`.
///
/// Returns the toolchain and the matching SDK version.
pub fn select_toolchain<'a>(
    toolchains: &'a BTreeMap<String, Toolchain>,
    constraint: Option<&str>,
) -> Option<(&'a Toolchain, &'a str)> {
    let mut versions: Vec<&String> = toolchains.keys().collect();
    versions.sort_by(|a, b| version::compare(b, a));

    versions.into_iter().find_map(|v| {
        let tc = &toolchains[v];
        let mut sdks: Vec<&String> = tc.sdks.iter().collect();
        sdks.sort_by(|a, b| version::compare(b, a));
        sdks.into_iter()
            .find(|sdk| constraint.map_or(true, |c| version::satisfies(sdk, c)))
            .map(|sdk| (tc, sdk.as_str()))
    })
}

/// Discovers toolchains through `xcode-select` and `/Applications`
#[derive(Debug, Clone)]
pub struct XcodeDiscovery {
    search_dirs: Vec<PathBuf>,
}

impl Default for XcodeDiscovery {
    fn default() -> Self {
        Self {
            search_dirs: vec![PathBuf::from("/Applications")],
        }
    }
}

impl XcodeDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the directories scanned for `Xcode*.app` bundles
    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }

    /// Candidate developer directories, deduplicated by canonical path
    async fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(dir) = std::env::var("DEVELOPER_DIR") {
            candidates.push(PathBuf::from(dir));
        }

        if let Some(selected) = xcode_select_path().await {
            candidates.push(selected);
        }

        for search_dir in &self.search_dirs {
            let Ok(entries) = std::fs::read_dir(search_dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if name.starts_with("Xcode") && name.ends_with(".app") {
                    candidates.push(entry.path().join("Contents").join("Developer"));
                }
            }
        }

        let mut seen = Vec::new();
        for dir in candidates {
            let Ok(canonical) = dunce::canonicalize(&dir) else {
                debug!("Skipping missing developer dir {}", dir.display());
                continue;
            };
            if !seen.contains(&canonical) {
                seen.push(canonical);
            }
        }
        seen
    }

    async fn inspect(&self, developer_dir: &Path) -> Result<Toolchain> {
        let executables = resolve_executables(developer_dir).ok_or_else(|| {
            Error::toolchain(format!(
                "{} is missing xcodebuild or simctl",
                developer_dir.display()
            ))
        })?;

        let version_out = run_xcodebuild(&executables.xcodebuild, developer_dir, &["-version"])
            .await?;
        let (version, build) = parse_xcodebuild_version(&version_out).ok_or_else(|| {
            Error::toolchain(format!("Unrecognised xcodebuild -version output: {}", version_out))
        })?;

        let sdks_out = run_xcodebuild(&executables.xcodebuild, developer_dir, &["-showsdks"])
            .await?;
        let (sdks, watch_sdks) = parse_showsdks(&sdks_out);

        Ok(Toolchain {
            version,
            build,
            path: developer_dir.to_path_buf(),
            sdks,
            watch_sdks,
            executables,
        })
    }
}

impl ToolchainDiscovery for XcodeDiscovery {
    async fn detect_toolchains(&self) -> Result<BTreeMap<String, Toolchain>> {
        let mut toolchains = BTreeMap::new();

        for dir in self.candidate_dirs().await {
            match self.inspect(&dir).await {
                Ok(tc) => {
                    info!("Found Xcode {} at {}", tc.version, tc.path.display());
                    toolchains.entry(tc.version.clone()).or_insert(tc);
                }
                Err(e) => warn!("Ignoring toolchain at {}: {}", dir.display(), e),
            }
        }

        Ok(toolchains)
    }
}

/// Developer directory reported by `xcode-select -p`
async fn xcode_select_path() -> Option<PathBuf> {
    let xcode_select = which::which("xcode-select").ok()?;
    let output = Command::new(xcode_select)
        .arg("-p")
        .stderr(Stdio::null())
        .output()
        .await
        .inspect_err(|e| debug!("xcode-select failed: {}", e))
        .ok()?;

    if !output.status.success() {
        return None;
    }
    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!path.is_empty()).then(|| PathBuf::from(path))
}

/// Resolve the executables under a developer directory.
///
/// Returns `None` unless both `xcodebuild` and `simctl` exist.
pub fn resolve_executables(developer_dir: &Path) -> Option<ToolchainExecutables> {
    let xcodebuild = developer_dir.join("usr/bin/xcodebuild");
    let simctl = developer_dir.join("usr/bin/simctl");
    if !xcodebuild.exists() || !simctl.exists() {
        return None;
    }

    let apps = developer_dir.join("Applications");
    let simulator = [
        apps.join("Simulator.app/Contents/MacOS/Simulator"),
        apps.join("iOS Simulator.app/Contents/MacOS/iOS Simulator"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .unwrap_or_else(|| apps.join("Simulator.app/Contents/MacOS/Simulator"));

    let watch_simulator = Some(apps.join("Simulator (Watch).app/Contents/MacOS/Simulator (Watch)"))
        .filter(|p| p.exists());

    Some(ToolchainExecutables {
        xcodebuild,
        simctl,
        simulator,
        watch_simulator,
    })
}

async fn run_xcodebuild(xcodebuild: &Path, developer_dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new(xcodebuild)
        .args(args)
        .env("DEVELOPER_DIR", developer_dir)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::toolchain(format!("Failed to run xcodebuild: {}", e)))?;

    if !output.status.success() {
        return Err(Error::toolchain(format!(
            "xcodebuild {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse `xcodebuild -version` output:
///
/// ```text
/// Xcode 15.2
/// Build version 15C500b
/// ```
pub fn parse_xcodebuild_version(output: &str) -> Option<(String, Option<String>)> {
    let mut version = None;
    let mut build = None;

    for line in output.lines().map(str::trim) {
        if let Some(v) = line.strip_prefix("Xcode ") {
            version = Some(v.trim().to_string());
        } else if let Some(b) = line.strip_prefix("Build version ") {
            build = Some(b.trim().to_string());
        }
    }

    version.map(|v| (v, build))
}

/// Parse `xcodebuild -showsdks` output into (iOS simulator SDKs, watchOS simulator SDKs)
pub fn parse_showsdks(output: &str) -> (Vec<String>, Vec<String>) {
    let mut ios = Vec::new();
    let mut watch = Vec::new();

    for token in output.split_whitespace() {
        if let Some(v) = token.strip_prefix("iphonesimulator") {
            if !v.is_empty() && !ios.iter().any(|s| s == v) {
                ios.push(v.to_string());
            }
        } else if let Some(v) = token.strip_prefix("watchsimulator") {
            if !v.is_empty() && !watch.iter().any(|s| s == v) {
                watch.push(v.to_string());
            }
        }
    }

    (ios, watch)
}
