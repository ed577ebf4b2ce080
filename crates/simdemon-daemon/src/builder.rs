//! Build collaborator
//!
//! Produces an installable simulator `.app` from an Xcode project scheme.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use simdemon_core::prelude::*;
use simdemon_core::version;

use crate::toolchain::{select_toolchain, Toolchain, ToolchainDiscovery};

/// Builds an app and returns the path of the resulting bundle
#[trait_variant::make(AppBuilder: Send)]
pub trait LocalAppBuilder {
    /// `defines` become `GCC_PREPROCESSOR_DEFINITIONS`; pass `&[]` for none.
    async fn build(&self, app: &str, os_version: Option<&str>, defines: &[String])
        -> Result<PathBuf>;
}

/// `xcodebuild`-backed [`AppBuilder`]
#[derive(Debug, Clone)]
pub struct XcodeBuilder<T> {
    discovery: T,
    project_dir: PathBuf,
    destination_name: Option<String>,
}

impl<T: ToolchainDiscovery> XcodeBuilder<T> {
    /// Build schemes of the Xcode project in `project_dir`
    pub fn new(discovery: T, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            discovery,
            project_dir: project_dir.into(),
            destination_name: None,
        }
    }

    /// Simulator name used in the `-destination` specifier
    pub fn with_destination_name(mut self, name: impl Into<String>) -> Self {
        self.destination_name = Some(name.into());
        self
    }

    /// `<project>/build/Debug-iphonesimulator/<app>.app`
    pub fn output_path(&self, app: &str) -> PathBuf {
        self.project_dir
            .join("build")
            .join("Debug-iphonesimulator")
            .join(format!("{}.app", app))
    }
}

/// `xcodebuild` arguments for a Debug simulator build
pub fn build_args(
    scheme: &str,
    sdk: &str,
    destination_name: Option<&str>,
    defines: &[String],
) -> Vec<String> {
    let mut destination = format!("platform=iOS Simulator,OS={}", version::format(sdk, 2, 2));
    if let Some(name) = destination_name {
        destination.push_str(&format!(",name={}", name));
    }

    vec![
        "clean".to_string(),
        "build".to_string(),
        "-configuration".to_string(),
        "Debug".to_string(),
        "-scheme".to_string(),
        scheme.to_string(),
        "-destination".to_string(),
        destination,
        format!("GCC_PREPROCESSOR_DEFINITIONS={}", defines.join(" ")),
        "CONFIGURATION_BUILD_DIR=build/$(CONFIGURATION)$(EFFECTIVE_PLATFORM_NAME)".to_string(),
    ]
}

/// Pick a toolchain and SDK for a build, as owned values
fn pick(
    toolchains: &BTreeMap<String, Toolchain>,
    os_version: Option<&str>,
) -> Result<(Toolchain, String)> {
    if toolchains.is_empty() {
        return Err(Error::ToolchainNotFound);
    }
    select_toolchain(toolchains, os_version)
        .map(|(tc, sdk)| (tc.clone(), sdk.to_string()))
        .ok_or_else(|| Error::no_matching_runtime(os_version.unwrap_or("*")))
}

impl<T: ToolchainDiscovery + Sync> AppBuilder for XcodeBuilder<T> {
    async fn build(&self, app: &str, os_version: Option<&str>, defines: &[String]) -> Result<PathBuf> {
        let toolchains = self.discovery.detect_toolchains().await?;
        let (toolchain, sdk) = pick(&toolchains, os_version)?;

        let args = build_args(app, &sdk, self.destination_name.as_deref(), defines);
        info!(
            "Building {} with Xcode {} (iOS {}) in {}",
            app,
            toolchain.version,
            sdk,
            self.project_dir.display()
        );
        debug!("xcodebuild {}", args.join(" "));

        let output = Command::new(&toolchain.executables.xcodebuild)
            .args(&args)
            .current_dir(&self.project_dir)
            .env("DEVELOPER_DIR", &toolchain.path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::spawn("xcodebuild", e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || !stdout.contains("BUILD SUCCEEDED") {
            return Err(Error::build(format!(
                "xcodebuild exited with {}: {}",
                output.status,
                tail(&stdout, &String::from_utf8_lossy(&output.stderr))
            )));
        }

        let app_path = self.output_path(app);
        ensure_bundle(&app_path)?;
        Ok(app_path)
    }
}

fn ensure_bundle(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::InvalidBundle {
            path: path.to_path_buf(),
        })
    }
}

/// Last few meaningful lines of build output for an error message
fn tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines[lines.len().saturating_sub(5)..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::ToolchainExecutables;

    fn toolchain(version: &str, sdks: &[&str]) -> Toolchain {
        Toolchain {
            version: version.to_string(),
            build: None,
            path: PathBuf::from("/Xcode.app/Contents/Developer"),
            sdks: sdks.iter().map(|s| s.to_string()).collect(),
            watch_sdks: Vec::new(),
            executables: ToolchainExecutables {
                xcodebuild: PathBuf::from("/nonexistent/xcodebuild"),
                simctl: PathBuf::from("/nonexistent/simctl"),
                simulator: PathBuf::from("/nonexistent/Simulator"),
                watch_simulator: None,
            },
        }
    }

    struct Fixed(BTreeMap<String, Toolchain>);

    impl ToolchainDiscovery for Fixed {
        async fn detect_toolchains(&self) -> Result<BTreeMap<String, Toolchain>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_build_args() {
        let args = build_args(
            "TestApp",
            "9",
            Some("iPhone 6"),
            &["TEST_BASIC_LOGGING".to_string(), "FOO=1".to_string()],
        );
        assert_eq!(&args[..2], &["clean", "build"]);
        assert!(args.contains(&"platform=iOS Simulator,OS=9.0,name=iPhone 6".to_string()));
        assert!(args.contains(&"GCC_PREPROCESSOR_DEFINITIONS=TEST_BASIC_LOGGING FOO=1".to_string()));
        assert!(args.iter().any(|a| a.starts_with("CONFIGURATION_BUILD_DIR=build/")));
    }

    #[test]
    fn test_build_args_without_defines() {
        let args = build_args("TestApp", "17.2", None, &[]);
        assert!(args.contains(&"platform=iOS Simulator,OS=17.2".to_string()));
        assert!(args.contains(&"GCC_PREPROCESSOR_DEFINITIONS=".to_string()));
    }

    #[test]
    fn test_pick_errors() {
        assert!(matches!(pick(&BTreeMap::new(), None), Err(Error::ToolchainNotFound)));

        let mut map = BTreeMap::new();
        map.insert("15.2".to_string(), toolchain("15.2", &["17.2"]));
        assert!(matches!(
            pick(&map, Some("9.x")),
            Err(Error::NoMatchingRuntime { .. })
        ));
        let (tc, sdk) = pick(&map, None).unwrap();
        assert_eq!((tc.version.as_str(), sdk.as_str()), ("15.2", "17.2"));
    }

    #[test]
    fn test_output_path() {
        let builder = XcodeBuilder::new(Fixed(BTreeMap::new()), "/projects/TestApp");
        assert_eq!(
            builder.output_path("TestApp"),
            PathBuf::from("/projects/TestApp/build/Debug-iphonesimulator/TestApp.app")
        );
    }

    #[tokio::test]
    async fn test_build_missing_xcodebuild_is_spawn_error() {
        let mut map = BTreeMap::new();
        map.insert("15.2".to_string(), toolchain("15.2", &["17.2"]));
        let dir = tempfile::tempdir().unwrap();
        let builder = XcodeBuilder::new(Fixed(map), dir.path());

        let err = AppBuilder::build(&builder, "TestApp", None, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProcessSpawn { .. }));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let out = "a\nb\n\nc\nd\ne\nf";
        assert_eq!(tail(out, "g"), "c | d | e | f | g");
    }
}
