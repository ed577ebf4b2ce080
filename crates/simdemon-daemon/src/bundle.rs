//! App bundle identity
//!
//! Reads the identifier and executable name of a built `.app` from its
//! `Info.plist`. XML plists are read directly; binary plists are converted
//! with `plutil` first.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

use simdemon_core::prelude::*;

static PLIST_STRING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>\s*([A-Za-z]+)\s*</key>\s*<string>([^<]*)</string>")
        .expect("Invalid PLIST_STRING regex")
});

const BINARY_PLIST_MAGIC: &[u8] = b"bplist00";

/// Identity of an installable app bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBundle {
    pub path: PathBuf,
    /// `CFBundleIdentifier`
    pub bundle_id: String,
    /// `CFBundleExecutable`, or the bundle directory stem
    pub executable: String,
    /// `CFBundleDisplayName` or `CFBundleName`
    pub display_name: Option<String>,
}

impl AppBundle {
    /// Read the bundle at `path`
    pub async fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let invalid = || Error::InvalidBundle {
            path: path.to_path_buf(),
        };

        if !path.is_dir() {
            return Err(invalid());
        }

        let plist_path = path.join("Info.plist");
        let raw = tokio::fs::read(&plist_path).await.map_err(|e| {
            warn!("Cannot read {}: {}", plist_path.display(), e);
            invalid()
        })?;

        let xml = if raw.starts_with(BINARY_PLIST_MAGIC) {
            convert_binary_plist(&plist_path).await?
        } else {
            String::from_utf8_lossy(&raw).into_owned()
        };

        Self::from_plist(path, &xml).ok_or_else(invalid)
    }

    /// Build from the XML text of an `Info.plist`
    pub fn from_plist(path: &Path, xml: &str) -> Option<Self> {
        let value = |key: &str| {
            PLIST_STRING
                .captures_iter(xml)
                .find(|c| &c[1] == key)
                .map(|c| c[2].trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bundle_id = value("CFBundleIdentifier")?;
        let executable = value("CFBundleExecutable").or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
        })?;
        let display_name = value("CFBundleDisplayName").or_else(|| value("CFBundleName"));

        Some(Self {
            path: path.to_path_buf(),
            bundle_id,
            executable,
            display_name,
        })
    }

    /// Location of the watch half of this bundle, if it has one.
    ///
    /// Looks in `Watch/*.app` first, then `PlugIns/*.appex/*.app`.
    pub fn watch_app(&self) -> Option<PathBuf> {
        let watch_dir = self.path.join("Watch");
        if let Some(app) = find_child(&watch_dir, "app") {
            return Some(app);
        }

        let plugins = std::fs::read_dir(self.path.join("PlugIns")).ok()?;
        plugins
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "appex"))
            .find_map(|appex| find_child(&appex, "app"))
    }
}

/// First child directory of `dir` with the given extension, by name
fn find_child(dir: &Path, extension: &str) -> Option<PathBuf> {
    let mut children: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() && p.extension().is_some_and(|e| e == extension))
        .collect();
    children.sort();
    children.into_iter().next()
}

async fn convert_binary_plist(plist: &Path) -> Result<String> {
    let output = Command::new("plutil")
        .args(["-convert", "xml1", "-o", "-"])
        .arg(plist)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::spawn("plutil", e.to_string()))?;

    if !output.status.success() {
        return Err(Error::InvalidBundle {
            path: plist.to_path_buf(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
