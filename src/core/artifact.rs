//! Android build variants and the APKs they produce.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

/// Gradle build variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Debug,
    Release,
}

impl Variant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Debug => "debug",
            Variant::Release => "release",
        }
    }

    /// Gradle task that assembles this variant.
    pub fn gradle_task(&self) -> &'static str {
        match self {
            Variant::Debug => "assembleDebug",
            Variant::Release => "assembleRelease",
        }
    }

    /// File name Gradle gives the variant's APK.
    pub fn apk_file_name(&self) -> String {
        format!("app-{}.apk", self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Variant::Debug),
            "release" => Ok(Variant::Release),
            _ => Err(format!(
                "invalid build variant '{}'; expected 'debug' or 'release'",
                s
            )),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An APK that exists on disk.
///
/// The only constructor checks existence, so install and launch can never
/// run against a path that was not resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Artifact(PathBuf);

impl Artifact {
    /// Wrap `path` if it is an existing file.
    pub fn existing(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        path.is_file().then_some(Artifact(path))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
