//! Serial endpoints used to program the firmware nodes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// A serial device path such as `/dev/ttyACM0`.
///
/// Endpoints order lexicographically by path, which is the order role
/// mapping relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SerialEndpoint(PathBuf);

impl SerialEndpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SerialEndpoint(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for SerialEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&str> for SerialEndpoint {
    fn from(path: &str) -> Self {
        SerialEndpoint::new(path)
    }
}
