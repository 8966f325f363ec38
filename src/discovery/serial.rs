//! Serial endpoint probing.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::core::SerialEndpoint;
use crate::util::system::System;

/// Device node prefixes of USB serial adapters.
pub const SERIAL_PREFIXES: [&str; 2] = ["/dev/ttyACM", "/dev/ttyUSB"];

/// Indices probed per prefix.
pub const SERIAL_SCAN_LIMIT: u32 = 16;

/// Every existing serial endpoint, deduplicated and sorted.
pub fn discover_endpoints(system: &dyn System) -> Vec<SerialEndpoint> {
    let found: BTreeSet<SerialEndpoint> = SERIAL_PREFIXES
        .iter()
        .flat_map(|prefix| (0..SERIAL_SCAN_LIMIT).map(move |i| PathBuf::from(format!("{prefix}{i}"))))
        .filter(|path| system.exists(path))
        .map(SerialEndpoint::new)
        .collect();

    tracing::debug!("found {} serial endpoint(s)", found.len());
    found.into_iter().collect()
}
