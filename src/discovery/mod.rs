//! Resource discovery.
//!
//! Both probes fail soft: a missing tool or a broken probe yields an empty
//! list, which callers read as "nothing to do here".

pub mod devices;
pub mod serial;

pub use devices::{discover_devices, parse_device_list, DeviceRecord, DeviceState};
pub use serial::{discover_endpoints, SERIAL_PREFIXES, SERIAL_SCAN_LIMIT};
