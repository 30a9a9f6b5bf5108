use std::fs;

use tracing::warn;

use crate::Result;

const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Read /proc/cpuinfo, propagating the I/O error.
pub fn try_read_cpuinfo() -> Result<String> {
    Ok(fs::read_to_string(CPUINFO_PATH)?)
}

/// Full text of /proc/cpuinfo.
///
/// An unreadable or missing file is logged and treated the same as an empty
/// buffer; every consumer of this text falls back to "generic" on empty input.
pub fn read_cpuinfo() -> String {
    match try_read_cpuinfo() {
        Ok(content) => content,
        Err(err) => {
            warn!("can't read {CPUINFO_PATH}: {err}");
            String::new()
        }
    }
}
