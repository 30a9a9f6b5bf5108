pub mod cpuid;
pub mod detect;
pub mod error;
pub mod procfs;
pub mod report;
pub mod topology;
pub mod triple;
pub mod utils;

pub use error::{ProbeError, Result};
pub use report::HostReport;

use std::collections::BTreeMap;

/// Canonical microarchitecture name of the host CPU.
///
/// Always succeeds; "generic" is the terminal answer whenever the silicon
/// cannot be identified more precisely.
pub fn get_host_cpu_name() -> String {
    detect::host_detector().cpu_name()
}

/// Feature name -> availability for the host CPU.
///
/// `None` on platforms where no feature probing is implemented.
pub fn get_host_cpu_features() -> Option<BTreeMap<&'static str, bool>> {
    detect::host_detector().features()
}

pub use topology::get_host_num_physical_cores;
pub use triple::get_process_triple;
