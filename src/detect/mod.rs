mod arm;
mod powerpc;
mod s390x;
mod x86;

pub use arm::{ArmDetector, ArmIsa};
pub use powerpc::PowerPcDetector;
pub use s390x::S390xDetector;
pub use x86::{Feature, FeatureMask, Signature, Vendor, X86Detector};

use std::collections::BTreeMap;

use crate::cpuid::HardwareCpuid;

/// One host-identification strategy.
///
/// Each supported platform gets its own implementation so the decoding logic
/// stays unit-testable with injected inputs; exactly one is selected per
/// process.
pub trait HostDetector: Send + Sync {
    /// Short name of this detection strategy
    fn name(&self) -> &'static str;

    /// Canonical microarchitecture name; "generic" when unknown
    fn cpu_name(&self) -> String;

    /// Feature name -> availability; `None` where the platform exposes none
    fn features(&self) -> Option<BTreeMap<&'static str, bool>>;
}

/// Fallback for platforms with no identification path.
pub struct UnsupportedDetector;

impl HostDetector for UnsupportedDetector {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn cpu_name(&self) -> String {
        "generic".to_string()
    }

    fn features(&self) -> Option<BTreeMap<&'static str, bool>> {
        None
    }
}

/// Select the detection strategy for the running process.
///
/// There is no runtime fallback between strategies; an unsupported
/// target/OS combination answers "generic" rather than guessing.
pub fn host_detector() -> Box<dyn HostDetector> {
    if cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
        Box::new(X86Detector::new(HardwareCpuid))
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        Box::new(ArmDetector::host(ArmIsa::A64))
    } else if cfg!(all(target_os = "linux", target_arch = "arm")) {
        Box::new(ArmDetector::host(ArmIsa::A32))
    } else if cfg!(all(
        target_os = "linux",
        any(
            target_arch = "powerpc",
            target_arch = "powerpc64",
            target_arch = "powerpc64le"
        )
    )) {
        Box::new(PowerPcDetector::host())
    } else if cfg!(all(target_os = "linux", target_arch = "s390x")) {
        Box::new(S390xDetector::host())
    } else {
        Box::new(UnsupportedDetector)
    }
}
