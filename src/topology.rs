//! Physical core counting.
//!
//! Logical processors share physical cores; the kernel reports the mapping
//! as (physical id, core id) pairs and the number of distinct pairs is the
//! physical core count.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::procfs;

/// Count distinct (physical id, core id) pairs in /proc/cpuinfo text.
///
/// A pair is recorded once both fields of a processor block have been seen,
/// in either order. A field repeating before its partner arrives means the
/// previous block was malformed; the stale half-pair is discarded and the
/// scan continues rather than giving up. Returns -1 when the text yields no
/// topology at all (empty buffer, garbage, or non-x86 formats).
pub fn count_physical_cores_in(cpuinfo: &str) -> i32 {
    let mut physical_id: Option<u32> = None;
    let mut core_id: Option<u32> = None;
    let mut unique = HashSet::new();

    for line in cpuinfo.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim() {
            "physical id" => physical_id = value.trim().parse().ok(),
            "core id" => core_id = value.trim().parse().ok(),
            _ => continue,
        }
        if let (Some(physical), Some(core)) = (physical_id, core_id) {
            unique.insert((physical, core));
            physical_id = None;
            core_id = None;
        }
    }

    if unique.is_empty() {
        -1
    } else {
        unique.len() as i32
    }
}

/// Write-once holder for the per-process physical core count.
///
/// The computation may run redundantly under a benign first-call race, but
/// every caller converges on a single stable value. Tests construct their
/// own instance instead of sharing the process-wide one.
#[derive(Debug, Default)]
pub struct CoreCounter {
    cached: OnceLock<i32>,
}

impl CoreCounter {
    pub const fn new() -> Self {
        Self {
            cached: OnceLock::new(),
        }
    }

    /// First call runs `compute`; later calls return the cached value even
    /// if the underlying source has changed since.
    pub fn count_with(&self, compute: impl FnOnce() -> i32) -> i32 {
        *self.cached.get_or_init(compute)
    }

    pub fn count(&self) -> i32 {
        self.count_with(native_core_count)
    }
}

fn native_core_count() -> i32 {
    if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        count_physical_cores_in(&procfs::read_cpuinfo())
    } else {
        // Platforms with a direct API (e.g. hw.physicalcpu on Apple) go
        // through sysinfo instead of text parsing.
        sysinfo::System::physical_core_count().map_or(-1, |count| count as i32)
    }
}

static HOST_CORES: CoreCounter = CoreCounter::new();

/// Physical core count of this host; -1 means unknown.
///
/// Memoized for the life of the process. Host topology cannot change at
/// runtime, so there is no invalidation.
pub fn get_host_num_physical_cores() -> i32 {
    HOST_CORES.count()
}
