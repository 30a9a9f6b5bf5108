//! PowerPC host identification from /proc/cpuinfo.
//!
//! The Processor Version Register is privileged, so the kernel's `cpu :`
//! line is the only identification available from user space.

use std::collections::BTreeMap;

use crate::procfs;

use super::HostDetector;

const POWERPC_CPUS: &[(&str, &str)] = &[
    ("604e", "604e"),
    ("604", "604"),
    ("7400", "7400"),
    ("7410", "7400"),
    ("7447", "7400"),
    ("7455", "7450"),
    ("G4", "g4"),
    ("POWER4", "970"),
    ("PPC970FX", "970"),
    ("PPC970MP", "970"),
    ("G5", "g5"),
    ("POWER5", "g5"),
    ("A2", "a2"),
    ("POWER6", "pwr6"),
    ("POWER7", "pwr7"),
    ("POWER8", "pwr8"),
    ("POWER8E", "pwr8"),
    ("POWER8NVL", "pwr8"),
    ("POWER9", "pwr9"),
];

/// Canonical CPU name from cpuinfo text.
///
/// The first line whose prefix is `cpu`, optional whitespace, and a colon
/// decides; its value token ends at the first space, tab, or comma (the
/// kernel appends things like ", altivec supported"). Anything unmatched is
/// "generic".
pub fn cpu_name_from(cpuinfo: &str) -> &'static str {
    for line in cpuinfo.lines() {
        let Some(rest) = line.strip_prefix("cpu") else {
            continue;
        };
        let rest = rest.trim_start_matches([' ', '\t']);
        let Some(rest) = rest.strip_prefix(':') else {
            continue;
        };
        let rest = rest.trim_start_matches([' ', '\t']);
        let token = rest.split([' ', '\t', ',']).next().unwrap_or("");
        return POWERPC_CPUS
            .iter()
            .find(|(cpu, _)| *cpu == token)
            .map(|&(_, name)| name)
            .unwrap_or("generic");
    }
    "generic"
}

/// /proc/cpuinfo-backed detector for PowerPC Linux hosts.
pub struct PowerPcDetector {
    fixed: Option<String>,
}

impl PowerPcDetector {
    pub fn host() -> Self {
        Self { fixed: None }
    }

    /// Detector over a fixed text buffer, for tests.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            fixed: Some(text.into()),
        }
    }

    fn cpuinfo(&self) -> String {
        match &self.fixed {
            Some(text) => text.clone(),
            None => procfs::read_cpuinfo(),
        }
    }
}

impl HostDetector for PowerPcDetector {
    fn name(&self) -> &'static str {
        "powerpc-cpuinfo"
    }

    fn cpu_name(&self) -> String {
        cpu_name_from(&self.cpuinfo()).to_string()
    }

    fn features(&self) -> Option<BTreeMap<&'static str, bool>> {
        None
    }
}
