//! S390x host identification from /proc/cpuinfo.
//!
//! STIDP is a privileged operation; the kernel's `processor N:` line carries
//! the machine id instead.

use std::collections::BTreeMap;

use crate::procfs;

use super::HostDetector;

/// Canonical CPU name from cpuinfo text.
///
/// Vector support is checked independently of the machine type: the vector
/// register set may only be used when the kernel (and hypervisor) enabled
/// it, which the `vx` feature token records.
pub fn cpu_name_from(cpuinfo: &str) -> &'static str {
    // Only the first features line is consulted.
    let have_vector_support = cpuinfo
        .lines()
        .find(|line| line.starts_with("features"))
        .and_then(|line| line.split_once(':'))
        .is_some_and(|(_, value)| value.split_whitespace().any(|token| token == "vx"));

    // Only the first processor line is inspected; scanning stops there.
    for line in cpuinfo.lines() {
        if !line.starts_with("processor ") {
            continue;
        }
        const MACHINE_FIELD: &str = "machine = ";
        if let Some(pos) = line.find(MACHINE_FIELD) {
            let rest = &line[pos + MACHINE_FIELD.len()..];
            if let Ok(id) = rest.parse::<u32>() {
                if id >= 3906 && have_vector_support {
                    return "z14";
                }
                if id >= 2964 && have_vector_support {
                    return "z13";
                }
                if id >= 2827 {
                    return "zEC12";
                }
                if id >= 2817 {
                    return "z196";
                }
            }
        }
        break;
    }

    "generic"
}

/// /proc/cpuinfo-backed detector for S390x Linux hosts.
pub struct S390xDetector {
    fixed: Option<String>,
}

impl S390xDetector {
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

impl HostDetector for S390xDetector {
    fn name(&self) -> &'static str {
        "s390x-cpuinfo"
    }

    fn cpu_name(&self) -> String {
        cpu_name_from(&self.cpuinfo()).to_string()
    }

    fn features(&self) -> Option<BTreeMap<&'static str, bool>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpuinfo(machine: u32, features: &str) -> String {
        format!(
            "vendor_id       : IBM/S390\n\
             # processors    : 4\n\
             bogomips per cpu: 20325.00\n\
             features\t: {features}\n\
             processor 0: version = FF,  identification = 123456,  machine = {machine}\n\
             processor 1: version = FF,  identification = 123456,  machine = {machine}\n"
        )
    }

    #[test]
    fn machine_thresholds() {
        assert_eq!(cpu_name_from(&cpuinfo(3906, "esan3 zarch vx")), "z14");
        assert_eq!(cpu_name_from(&cpuinfo(2964, "esan3 zarch vx")), "z13");
        assert_eq!(cpu_name_from(&cpuinfo(2827, "esan3 zarch")), "zEC12");
        assert_eq!(cpu_name_from(&cpuinfo(2817, "esan3 zarch")), "z196");
        assert_eq!(cpu_name_from(&cpuinfo(2097, "esan3 zarch")), "generic");
    }

    #[test]
    fn no_vector_support_falls_to_older_machine() {
        // z13 hardware without kernel vector enablement reports zEC12.
        assert_eq!(cpu_name_from(&cpuinfo(2964, "esan3 zarch")), "zEC12");
        assert_eq!(cpu_name_from(&cpuinfo(3906, "esan3 zarch")), "zEC12");
    }

    #[test]
    fn only_first_features_line_counts() {
        let text = "features\t: esan3 zarch\nfeatures\t: vx\n\
                    processor 0: version = FF,  identification = 1,  machine = 2964\n";
        assert_eq!(cpu_name_from(text), "zEC12");
    }

    #[test]
    fn only_first_processor_line_counts() {
        let text = "features\t: vx\n\
                    processor 0: version = FF,  identification = 1,  machine = bogus\n\
                    processor 1: version = FF,  identification = 1,  machine = 2964\n";
        assert_eq!(cpu_name_from(text), "generic");
    }

    #[test]
    fn empty_and_malformed_input_is_generic() {
        assert_eq!(cpu_name_from(""), "generic");
        assert_eq!(cpu_name_from("processor 0: machine = \n"), "generic");
        assert_eq!(cpu_name_from("vendor_id : IBM/S390\n"), "generic");
    }
}
