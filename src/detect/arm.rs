//! ARM host identification from /proc/cpuinfo.
//!
//! The CPUID register is privileged on ARM, so the kernel-exported
//! implementer/part fields are the only user-space source of truth.

use std::collections::BTreeMap;

use crate::procfs;
use crate::utils::{field_value, first_field_value};

use super::HostDetector;

/// Part numbers match the "Part number" field of the CP15/c0 register,
/// rendered by the kernel as 0x-prefixed hex.
const ARM_PARTS: &[(&str, &str)] = &[
    ("0x926", "arm926ej-s"),
    ("0xb02", "mpcore"),
    ("0xb36", "arm1136j-s"),
    ("0xb56", "arm1156t2-s"),
    ("0xb76", "arm1176jz-s"),
    ("0xc08", "cortex-a8"),
    ("0xc09", "cortex-a9"),
    ("0xc0f", "cortex-a15"),
    ("0xc20", "cortex-m0"),
    ("0xc23", "cortex-m3"),
    ("0xc24", "cortex-m4"),
    ("0xd04", "cortex-a35"),
    ("0xd03", "cortex-a53"),
    ("0xd07", "cortex-a57"),
    ("0xd08", "cortex-a72"),
    ("0xd09", "cortex-a73"),
];

const QUALCOMM_PARTS: &[(&str, &str)] = &[
    ("0x06f", "krait"), // APQ8064
    ("0x201", "kryo"),
    ("0x205", "kryo"),
    ("0x211", "kryo"),
    ("0x800", "cortex-a73"),
    ("0x801", "cortex-a73"),
    ("0xc00", "falkor"),
    ("0xc01", "saphira"),
];

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(part, _)| *part == key)
        .map(|&(_, name)| name)
}

/// Canonical CPU name from cpuinfo text; "generic" for unknown implementers
/// or parts and for empty input.
pub fn cpu_name_from(cpuinfo: &str) -> &'static str {
    let mut implementer = "";
    let mut hardware = "";
    for line in cpuinfo.lines() {
        if let Some(value) = field_value(line, "CPU implementer") {
            implementer = value;
        }
        if let Some(value) = field_value(line, "Hardware") {
            hardware = value;
        }
    }

    let part = first_field_value(cpuinfo, "CPU part");
    match implementer {
        // ARM Ltd.
        "0x41" => {
            // MSM8992/8994/8996 kernels report the part of whichever core
            // they happen to be running on, which is nondeterministic.
            // Always answer cortex-a53 for these SoCs.
            if hardware.ends_with("MSM8994") || hardware.ends_with("MSM8996") {
                return "cortex-a53";
            }
            part.and_then(|p| lookup(ARM_PARTS, p)).unwrap_or("generic")
        }
        // Qualcomm Technologies, Inc.
        "0x51" => part
            .and_then(|p| lookup(QUALCOMM_PARTS, p))
            .unwrap_or("generic"),
        _ => "generic",
    }
}

/// Which kernel feature-token dialect applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmIsa {
    /// 32-bit arm
    A32,
    /// aarch64
    A64,
}

const CAP_AES: u32 = 0x1;
const CAP_PMULL: u32 = 0x2;
const CAP_SHA1: u32 = 0x4;
const CAP_SHA2: u32 = 0x8;

/// Map the first `Features` line's tokens to backend feature names.
pub fn feature_map(cpuinfo: &str, isa: ArmIsa) -> BTreeMap<&'static str, bool> {
    let tokens = first_field_value(cpuinfo, "Features")
        .map(|value| value.split_whitespace().collect::<Vec<_>>())
        .unwrap_or_default();

    let mut features = BTreeMap::new();
    let mut crypto = 0u32;

    for token in tokens {
        let mapped = match isa {
            ArmIsa::A64 => match token {
                "asimd" => "neon",
                "fp" => "fp-armv8",
                "crc32" => "crc",
                _ => "",
            },
            ArmIsa::A32 => match token {
                "half" => "fp16",
                "neon" => "neon",
                "vfpv3" => "vfp3",
                "vfpv3d16" => "d16",
                "vfpv4" => "vfp4",
                "idiva" => "hwdiv-arm",
                "idivt" => "hwdiv",
                _ => "",
            },
        };

        // The crypto subtarget feature needs every extension at once, so
        // collect them separately.
        if isa == ArmIsa::A64 {
            match token {
                "aes" => crypto |= CAP_AES,
                "pmull" => crypto |= CAP_PMULL,
                "sha1" => crypto |= CAP_SHA1,
                "sha2" => crypto |= CAP_SHA2,
                _ => {}
            }
        }

        if !mapped.is_empty() {
            features.insert(mapped, true);
        }
    }

    if isa == ArmIsa::A64 && crypto == CAP_AES | CAP_PMULL | CAP_SHA1 | CAP_SHA2 {
        features.insert("crypto", true);
    }

    features
}

/// /proc/cpuinfo-backed detector for ARM Linux hosts.
pub struct ArmDetector {
    isa: ArmIsa,
    fixed: Option<String>,
}

impl ArmDetector {
    pub fn host(isa: ArmIsa) -> Self {
        Self { isa, fixed: None }
    }

    /// Detector over a fixed text buffer, for tests.
    pub fn from_text(isa: ArmIsa, text: impl Into<String>) -> Self {
        Self {
            isa,
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

impl HostDetector for ArmDetector {
    fn name(&self) -> &'static str {
        "arm-cpuinfo"
    }

    fn cpu_name(&self) -> String {
        cpu_name_from(&self.cpuinfo()).to_string()
    }

    fn features(&self) -> Option<BTreeMap<&'static str, bool>> {
        Some(feature_map(&self.cpuinfo(), self.isa))
    }
}
