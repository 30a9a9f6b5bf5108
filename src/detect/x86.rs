//! x86 / x86-64 host identification via CPUID.
//!
//! Family and model numbers only narrow the search; several decisions hang
//! off runtime feature bits instead, which is also the designed fallback for
//! silicon newer than the model tables.

use std::collections::BTreeMap;

use crate::cpuid::{Cpuid, CpuidRegisters, HardwareCpuid};

use super::HostDetector;

const SIG_INTEL: u32 = 0x756e_6547; // "Genu"
const SIG_AMD: u32 = 0x6874_7541; // "Auth"

/// CPU vendor, from the leaf-0 EBX signature word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    Intel,
    Amd,
    Other,
}

impl Vendor {
    pub fn from_signature(ebx: u32) -> Self {
        match ebx {
            SIG_INTEL => Vendor::Intel,
            SIG_AMD => Vendor::Amd,
            _ => Vendor::Other,
        }
    }
}

/// Family and model with the extended-field fold applied.
///
/// Base family lives in EAX[11:8] and base model in EAX[7:4]. Family 0xF
/// adds the extended family from EAX[27:20]; families 6 and 0xF fold the
/// extended model from EAX[19:16] into the high nibble. Skipping the fold
/// would misread every modern Intel part as a family-0xF legacy CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub family: u32,
    pub model: u32,
}

impl Signature {
    pub fn from_leaf1_eax(eax: u32) -> Self {
        let mut family = (eax >> 8) & 0xf;
        let mut model = (eax >> 4) & 0xf;
        if family == 6 || family == 0xf {
            if family == 0xf {
                family += (eax >> 20) & 0xff;
            }
            model += ((eax >> 16) & 0xf) << 4;
        }
        Signature { family, model }
    }
}

/// Feature bit indices. Values below 32 live in the first word of
/// [`FeatureMask`], the rest in the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Feature {
    Cmov = 0,
    Mmx,
    Popcnt,
    Sse,
    Sse2,
    Sse3,
    Ssse3,
    Sse41,
    Sse42,
    Avx,
    Avx2,
    Sse4a,
    Fma4,
    Xop,
    Fma,
    Avx512f,
    Bmi,
    Bmi2,
    Aes,
    Pclmul,
    Avx512vl,
    Avx512bw,
    Avx512dq,
    Avx512cd,
    Avx512er,
    Avx512pf,
    Avx512vbmi,
    Avx512ifma,
    Avx5124vnniw,
    Avx5124fmaps,
    Avx512vpopcntdq,
    Movbe = 32,
    Adx,
    Em64t,
    Clflushopt,
    Sha,
}

/// Two-word feature set; indices exceed 32 so one u32 is not enough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureMask {
    lo: u32,
    hi: u32,
}

impl FeatureMask {
    pub fn insert(&mut self, feature: Feature) {
        let bit = feature as u32;
        if bit < 32 {
            self.lo |= 1 << bit;
        } else {
            self.hi |= 1 << (bit - 32);
        }
    }

    pub fn contains(&self, feature: Feature) -> bool {
        let bit = feature as u32;
        if bit < 32 {
            self.lo & (1 << bit) != 0
        } else {
            self.hi & (1 << (bit - 32)) != 0
        }
    }
}

fn bit(value: u32, index: u32) -> bool {
    (value >> index) & 1 != 0
}

/// Intel microarchitectures the model tables can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntelCpu {
    I386,
    I486,
    Pentium,
    PentiumMmx,
    PentiumPro,
    Pentium2,
    Pentium3,
    Pentium4,
    PentiumM,
    Yonah,
    Core2,
    Penryn,
    Nehalem,
    Westmere,
    Sandybridge,
    Ivybridge,
    Haswell,
    Broadwell,
    Skylake,
    SkylakeAvx512,
    Bonnell,
    Silvermont,
    Goldmont,
    Knl,
    X86_64,
    Nocona,
    Prescott,
}

impl IntelCpu {
    fn name(self) -> &'static str {
        match self {
            IntelCpu::I386 => "i386",
            IntelCpu::I486 => "i486",
            IntelCpu::Pentium => "pentium",
            IntelCpu::PentiumMmx => "pentium-mmx",
            IntelCpu::PentiumPro => "pentiumpro",
            IntelCpu::Pentium2 => "pentium2",
            IntelCpu::Pentium3 => "pentium3",
            IntelCpu::Pentium4 => "pentium4",
            IntelCpu::PentiumM => "pentium-m",
            IntelCpu::Yonah => "yonah",
            IntelCpu::Core2 => "core2",
            IntelCpu::Penryn => "penryn",
            IntelCpu::Nehalem => "nehalem",
            IntelCpu::Westmere => "westmere",
            IntelCpu::Sandybridge => "sandybridge",
            IntelCpu::Ivybridge => "ivybridge",
            IntelCpu::Haswell => "haswell",
            IntelCpu::Broadwell => "broadwell",
            IntelCpu::Skylake => "skylake",
            IntelCpu::SkylakeAvx512 => "skylake-avx512",
            IntelCpu::Bonnell => "bonnell",
            IntelCpu::Silvermont => "silvermont",
            IntelCpu::Goldmont => "goldmont",
            IntelCpu::Knl => "knl",
            IntelCpu::X86_64 => "x86-64",
            IntelCpu::Nocona => "nocona",
            IntelCpu::Prescott => "prescott",
        }
    }
}

/// Family 6 model table, following Intel's software developer manual
/// groupings. Models not listed here fall into the feature cascade.
const INTEL_FAMILY6: &[(&[u32], IntelCpu)] = &[
    (&[0x01], IntelCpu::PentiumPro),
    (&[0x03, 0x05, 0x06], IntelCpu::Pentium2),
    (&[0x07, 0x08, 0x0a, 0x0b], IntelCpu::Pentium3),
    (&[0x09, 0x0d, 0x15], IntelCpu::PentiumM),
    (&[0x0e], IntelCpu::Yonah),
    (&[0x0f, 0x16], IntelCpu::Core2),
    (&[0x17, 0x1d], IntelCpu::Penryn),
    (&[0x1a, 0x1e, 0x1f, 0x2e], IntelCpu::Nehalem),
    (&[0x25, 0x2c, 0x2f], IntelCpu::Westmere),
    (&[0x2a, 0x2d], IntelCpu::Sandybridge),
    (&[0x3a, 0x3e], IntelCpu::Ivybridge),
    (&[0x3c, 0x3f, 0x45, 0x46], IntelCpu::Haswell),
    (&[0x3d, 0x47, 0x4f, 0x56], IntelCpu::Broadwell),
    // Skylake client plus both Kaby Lake models.
    (&[0x4e, 0x5e, 0x8e, 0x9e], IntelCpu::Skylake),
    (&[0x55], IntelCpu::SkylakeAvx512),
    (&[0x1c, 0x26, 0x27, 0x35, 0x36], IntelCpu::Bonnell),
    // 0x4c is really Airmont; it behaves as Silvermont for our purposes.
    (&[0x37, 0x4a, 0x4d, 0x5a, 0x5d, 0x4c], IntelCpu::Silvermont),
    (&[0x5c, 0x5f], IntelCpu::Goldmont),
    (&[0x57], IntelCpu::Knl),
];

fn intel_cpu(sig: Signature, brand_id: u32, features: &FeatureMask) -> Option<IntelCpu> {
    if brand_id != 0 {
        // Legacy OEM-branded parts are excluded from fine-grained detection.
        return None;
    }
    match sig.family {
        3 => Some(IntelCpu::I386),
        4 => Some(IntelCpu::I486),
        5 => Some(if sig.model == 4 {
            IntelCpu::PentiumMmx
        } else {
            IntelCpu::Pentium
        }),
        6 => Some(
            INTEL_FAMILY6
                .iter()
                .find(|(models, _)| models.contains(&sig.model))
                .map(|&(_, cpu)| cpu)
                .unwrap_or_else(|| intel_family6_from_features(features)),
        ),
        15 => Some(intel_family15(sig.model, features)),
        _ => None,
    }
}

/// NetBurst (family 0xF): the model picks the process generation, EM64T
/// picks the 64-bit variant of the name.
fn intel_family15(model: u32, features: &FeatureMask) -> IntelCpu {
    let em64t = features.contains(Feature::Em64t);
    match model {
        3 | 4 | 6 => {
            if em64t {
                IntelCpu::Nocona
            } else {
                IntelCpu::Prescott
            }
        }
        _ => {
            if em64t {
                IntelCpu::X86_64
            } else {
                IntelCpu::Pentium4
            }
        }
    }
}

/// Fallback for family 6 models missing from the table.
///
/// This is an ordered priority list; feature sets overlap across
/// generations, so the first matching predicate wins and the order is
/// load-bearing.
fn intel_family6_from_features(features: &FeatureMask) -> IntelCpu {
    if features.contains(Feature::Avx512f) {
        return if features.contains(Feature::Avx512vl) {
            IntelCpu::SkylakeAvx512
        } else {
            IntelCpu::Knl
        };
    }
    if features.contains(Feature::Clflushopt) {
        return if features.contains(Feature::Sha) {
            IntelCpu::Goldmont
        } else {
            IntelCpu::Skylake
        };
    }
    if features.contains(Feature::Adx) {
        return IntelCpu::Broadwell;
    }
    if features.contains(Feature::Avx2) {
        return IntelCpu::Haswell;
    }
    if features.contains(Feature::Avx) {
        return IntelCpu::Sandybridge;
    }
    if features.contains(Feature::Sse42) {
        // MOVBE separates the Atom line from the big cores here.
        return if features.contains(Feature::Movbe) {
            IntelCpu::Silvermont
        } else {
            IntelCpu::Nehalem
        };
    }
    if features.contains(Feature::Sse41) {
        return IntelCpu::Penryn;
    }
    if features.contains(Feature::Ssse3) {
        return if features.contains(Feature::Movbe) {
            IntelCpu::Bonnell
        } else {
            IntelCpu::Core2
        };
    }
    if features.contains(Feature::Em64t) {
        return IntelCpu::X86_64;
    }
    if features.contains(Feature::Sse2) {
        return IntelCpu::PentiumM;
    }
    if features.contains(Feature::Sse) {
        return IntelCpu::Pentium3;
    }
    if features.contains(Feature::Mmx) {
        return IntelCpu::Pentium2;
    }
    IntelCpu::PentiumPro
}

/// AMD microarchitectures the family tables can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmdCpu {
    I486,
    Pentium,
    K6,
    K62,
    K63,
    Geode,
    Athlon,
    AthlonXp,
    K8,
    K8Sse3,
    AmdFam10,
    Btver1,
    Bdver1,
    Bdver2,
    Bdver3,
    Bdver4,
    Btver2,
    Znver1,
}

impl AmdCpu {
    fn name(self) -> &'static str {
        match self {
            AmdCpu::I486 => "i486",
            AmdCpu::Pentium => "pentium",
            AmdCpu::K6 => "k6",
            AmdCpu::K62 => "k6-2",
            AmdCpu::K63 => "k6-3",
            AmdCpu::Geode => "geode",
            AmdCpu::Athlon => "athlon",
            AmdCpu::AthlonXp => "athlon-xp",
            AmdCpu::K8 => "k8",
            AmdCpu::K8Sse3 => "k8-sse3",
            AmdCpu::AmdFam10 => "amdfam10",
            AmdCpu::Btver1 => "btver1",
            AmdCpu::Bdver1 => "bdver1",
            AmdCpu::Bdver2 => "bdver2",
            AmdCpu::Bdver3 => "bdver3",
            AmdCpu::Bdver4 => "bdver4",
            AmdCpu::Btver2 => "btver2",
            AmdCpu::Znver1 => "znver1",
        }
    }
}

fn amd_cpu(sig: Signature, features: &FeatureMask) -> Option<AmdCpu> {
    match sig.family {
        4 => Some(AmdCpu::I486),
        5 => Some(match sig.model {
            6 | 7 => AmdCpu::K6,
            8 => AmdCpu::K62,
            9 | 13 => AmdCpu::K63,
            10 => AmdCpu::Geode,
            _ => AmdCpu::Pentium,
        }),
        6 => Some(if features.contains(Feature::Sse) {
            AmdCpu::AthlonXp
        } else {
            AmdCpu::Athlon
        }),
        15 => Some(if features.contains(Feature::Sse3) {
            AmdCpu::K8Sse3
        } else {
            AmdCpu::K8
        }),
        16 => Some(AmdCpu::AmdFam10),
        20 => Some(AmdCpu::Btver1),
        // Family 0x15 revisions come in model ranges, not discrete values.
        21 => Some(match sig.model {
            0x60..=0x7f => AmdCpu::Bdver4, // Excavator
            0x30..=0x3f => AmdCpu::Bdver3, // Steamroller
            0x10..=0x1f => AmdCpu::Bdver2, // Piledriver
            0x00..=0x0f => AmdCpu::Bdver1, // Bulldozer
            // Gaps in the documented ranges default to the first revision.
            _ => AmdCpu::Bdver1,
        }),
        22 => Some(AmdCpu::Btver2),
        23 => Some(AmdCpu::Znver1),
        _ => None,
    }
}

/// OS save-state gates for AVX and AVX-512.
///
/// A set CPUID bit is not enough: instructions fault unless the OS opted in
/// to saving the matching register state. OSXSAVE and AVX must both be
/// advertised before XGETBV may even be issued; XCR0 bits 1|2 confirm
/// SSE+YMM state, bits 5..7 the opmask/ZMM state on top.
fn avx_save_state(cpuid: &dyn Cpuid, leaf1_ecx: u32) -> (bool, bool) {
    const AVX_BITS: u32 = (1 << 27) | (1 << 28);
    if leaf1_ecx & AVX_BITS != AVX_BITS {
        return (false, false);
    }
    let Some(xcr0) = cpuid.xcr0() else {
        return (false, false);
    };
    let has_avx = xcr0 & 0x6 == 0x6;
    let has_avx512_save = has_avx && xcr0 & 0xe0 == 0xe0;
    (has_avx, has_avx512_save)
}

/// Decode the feature mask from leaf 1 plus the gated extended leaves.
pub fn decode_features(cpuid: &dyn Cpuid, leaf1: CpuidRegisters, max_leaf: u32) -> FeatureMask {
    let mut mask = FeatureMask::default();
    let ecx = leaf1.ecx;
    let edx = leaf1.edx;

    if bit(edx, 15) {
        mask.insert(Feature::Cmov);
    }
    if bit(edx, 23) {
        mask.insert(Feature::Mmx);
    }
    if bit(edx, 25) {
        mask.insert(Feature::Sse);
    }
    if bit(edx, 26) {
        mask.insert(Feature::Sse2);
    }

    if bit(ecx, 0) {
        mask.insert(Feature::Sse3);
    }
    if bit(ecx, 1) {
        mask.insert(Feature::Pclmul);
    }
    if bit(ecx, 9) {
        mask.insert(Feature::Ssse3);
    }
    if bit(ecx, 12) {
        mask.insert(Feature::Fma);
    }
    if bit(ecx, 19) {
        mask.insert(Feature::Sse41);
    }
    if bit(ecx, 20) {
        mask.insert(Feature::Sse42);
    }
    if bit(ecx, 22) {
        mask.insert(Feature::Movbe);
    }
    if bit(ecx, 23) {
        mask.insert(Feature::Popcnt);
    }
    if bit(ecx, 25) {
        mask.insert(Feature::Aes);
    }

    let (has_avx, has_avx512_save) = avx_save_state(cpuid, ecx);
    if has_avx {
        mask.insert(Feature::Avx);
    }

    let leaf7 = if max_leaf >= 7 {
        cpuid.leaf_subleaf(7, 0)
    } else {
        None
    };
    if let Some(l7) = leaf7 {
        if bit(l7.ebx, 3) {
            mask.insert(Feature::Bmi);
        }
        if bit(l7.ebx, 5) && has_avx {
            mask.insert(Feature::Avx2);
        }
        if bit(l7.ebx, 9) {
            mask.insert(Feature::Bmi2);
        }
        if bit(l7.ebx, 16) && has_avx512_save {
            mask.insert(Feature::Avx512f);
        }
        if bit(l7.ebx, 17) && has_avx512_save {
            mask.insert(Feature::Avx512dq);
        }
        if bit(l7.ebx, 19) {
            mask.insert(Feature::Adx);
        }
        if bit(l7.ebx, 21) && has_avx512_save {
            mask.insert(Feature::Avx512ifma);
        }
        if bit(l7.ebx, 23) {
            mask.insert(Feature::Clflushopt);
        }
        if bit(l7.ebx, 26) && has_avx512_save {
            mask.insert(Feature::Avx512pf);
        }
        if bit(l7.ebx, 27) && has_avx512_save {
            mask.insert(Feature::Avx512er);
        }
        if bit(l7.ebx, 28) && has_avx512_save {
            mask.insert(Feature::Avx512cd);
        }
        if bit(l7.ebx, 29) {
            mask.insert(Feature::Sha);
        }
        if bit(l7.ebx, 30) && has_avx512_save {
            mask.insert(Feature::Avx512bw);
        }
        if bit(l7.ebx, 31) && has_avx512_save {
            mask.insert(Feature::Avx512vl);
        }
        if bit(l7.ecx, 1) && has_avx512_save {
            mask.insert(Feature::Avx512vbmi);
        }
        if bit(l7.ecx, 14) && has_avx512_save {
            mask.insert(Feature::Avx512vpopcntdq);
        }
        if bit(l7.edx, 2) && has_avx512_save {
            mask.insert(Feature::Avx5124vnniw);
        }
        if bit(l7.edx, 3) && has_avx512_save {
            mask.insert(Feature::Avx5124fmaps);
        }
    }

    let max_ext_leaf = cpuid.leaf(0x8000_0000).map_or(0, |r| r.eax);
    let ext1 = if max_ext_leaf >= 0x8000_0001 {
        cpuid.leaf(0x8000_0001)
    } else {
        None
    };
    if let Some(e1) = ext1 {
        if bit(e1.ecx, 6) {
            mask.insert(Feature::Sse4a);
        }
        if bit(e1.ecx, 11) && has_avx {
            mask.insert(Feature::Xop);
        }
        if bit(e1.ecx, 16) && has_avx {
            mask.insert(Feature::Fma4);
        }
        if bit(e1.edx, 29) {
            mask.insert(Feature::Em64t);
        }
    }

    mask
}

/// Canonical name of the host CPU. "generic" whenever CPUID is unavailable
/// or the (vendor, family, model) tuple has no mapping; identification never
/// fails outright.
pub fn host_cpu_name(cpuid: &dyn Cpuid) -> &'static str {
    let Some(leaf0) = cpuid.leaf(0) else {
        return "generic";
    };
    let max_leaf = leaf0.eax;
    if max_leaf < 1 {
        return "generic";
    }
    let vendor = Vendor::from_signature(leaf0.ebx);
    let Some(leaf1) = cpuid.leaf(1) else {
        return "generic";
    };

    let sig = Signature::from_leaf1_eax(leaf1.eax);
    let brand_id = leaf1.ebx & 0xff;
    let features = decode_features(cpuid, leaf1, max_leaf);

    match vendor {
        Vendor::Intel => intel_cpu(sig, brand_id, &features).map(IntelCpu::name),
        Vendor::Amd => amd_cpu(sig, &features).map(AmdCpu::name),
        Vendor::Other => None,
    }
    .unwrap_or("generic")
}

/// Full feature name -> availability map, with the same OS save-state
/// gating as the mask. `None` when CPUID is unavailable.
pub fn feature_map(cpuid: &dyn Cpuid) -> Option<BTreeMap<&'static str, bool>> {
    let leaf0 = cpuid.leaf(0)?;
    let max_leaf = leaf0.eax;
    if max_leaf < 1 {
        return None;
    }
    let leaf1 = cpuid.leaf(1)?;
    let ecx = leaf1.ecx;
    let edx = leaf1.edx;

    let mut features = BTreeMap::new();
    features.insert("cmov", bit(edx, 15));
    features.insert("mmx", bit(edx, 23));
    features.insert("sse", bit(edx, 25));
    features.insert("sse2", bit(edx, 26));
    features.insert("sse3", bit(ecx, 0));
    features.insert("ssse3", bit(ecx, 9));
    features.insert("sse4.1", bit(ecx, 19));
    features.insert("sse4.2", bit(ecx, 20));

    features.insert("pclmul", bit(ecx, 1));
    features.insert("cx16", bit(ecx, 13));
    features.insert("movbe", bit(ecx, 22));
    features.insert("popcnt", bit(ecx, 23));
    features.insert("aes", bit(ecx, 25));
    features.insert("rdrnd", bit(ecx, 30));

    let (has_avx_save, has_avx512_save) = avx_save_state(cpuid, ecx);
    features.insert("avx", has_avx_save);
    features.insert("fma", has_avx_save && bit(ecx, 12));
    features.insert("f16c", has_avx_save && bit(ecx, 29));
    // XSAVE is only reported once the OS actually saves YMM state.
    features.insert("xsave", has_avx_save && bit(ecx, 26));

    let max_ext_leaf = cpuid.leaf(0x8000_0000).map_or(0, |r| r.eax);
    let ext1 = if max_ext_leaf >= 0x8000_0001 {
        cpuid.leaf(0x8000_0001)
    } else {
        None
    };
    let has_ext1 = ext1.is_some();
    let e1 = ext1.unwrap_or_default();
    features.insert("lzcnt", has_ext1 && bit(e1.ecx, 5));
    features.insert("sse4a", has_ext1 && bit(e1.ecx, 6));
    features.insert("prfchw", has_ext1 && bit(e1.ecx, 8));
    features.insert("xop", has_ext1 && bit(e1.ecx, 11) && has_avx_save);
    features.insert("lwp", has_ext1 && bit(e1.ecx, 15));
    features.insert("fma4", has_ext1 && bit(e1.ecx, 16) && has_avx_save);
    features.insert("tbm", has_ext1 && bit(e1.ecx, 21));
    features.insert("mwaitx", has_ext1 && bit(e1.ecx, 29));

    let ext8 = if max_ext_leaf >= 0x8000_0008 {
        cpuid.leaf_subleaf(0x8000_0008, 0)
    } else {
        None
    };
    features.insert("clzero", ext8.is_some_and(|e8| bit(e8.ebx, 0)));

    let leaf7 = if max_leaf >= 7 {
        cpuid.leaf_subleaf(7, 0)
    } else {
        None
    };
    let has_leaf7 = leaf7.is_some();
    let l7 = leaf7.unwrap_or_default();

    features.insert("avx2", has_avx_save && has_leaf7 && bit(l7.ebx, 5));
    features.insert("fsgsbase", has_leaf7 && bit(l7.ebx, 0));
    features.insert("sgx", has_leaf7 && bit(l7.ebx, 2));
    features.insert("bmi", has_leaf7 && bit(l7.ebx, 3));
    features.insert("bmi2", has_leaf7 && bit(l7.ebx, 8));
    features.insert("rtm", has_leaf7 && bit(l7.ebx, 11));
    features.insert("rdseed", has_leaf7 && bit(l7.ebx, 18));
    features.insert("adx", has_leaf7 && bit(l7.ebx, 19));
    features.insert("clflushopt", has_leaf7 && bit(l7.ebx, 23));
    features.insert("clwb", has_leaf7 && bit(l7.ebx, 24));
    features.insert("sha", has_leaf7 && bit(l7.ebx, 29));

    features.insert("avx512f", has_leaf7 && bit(l7.ebx, 16) && has_avx512_save);
    features.insert("avx512dq", has_leaf7 && bit(l7.ebx, 17) && has_avx512_save);
    features.insert("avx512ifma", has_leaf7 && bit(l7.ebx, 21) && has_avx512_save);
    features.insert("avx512pf", has_leaf7 && bit(l7.ebx, 26) && has_avx512_save);
    features.insert("avx512er", has_leaf7 && bit(l7.ebx, 27) && has_avx512_save);
    features.insert("avx512cd", has_leaf7 && bit(l7.ebx, 28) && has_avx512_save);
    features.insert("avx512bw", has_leaf7 && bit(l7.ebx, 30) && has_avx512_save);
    features.insert("avx512vl", has_leaf7 && bit(l7.ebx, 31) && has_avx512_save);

    features.insert("prefetchwt1", has_leaf7 && bit(l7.ecx, 0));
    features.insert("avx512vbmi", has_leaf7 && bit(l7.ecx, 1) && has_avx512_save);
    features.insert(
        "avx512vpopcntdq",
        has_leaf7 && bit(l7.ecx, 14) && has_avx512_save,
    );
    features.insert("pku", has_leaf7 && bit(l7.ecx, 4));

    let leaf_d1 = if max_leaf >= 0xd {
        cpuid.leaf_subleaf(0xd, 1)
    } else {
        None
    };
    let has_leaf_d1 = leaf_d1.is_some();
    let d1 = leaf_d1.unwrap_or_default();
    features.insert("xsaveopt", has_avx_save && has_leaf_d1 && bit(d1.eax, 0));
    features.insert("xsavec", has_avx_save && has_leaf_d1 && bit(d1.eax, 1));
    features.insert("xsaves", has_avx_save && has_leaf_d1 && bit(d1.eax, 3));

    Some(features)
}

/// CPUID-based detector used on x86 and x86-64 hosts.
pub struct X86Detector<C = HardwareCpuid> {
    cpuid: C,
}

impl<C: Cpuid + Send + Sync> X86Detector<C> {
    pub fn new(cpuid: C) -> Self {
        Self { cpuid }
    }
}

impl<C: Cpuid + Send + Sync> HostDetector for X86Detector<C> {
    fn name(&self) -> &'static str {
        "x86-cpuid"
    }

    fn cpu_name(&self) -> String {
        host_cpu_name(&self.cpuid).to_string()
    }

    fn features(&self) -> Option<BTreeMap<&'static str, bool>> {
        feature_map(&self.cpuid)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Canned register tuples standing in for the hardware.
    #[derive(Default)]
    struct FakeCpuid {
        leaves: HashMap<(u32, u32), CpuidRegisters>,
        xcr0: Option<u64>,
    }

    impl FakeCpuid {
        fn with_leaf(mut self, leaf: u32, subleaf: u32, regs: CpuidRegisters) -> Self {
            self.leaves.insert((leaf, subleaf), regs);
            self
        }

        fn with_xcr0(mut self, value: u64) -> Self {
            self.xcr0 = Some(value);
            self
        }

        /// Leaf 0 with the given max leaf and vendor signature.
        fn with_vendor(self, max_leaf: u32, signature: u32) -> Self {
            self.with_leaf(
                0,
                0,
                CpuidRegisters {
                    eax: max_leaf,
                    ebx: signature,
                    ..Default::default()
                },
            )
        }

        fn with_leaf1_eax(self, eax: u32) -> Self {
            self.with_leaf(
                1,
                0,
                CpuidRegisters {
                    eax,
                    ..Default::default()
                },
            )
        }
    }

    impl Cpuid for FakeCpuid {
        fn leaf_subleaf(&self, leaf: u32, subleaf: u32) -> Option<CpuidRegisters> {
            self.leaves.get(&(leaf, subleaf)).copied()
        }

        fn xcr0(&self) -> Option<u64> {
            self.xcr0
        }
    }

    fn mask_of(features: &[Feature]) -> FeatureMask {
        let mut mask = FeatureMask::default();
        for &feature in features {
            mask.insert(feature);
        }
        mask
    }

    #[test]
    fn family6_folds_in_extended_model() {
        // Coffee Lake: family 6, base model 0xA, extended model 0x9.
        let sig = Signature::from_leaf1_eax(0x0009_06ea);
        assert_eq!(sig.family, 6);
        assert_eq!(sig.model, 0x9a);
    }

    #[test]
    fn family15_adds_extended_family() {
        // AMD family 0x15 (Piledriver): base family 0xF, extended family 6,
        // base model 2, extended model 1.
        let sig = Signature::from_leaf1_eax(0x0061_0f20);
        assert_eq!(sig.family, 21);
        assert_eq!(sig.model, 0x12);
    }

    #[test]
    fn low_families_ignore_extended_fields() {
        let sig = Signature::from_leaf1_eax(0x0061_0520);
        assert_eq!(sig.family, 5);
        assert_eq!(sig.model, 2);
    }

    #[test]
    fn cpuid_unavailable_is_generic() {
        assert_eq!(host_cpu_name(&FakeCpuid::default()), "generic");
        assert_eq!(feature_map(&FakeCpuid::default()), None);
    }

    #[test]
    fn max_leaf_below_one_is_generic() {
        let fake = FakeCpuid::default().with_vendor(0, SIG_INTEL);
        assert_eq!(host_cpu_name(&fake), "generic");
    }

    #[test]
    fn intel_skylake_desktop() {
        // Family 6, model 0x5E.
        let fake = FakeCpuid::default()
            .with_vendor(1, SIG_INTEL)
            .with_leaf1_eax(0x0005_06e0);
        assert_eq!(host_cpu_name(&fake), "skylake");
    }

    #[test]
    fn intel_skylake_xeon_is_avx512_variant() {
        // Family 6, model 0x55.
        let fake = FakeCpuid::default()
            .with_vendor(1, SIG_INTEL)
            .with_leaf1_eax(0x0005_0650);
        assert_eq!(host_cpu_name(&fake), "skylake-avx512");
    }

    #[test]
    fn intel_branded_part_is_generic() {
        let fake = FakeCpuid::default().with_vendor(1, SIG_INTEL).with_leaf(
            1,
            0,
            CpuidRegisters {
                eax: 0x0005_06e0,
                ebx: 0x01, // legacy brand id set
                ..Default::default()
            },
        );
        assert_eq!(host_cpu_name(&fake), "generic");
    }

    #[test]
    fn amd_family23_is_znver1() {
        // Family 0xF + extended family 8.
        let fake = FakeCpuid::default()
            .with_vendor(1, SIG_AMD)
            .with_leaf1_eax(0x0080_0f10);
        assert_eq!(host_cpu_name(&fake), "znver1");
    }

    #[test]
    fn amd_family21_model_ranges() {
        let cases = [
            (0x05, AmdCpu::Bdver1),
            (0x12, AmdCpu::Bdver2),
            (0x35, AmdCpu::Bdver3),
            (0x6a, AmdCpu::Bdver4),
            (0x25, AmdCpu::Bdver1), // gap
        ];
        for (model, expected) in cases {
            let sig = Signature { family: 21, model };
            assert_eq!(amd_cpu(sig, &FeatureMask::default()), Some(expected));
        }
    }

    #[test]
    fn amd_low_families() {
        let features = FeatureMask::default();
        assert_eq!(
            amd_cpu(Signature { family: 5, model: 8 }, &features),
            Some(AmdCpu::K62)
        );
        assert_eq!(
            amd_cpu(Signature { family: 5, model: 10 }, &features),
            Some(AmdCpu::Geode)
        );
        assert_eq!(
            amd_cpu(Signature { family: 22, model: 0 }, &features),
            Some(AmdCpu::Btver2)
        );
        assert_eq!(
            amd_cpu(Signature { family: 99, model: 0 }, &features),
            None
        );
    }

    #[test]
    fn amd_athlon_and_k8_split_on_features() {
        let sse = mask_of(&[Feature::Sse]);
        let sse3 = mask_of(&[Feature::Sse3]);
        let none = FeatureMask::default();
        assert_eq!(
            amd_cpu(Signature { family: 6, model: 0 }, &sse),
            Some(AmdCpu::AthlonXp)
        );
        assert_eq!(
            amd_cpu(Signature { family: 6, model: 0 }, &none),
            Some(AmdCpu::Athlon)
        );
        assert_eq!(
            amd_cpu(Signature { family: 15, model: 0 }, &sse3),
            Some(AmdCpu::K8Sse3)
        );
        assert_eq!(
            amd_cpu(Signature { family: 15, model: 0 }, &none),
            Some(AmdCpu::K8)
        );
    }

    #[test]
    fn unknown_vendor_is_generic() {
        let fake = FakeCpuid::default()
            .with_vendor(1, 0x1234_5678)
            .with_leaf1_eax(0x0005_06e0);
        assert_eq!(host_cpu_name(&fake), "generic");
    }

    #[test]
    fn family6_cascade_order() {
        let cases: &[(&[Feature], IntelCpu)] = &[
            (
                &[Feature::Avx512f, Feature::Avx512vl, Feature::Clflushopt],
                IntelCpu::SkylakeAvx512,
            ),
            (&[Feature::Avx512f], IntelCpu::Knl),
            (
                &[Feature::Clflushopt, Feature::Sha],
                IntelCpu::Goldmont,
            ),
            (&[Feature::Clflushopt, Feature::Avx2], IntelCpu::Skylake),
            (&[Feature::Adx, Feature::Avx2], IntelCpu::Broadwell),
            (&[Feature::Avx2, Feature::Avx], IntelCpu::Haswell),
            (&[Feature::Avx, Feature::Sse42], IntelCpu::Sandybridge),
            (
                &[Feature::Sse42, Feature::Movbe],
                IntelCpu::Silvermont,
            ),
            (&[Feature::Sse42], IntelCpu::Nehalem),
            (&[Feature::Sse41], IntelCpu::Penryn),
            (&[Feature::Ssse3, Feature::Movbe], IntelCpu::Bonnell),
            (&[Feature::Ssse3], IntelCpu::Core2),
            (&[Feature::Em64t, Feature::Sse2], IntelCpu::X86_64),
            (&[Feature::Sse2], IntelCpu::PentiumM),
            (&[Feature::Sse], IntelCpu::Pentium3),
            (&[Feature::Mmx], IntelCpu::Pentium2),
            (&[], IntelCpu::PentiumPro),
        ];
        for (features, expected) in cases {
            assert_eq!(
                intel_family6_from_features(&mask_of(features)),
                *expected,
                "features {features:?}"
            );
        }
    }

    #[test]
    fn unknown_family6_model_uses_cascade() {
        // Family 6, model 0x99 is not in the table; AVX2 plus the save
        // state should classify it as Haswell.
        let fake = FakeCpuid::default()
            .with_vendor(7, SIG_INTEL)
            .with_leaf(
                1,
                0,
                CpuidRegisters {
                    eax: 0x0009_0690,
                    ecx: (1 << 27) | (1 << 28),
                    ..Default::default()
                },
            )
            .with_leaf(
                7,
                0,
                CpuidRegisters {
                    ebx: 1 << 5,
                    ..Default::default()
                },
            )
            .with_xcr0(0x7);
        assert_eq!(host_cpu_name(&fake), "haswell");
    }

    #[test]
    fn avx_reported_but_not_os_enabled_is_gated_off() {
        // CPUID advertises OSXSAVE+AVX and FMA, but XCR0 says the OS never
        // enabled YMM state saving.
        let fake = FakeCpuid::default()
            .with_vendor(7, SIG_INTEL)
            .with_leaf(
                1,
                0,
                CpuidRegisters {
                    eax: 0x0005_06e0,
                    ecx: (1 << 27) | (1 << 28) | (1 << 12),
                    ..Default::default()
                },
            )
            .with_leaf(
                7,
                0,
                CpuidRegisters {
                    ebx: (1 << 5) | (1 << 16),
                    ..Default::default()
                },
            )
            .with_xcr0(0x0);
        let features = feature_map(&fake).unwrap();
        assert_eq!(features["avx"], false);
        assert_eq!(features["fma"], false);
        assert_eq!(features["avx2"], false);
        assert_eq!(features["avx512f"], false);
    }

    #[test]
    fn avx512_needs_zmm_save_state() {
        let leaf1 = CpuidRegisters {
            eax: 0x0005_06e0,
            ecx: (1 << 27) | (1 << 28),
            ..Default::default()
        };
        let leaf7 = CpuidRegisters {
            ebx: 1 << 16,
            ..Default::default()
        };
        // YMM saved but not ZMM: avx yes, avx512f no.
        let fake = FakeCpuid::default()
            .with_vendor(7, SIG_INTEL)
            .with_leaf(1, 0, leaf1)
            .with_leaf(7, 0, leaf7)
            .with_xcr0(0x7);
        let features = feature_map(&fake).unwrap();
        assert_eq!(features["avx"], true);
        assert_eq!(features["avx512f"], false);

        // Full state vector: both report true.
        let fake = FakeCpuid::default()
            .with_vendor(7, SIG_INTEL)
            .with_leaf(1, 0, leaf1)
            .with_leaf(7, 0, leaf7)
            .with_xcr0(0xe7);
        let features = feature_map(&fake).unwrap();
        assert_eq!(features["avx"], true);
        assert_eq!(features["avx512f"], true);
    }

    #[test]
    fn extended_leaves_respect_max_ext_leaf() {
        // 0x80000000 reports no extended leaves; sse4a must stay false even
        // though a stale 0x80000001 tuple is present.
        let fake = FakeCpuid::default()
            .with_vendor(1, SIG_AMD)
            .with_leaf1_eax(0x0080_0f10)
            .with_leaf(
                0x8000_0000,
                0,
                CpuidRegisters {
                    eax: 0x8000_0000,
                    ..Default::default()
                },
            )
            .with_leaf(
                0x8000_0001,
                0,
                CpuidRegisters {
                    ecx: 1 << 6,
                    ..Default::default()
                },
            );
        let features = feature_map(&fake).unwrap();
        assert_eq!(features["sse4a"], false);
    }

    #[test]
    fn feature_map_reads_extended_leaves() {
        let fake = FakeCpuid::default()
            .with_vendor(1, SIG_AMD)
            .with_leaf1_eax(0x0080_0f10)
            .with_leaf(
                0x8000_0000,
                0,
                CpuidRegisters {
                    eax: 0x8000_0008,
                    ..Default::default()
                },
            )
            .with_leaf(
                0x8000_0001,
                0,
                CpuidRegisters {
                    ecx: (1 << 5) | (1 << 6),
                    edx: 1 << 29,
                    ..Default::default()
                },
            )
            .with_leaf(
                0x8000_0008,
                0,
                CpuidRegisters {
                    ebx: 1,
                    ..Default::default()
                },
            );
        let features = feature_map(&fake).unwrap();
        assert_eq!(features["lzcnt"], true);
        assert_eq!(features["sse4a"], true);
        assert_eq!(features["clzero"], true);
        assert_eq!(features["avx"], false);
    }

    #[test]
    fn nocona_vs_prescott_on_em64t() {
        // Family 0xF model 3.
        let em64t = mask_of(&[Feature::Em64t]);
        assert_eq!(intel_family15(3, &em64t), IntelCpu::Nocona);
        assert_eq!(intel_family15(3, &FeatureMask::default()), IntelCpu::Prescott);
        assert_eq!(intel_family15(0, &em64t), IntelCpu::X86_64);
        assert_eq!(intel_family15(0, &FeatureMask::default()), IntelCpu::Pentium4);
    }

    #[test]
    fn intel_model_table_golden_values() {
        let cases = [
            (0x1a, "nehalem"),
            (0x2c, "westmere"),
            (0x2a, "sandybridge"),
            (0x3a, "ivybridge"),
            (0x3c, "haswell"),
            (0x3d, "broadwell"),
            (0x4e, "skylake"),
            (0x9e, "skylake"),
            (0x1c, "bonnell"),
            (0x4c, "silvermont"),
            (0x5c, "goldmont"),
            (0x57, "knl"),
            (0x17, "penryn"),
            (0x0f, "core2"),
            (0x0e, "yonah"),
        ];
        for (model, expected) in cases {
            let sig = Signature { family: 6, model };
            let cpu = intel_cpu(sig, 0, &FeatureMask::default()).unwrap();
            assert_eq!(cpu.name(), expected, "model {model:#x}");
        }
    }
}
