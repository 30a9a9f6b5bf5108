//! Raw CPUID / XGETBV access.
//!
//! The decoding logic never issues hardware instructions itself; it goes
//! through the [`Cpuid`] trait so tests can inject canned register tuples.

/// The four registers returned by one CPUID query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuidRegisters {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// Access to the CPUID and XGETBV instructions.
///
/// `None` means the query cannot be issued at all: non-x86 target, or a
/// 32-bit x86 CPU whose flags register proves CPUID is absent.
pub trait Cpuid {
    /// Query a CPUID leaf with subleaf 0.
    fn leaf(&self, leaf: u32) -> Option<CpuidRegisters> {
        self.leaf_subleaf(leaf, 0)
    }

    /// Query a CPUID leaf and subleaf.
    fn leaf_subleaf(&self, leaf: u32, subleaf: u32) -> Option<CpuidRegisters>;

    /// Read extended control register 0, which records the SIMD state the
    /// OS saves on context switch. Callers must first confirm OSXSAVE via
    /// CPUID; XGETBV faults on CPUs without it.
    fn xcr0(&self) -> Option<u64>;
}

/// [`Cpuid`] implementation backed by the real instructions.
///
/// The compiler intrinsics preserve rbx/ebx as the calling convention
/// requires, so no manual save/restore is needed here.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardwareCpuid;

#[cfg(target_arch = "x86_64")]
impl Cpuid for HardwareCpuid {
    fn leaf_subleaf(&self, leaf: u32, subleaf: u32) -> Option<CpuidRegisters> {
        let result = unsafe { core::arch::x86_64::__cpuid_count(leaf, subleaf) };
        Some(CpuidRegisters {
            eax: result.eax,
            ebx: result.ebx,
            ecx: result.ecx,
            edx: result.edx,
        })
    }

    fn xcr0(&self) -> Option<u64> {
        Some(unsafe { core::arch::x86_64::_xgetbv(0) })
    }
}

#[cfg(target_arch = "x86")]
impl Cpuid for HardwareCpuid {
    fn leaf_subleaf(&self, leaf: u32, subleaf: u32) -> Option<CpuidRegisters> {
        // Pre-P6 parts have no CPUID; the eflags ID-bit toggle is the only
        // way to find out without faulting.
        if !core::arch::x86::has_cpuid() {
            return None;
        }
        let result = unsafe { core::arch::x86::__cpuid_count(leaf, subleaf) };
        Some(CpuidRegisters {
            eax: result.eax,
            ebx: result.ebx,
            ecx: result.ecx,
            edx: result.edx,
        })
    }

    fn xcr0(&self) -> Option<u64> {
        if !core::arch::x86::has_cpuid() {
            return None;
        }
        Some(unsafe { core::arch::x86::_xgetbv(0) })
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
impl Cpuid for HardwareCpuid {
    fn leaf_subleaf(&self, _leaf: u32, _subleaf: u32) -> Option<CpuidRegisters> {
        None
    }

    fn xcr0(&self) -> Option<u64> {
        None
    }
}
