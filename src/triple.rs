//! Process triple derivation.
//!
//! A build-time default triple does not always match the running process: a
//! 32-bit process can run on a toolchain whose default target is 64-bit and
//! vice versa. Only the architecture component is adjusted; vendor, OS, and
//! environment pass through untouched.

/// 32-bit architecture component and its 64-bit variant. Narrowing uses the
/// first matching 64-bit entry, so x86_64 maps back to i386.
const ARCH_VARIANTS: &[(&str, &str)] = &[
    ("i386", "x86_64"),
    ("i486", "x86_64"),
    ("i586", "x86_64"),
    ("i686", "x86_64"),
    ("arm", "aarch64"),
    ("armv7", "aarch64"),
    ("thumb", "aarch64"),
    ("powerpc", "powerpc64"),
    ("mips", "mips64"),
    ("mipsel", "mips64el"),
    ("sparc", "sparc64"),
    ("riscv32", "riscv64"),
];

fn widen_arch(arch: &str) -> Option<&'static str> {
    ARCH_VARIANTS
        .iter()
        .find(|(narrow, _)| *narrow == arch)
        .map(|&(_, wide)| wide)
}

fn narrow_arch(arch: &str) -> Option<&'static str> {
    ARCH_VARIANTS
        .iter()
        .find(|(_, wide)| *wide == arch)
        .map(|&(narrow, _)| narrow)
}

/// Adjust a default triple's architecture to the given pointer width in
/// bytes. Triples without a recognized 32/64-bit counterpart, and triples
/// already matching the width, come back unchanged.
pub fn process_triple_for(default_triple: &str, pointer_width: usize) -> String {
    let Some((arch, rest)) = default_triple.split_once('-') else {
        return default_triple.to_string();
    };
    let replacement = match pointer_width {
        8 => widen_arch(arch),
        4 => narrow_arch(arch),
        _ => None,
    };
    match replacement {
        Some(new_arch) => format!("{new_arch}-{rest}"),
        None => default_triple.to_string(),
    }
}

/// Default triple assembled from compile-time constants; stands in for a
/// build-system-provided host triple.
fn default_host_triple() -> String {
    let arch = std::env::consts::ARCH;
    match std::env::consts::OS {
        "linux" => format!("{arch}-unknown-linux-gnu"),
        "macos" => format!("{arch}-apple-darwin"),
        "windows" => format!("{arch}-pc-windows-msvc"),
        "freebsd" => format!("{arch}-unknown-freebsd"),
        other => format!("{arch}-unknown-{other}"),
    }
}

/// Triple describing the running process, pointer-width corrected.
pub fn get_process_triple() -> String {
    process_triple_for(&default_host_triple(), size_of::<usize>())
}
