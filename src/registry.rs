//! Named architecture/mode combinations accepted by `--arch`.

use capstone::{Arch, Capstone, Endian, ExtraMode, Mode};

/// One selectable architecture variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchEntry {
    /// Name used on the command line
    pub name: &'static str,
    pub arch: Arch,
    pub mode: Mode,
    pub extra: Option<ExtraMode>,
    pub endian: Endian,
}

const fn entry(name: &'static str, arch: Arch, mode: Mode) -> ArchEntry {
    ArchEntry {
        name,
        arch,
        mode,
        extra: None,
        endian: Endian::Little,
    }
}

const fn extra(name: &'static str, arch: Arch, mode: Mode, extra: ExtraMode) -> ArchEntry {
    ArchEntry {
        name,
        arch,
        mode,
        extra: Some(extra),
        endian: Endian::Little,
    }
}

const fn big(name: &'static str, arch: Arch, mode: Mode) -> ArchEntry {
    ArchEntry {
        name,
        arch,
        mode,
        extra: None,
        endian: Endian::Big,
    }
}

/// Every known variant, grouped by architecture in registry order.
const VARIANTS: &[ArchEntry] = &[
    entry("arm", Arch::ARM, Mode::Arm),
    entry("arm-thumb", Arch::ARM, Mode::Thumb),
    extra("arm-v8", Arch::ARM, Mode::Arm, ExtraMode::V8),
    extra("arm-mclass", Arch::ARM, Mode::Thumb, ExtraMode::MClass),
    entry("arm64", Arch::ARM64, Mode::Arm),
    entry("mips", Arch::MIPS, Mode::Mips32),
    extra("mips-micro", Arch::MIPS, Mode::Mips32, ExtraMode::Micro),
    entry("mips-3", Arch::MIPS, Mode::Mips3),
    entry("mips-32r6", Arch::MIPS, Mode::Mips32R6),
    entry("mips-2", Arch::MIPS, Mode::Mips2),
    entry("mips-32", Arch::MIPS, Mode::Mips32),
    entry("mips-64", Arch::MIPS, Mode::Mips64),
    entry("x86", Arch::X86, Mode::Mode32),
    entry("x86-16", Arch::X86, Mode::Mode16),
    entry("x86-32", Arch::X86, Mode::Mode32),
    entry("x86-64", Arch::X86, Mode::Mode64),
    big("ppc", Arch::PPC, Mode::Mode32),
    big("ppc-64", Arch::PPC, Mode::Mode64),
    big("sparc", Arch::SPARC, Mode::Default),
    big("sparc-v9", Arch::SPARC, Mode::V9),
    big("sysz", Arch::SYSZ, Mode::Default),
    entry("xcore", Arch::XCORE, Mode::Default),
    entry("riscv-32", Arch::RISCV, Mode::RiscV32),
    entry("riscv-64", Arch::RISCV, Mode::RiscV64),
];

/// The table of variants usable with the linked disassembler.
#[derive(Debug, Clone)]
pub struct ArchRegistry {
    entries: Vec<ArchEntry>,
}

impl ArchRegistry {
    /// Build the table keeping only architectures for which `supported`
    /// returns true.
    pub fn build<F: Fn(Arch) -> bool>(supported: F) -> Self {
        let entries: Vec<ArchEntry> = VARIANTS
            .iter()
            .filter(|e| supported(e.arch))
            .copied()
            .collect();

        log::debug!("architecture registry holds {} variants", entries.len());
        Self { entries }
    }

    /// Table filtered by what the capstone build was compiled with.
    pub fn supported() -> Self {
        Self::build(Capstone::supports_arch)
    }

    pub fn entries(&self) -> &[ArchEntry] {
        &self.entries
    }

    /// Exact, case-sensitive lookup by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ArchEntry> {
        self.find(name).map(|i| &self.entries[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Names laid out five per line, for usage output.
    pub fn listing(&self) -> String {
        self.entries
            .chunks(5)
            .map(|row| {
                let names: Vec<_> = row.iter().map(|e| e.name).collect();
                format!("\t{}", names.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
