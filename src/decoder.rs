//! Capstone-backed implementation of the [`Disassembler`] collaborator.

use std::fmt;

use capstone::{Arch, Capstone, Insn as CsInsn, InsnGroupId};
use clap::ValueEnum;

use crate::registry::ArchEntry;
use crate::{Address, DecodeError, Disassembler, Insn};

/// Assembly syntax flavour. Only x86 distinguishes the two; other
/// architectures keep their native syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Syntax {
    /// AT&T syntax
    #[default]
    #[value(name = "at&t")]
    Att,
    /// Intel syntax
    Intel,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Att => write!(f, "at&t"),
            Syntax::Intel => write!(f, "intel"),
        }
    }
}

/// Options applied to a freshly opened handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderOptions {
    /// Collect group information for every instruction
    pub detail: bool,
    pub syntax: Syntax,
}

/// A capstone handle configured for one registry entry.
pub struct CapstoneDecoder {
    cs: Capstone,
    entry: ArchEntry,
    detail: bool,
}

impl CapstoneDecoder {
    /// Open a handle for `entry` and apply `options`.
    pub fn open(entry: &ArchEntry, options: DecoderOptions) -> Result<Self, DecodeError> {
        let mut cs = Capstone::new_raw(
            entry.arch,
            entry.mode,
            entry.extra.into_iter(),
            Some(entry.endian),
        )
        .map_err(|e| DecodeError::EngineInit(format!("{} ({})", e, entry.name)))?;

        cs.set_detail(options.detail)
            .map_err(|e| DecodeError::EngineInit(format!("detail option: {}", e)))?;

        if entry.arch == Arch::X86 {
            let syntax = match options.syntax {
                Syntax::Att => capstone::Syntax::Att,
                Syntax::Intel => capstone::Syntax::Intel,
            };
            if let Err(e) = cs.set_syntax(syntax) {
                log::warn!("{} rejected syntax {}: {}", entry.name, options.syntax, e);
            }
        }

        log::info!(
            "opened capstone handle for {} (detail: {}, syntax: {})",
            entry.name,
            options.detail,
            options.syntax
        );

        Ok(Self {
            cs,
            entry: *entry,
            detail: options.detail,
        })
    }

    pub fn entry(&self) -> &ArchEntry {
        &self.entry
    }

    fn convert(&self, raw: &CsInsn<'_>) -> Insn {
        let insn = Insn::new(
            raw.address(),
            raw.bytes(),
            raw.mnemonic().unwrap_or(""),
            raw.op_str().unwrap_or(""),
        );

        if !self.detail {
            return insn;
        }

        match self.cs.insn_detail(raw) {
            Ok(detail) => {
                let groups: Vec<u8> = detail.groups().iter().map(|g| g.0).collect();
                insn.with_groups(&groups)
            }
            Err(e) => {
                log::debug!("no detail for insn at 0x{:x}: {}", raw.address(), e);
                insn
            }
        }
    }
}

impl fmt::Debug for CapstoneDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapstoneDecoder")
            .field("arch", &self.entry.name)
            .field("detail", &self.detail)
            .finish()
    }
}

impl Disassembler for CapstoneDecoder {
    fn disassemble(&mut self, code: &[u8], start: Address) -> Vec<Insn> {
        let insns = match self.cs.disasm_all(code, start) {
            Ok(insns) => insns,
            Err(e) => {
                log::warn!("disassembly at 0x{:x} failed: {}", start, e);
                return Vec::new();
            }
        };

        insns.iter().map(|raw| self.convert(&raw)).collect()
    }

    fn group_name(&self, group: u8) -> Option<String> {
        self.cs.group_name(InsnGroupId(group))
    }
}
