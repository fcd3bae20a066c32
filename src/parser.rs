//! Goblin-based locator for the code bytes of an input file.
//!
//! Executable containers (ELF, PE, Mach-O) are searched for their main code
//! section; anything else is treated as a raw blob loaded at address zero.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use goblin::mach::{constants::cputype, Mach, MachO};
use goblin::{elf, pe, Object};

use crate::Address;

/// Delay between read attempts in retry mode
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Errors raised while reading the input file
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("couldn't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} is empty")]
    Empty(PathBuf),
}

/// Container format the code bytes were taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Elf,
    Pe,
    MachO,
    Raw,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Elf => write!(f, "ELF"),
            Container::Pe => write!(f, "PE"),
            Container::MachO => write!(f, "Mach-O"),
            Container::Raw => write!(f, "raw"),
        }
    }
}

/// Bytes to disassemble and the address of the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion<'a> {
    pub data: &'a [u8],
    pub base: Address,
    pub container: Container,
    /// Section name, when taken from a container
    pub section: Option<String>,
    /// Registry name matching the container's machine type
    pub arch_hint: Option<&'static str>,
}

impl<'a> CodeRegion<'a> {
    /// The whole buffer at address zero.
    pub fn raw(data: &'a [u8]) -> Self {
        Self {
            data,
            base: 0,
            container: Container::Raw,
            section: None,
            arch_hint: None,
        }
    }
}

/// Finds the code section of executable containers via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    pub fn new() -> Self {
        GoblinParser
    }

    /// Locate the code in `data`, falling back to the raw buffer when the
    /// format is unknown or holds no usable code section.
    pub fn parse<'a>(&self, data: &'a [u8]) -> CodeRegion<'a> {
        let region = match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.parse_elf(&elf, data),
            Ok(Object::PE(pe)) => self.parse_pe(&pe, data),
            Ok(Object::Mach(Mach::Binary(macho))) => self.parse_macho(&macho),
            Ok(Object::Mach(Mach::Fat(_))) => {
                log::info!("fat Mach-O archives are not unpacked, using raw bytes");
                None
            }
            Ok(_) => None,
            Err(e) => {
                log::debug!("not an executable container: {}", e);
                None
            }
        };

        match region {
            Some(region) => {
                log::info!(
                    "{} section {} at 0x{:x} ({} bytes)",
                    region.container,
                    region.section.as_deref().unwrap_or("?"),
                    region.base,
                    region.data.len()
                );
                region
            }
            None => CodeRegion::raw(data),
        }
    }

    fn parse_elf<'a>(&self, elf: &elf::Elf<'_>, data: &'a [u8]) -> Option<CodeRegion<'a>> {
        let arch_hint = match elf.header.e_machine {
            elf::header::EM_386 => Some("x86-32"),
            elf::header::EM_X86_64 => Some("x86-64"),
            elf::header::EM_ARM => Some("arm"),
            elf::header::EM_AARCH64 => Some("arm64"),
            elf::header::EM_MIPS => Some("mips"),
            elf::header::EM_PPC => Some("ppc"),
            elf::header::EM_PPC64 => Some("ppc-64"),
            elf::header::EM_RISCV => match elf.header.e_ident[elf::header::EI_CLASS] {
                elf::header::ELFCLASS32 => Some("riscv-32"),
                elf::header::ELFCLASS64 => Some("riscv-64"),
                _ => None,
            },
            _ => None,
        };

        let name_of = |sh: &elf::SectionHeader| elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("");
        let executable: Vec<_> = elf
            .section_headers
            .iter()
            .filter(|sh| sh.is_executable() && sh.sh_size > 0)
            .collect();
        let sh = executable
            .iter()
            .find(|sh| name_of(**sh) == ".text")
            .or_else(|| executable.first())?;

        let bytes = data.get(sh.file_range()?)?;
        Some(CodeRegion {
            data: bytes,
            base: sh.sh_addr,
            container: Container::Elf,
            section: Some(name_of(*sh).to_string()),
            arch_hint,
        })
    }

    fn parse_pe<'a>(&self, pe: &pe::PE<'_>, data: &'a [u8]) -> Option<CodeRegion<'a>> {
        let arch_hint = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Some("x86-32"),
            pe::header::COFF_MACHINE_X86_64 => Some("x86-64"),
            pe::header::COFF_MACHINE_ARM => Some("arm"),
            pe::header::COFF_MACHINE_ARM64 => Some("arm64"),
            _ => None,
        };

        let executable: Vec<_> = pe
            .sections
            .iter()
            .filter(|s| s.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE != 0)
            .filter(|s| s.size_of_raw_data > 0)
            .collect();
        let sect = executable
            .iter()
            .find(|s| s.name().map(|n| n.eq_ignore_ascii_case(".text")).unwrap_or(false))
            .or_else(|| executable.first())?;

        // raw data is padded to the file alignment
        let mut size = sect.size_of_raw_data as usize;
        if sect.virtual_size > 0 {
            size = size.min(sect.virtual_size as usize);
        }
        let start = sect.pointer_to_raw_data as usize;
        let bytes = data.get(start..start.checked_add(size)?)?;

        Some(CodeRegion {
            data: bytes,
            base: pe.image_base as Address + sect.virtual_address as Address,
            container: Container::Pe,
            section: sect.name().ok().map(str::to_string),
            arch_hint,
        })
    }

    fn parse_macho<'a>(&self, macho: &MachO<'a>) -> Option<CodeRegion<'a>> {
        let arch_hint = match macho.header.cputype {
            cputype::CPU_TYPE_I386 => Some("x86-32"),
            cputype::CPU_TYPE_X86_64 => Some("x86-64"),
            cputype::CPU_TYPE_ARM => Some("arm"),
            cputype::CPU_TYPE_ARM64 => Some("arm64"),
            _ => None,
        };

        for segment in &macho.segments {
            let sections = match segment.sections() {
                Ok(sections) => sections,
                Err(e) => {
                    log::warn!("skipping unreadable Mach-O segment: {}", e);
                    continue;
                }
            };

            for (section, bytes) in sections {
                if section.name().ok() == Some("__text") && !bytes.is_empty() {
                    return Some(CodeRegion {
                        data: bytes,
                        base: section.addr,
                        container: Container::MachO,
                        section: Some("__text".to_string()),
                        arch_hint,
                    });
                }
            }
        }

        None
    }
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}

/// Read the whole input file.
///
/// With `retry` set, failures (including an empty file) are logged and the
/// read is attempted again every `interval` until it succeeds.
pub fn read_input(path: &Path, retry: bool, interval: Duration) -> Result<Vec<u8>, LoadError> {
    loop {
        let result = match std::fs::read(path) {
            Ok(bytes) if bytes.is_empty() => Err(LoadError::Empty(path.to_path_buf())),
            Ok(bytes) => return Ok(bytes),
            Err(source) => Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            }),
        };

        match result {
            Err(e) if retry => {
                log::warn!("{}, retrying in {:?}", e, interval);
                thread::sleep(interval);
            }
            other => return other,
        }
    }
}
