//! Minimal ELF inspection: is an executable statically linked?
//!
//! A binary counts as static when it has no `PT_INTERP` program header and
//! its dynamic section (static-pie binaries still carry one) lists no
//! `DT_NEEDED` libraries.

use std::fs;
use std::path::Path;
use thiserror::Error;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;

#[derive(Error, Debug)]
pub enum ElfError {
    #[error("not an ELF file")]
    NotElf,
    #[error("unsupported ELF class or byte order")]
    Unsupported,
    #[error("not an executable (e_type {0})")]
    NotExecutable(u16),
    #[error("truncated ELF: {0}")]
    Truncated(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Linkage of an ELF executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Linkage {
    Static,
    Dynamic {
        interpreter: Option<String>,
        needed: usize,
    },
}

impl Linkage {
    pub fn is_static(&self) -> bool {
        matches!(self, Linkage::Static)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    wide: bool,
    little: bool,
}

impl Reader<'_> {
    fn slice(&self, offset: u64, len: u64, what: &'static str) -> Result<&[u8], ElfError> {
        let start = usize::try_from(offset).map_err(|_| ElfError::Truncated(what))?;
        let len = usize::try_from(len).map_err(|_| ElfError::Truncated(what))?;
        let end = start.checked_add(len).ok_or(ElfError::Truncated(what))?;
        self.bytes.get(start..end).ok_or(ElfError::Truncated(what))
    }

    fn u16(&self, offset: u64) -> Result<u16, ElfError> {
        let b: [u8; 2] = self.slice(offset, 2, "u16")?.try_into().map_err(|_| ElfError::Truncated("u16"))?;
        Ok(if self.little { u16::from_le_bytes(b) } else { u16::from_be_bytes(b) })
    }

    fn u32(&self, offset: u64) -> Result<u32, ElfError> {
        let b: [u8; 4] = self.slice(offset, 4, "u32")?.try_into().map_err(|_| ElfError::Truncated("u32"))?;
        Ok(if self.little { u32::from_le_bytes(b) } else { u32::from_be_bytes(b) })
    }

    fn u64(&self, offset: u64) -> Result<u64, ElfError> {
        let b: [u8; 8] = self.slice(offset, 8, "u64")?.try_into().map_err(|_| ElfError::Truncated("u64"))?;
        Ok(if self.little { u64::from_le_bytes(b) } else { u64::from_be_bytes(b) })
    }

    /// Address-sized field.
    fn word(&self, offset: u64) -> Result<u64, ElfError> {
        if self.wide {
            self.u64(offset)
        } else {
            self.u32(offset).map(u64::from)
        }
    }
}

/// Determine the linkage of an in-memory ELF image.
pub fn linkage(bytes: &[u8]) -> Result<Linkage, ElfError> {
    if bytes.len() < 16 || &bytes[..4] != ELF_MAGIC {
        return Err(ElfError::NotElf);
    }
    let wide = match bytes[4] {
        ELFCLASS32 => false,
        ELFCLASS64 => true,
        _ => return Err(ElfError::Unsupported),
    };
    let little = match bytes[5] {
        ELFDATA2LSB => true,
        ELFDATA2MSB => false,
        _ => return Err(ElfError::Unsupported),
    };
    let r = Reader { bytes, wide, little };

    let e_type = r.u16(16)?;
    if e_type != ET_EXEC && e_type != ET_DYN {
        return Err(ElfError::NotExecutable(e_type));
    }

    let (phoff, phentsize, phnum) = if wide {
        (r.u64(32)?, r.u16(54)?, r.u16(56)?)
    } else {
        (u64::from(r.u32(28)?), r.u16(42)?, r.u16(44)?)
    };

    let mut interpreter = None;
    let mut needed = 0;

    for i in 0..u64::from(phnum) {
        let ph = phoff + i * u64::from(phentsize);
        let p_type = r.u32(ph)?;
        // Offset/size field positions differ between the two classes.
        let (p_offset, p_filesz) = if wide {
            (r.u64(ph + 8)?, r.u64(ph + 32)?)
        } else {
            (u64::from(r.u32(ph + 4)?), u64::from(r.u32(ph + 16)?))
        };

        match p_type {
            PT_INTERP => {
                let raw = r.slice(p_offset, p_filesz, "interpreter")?;
                let path = raw.split(|b| *b == 0).next().unwrap_or_default();
                interpreter = Some(String::from_utf8_lossy(path).into_owned());
            }
            PT_DYNAMIC => {
                let entsize = if wide { 16 } else { 8 };
                let half = entsize / 2;
                for j in 0..p_filesz / entsize {
                    let tag = r.word(p_offset + j * entsize)?;
                    if tag == DT_NULL {
                        break;
                    }
                    if tag == DT_NEEDED {
                        needed += 1;
                    }
                    // d_val is not needed, but must be in bounds.
                    r.word(p_offset + j * entsize + half)?;
                }
            }
            _ => {}
        }
    }

    if interpreter.is_none() && needed == 0 {
        Ok(Linkage::Static)
    } else {
        Ok(Linkage::Dynamic {
            interpreter,
            needed,
        })
    }
}

/// Determine the linkage of an ELF file on disk.
pub fn file_linkage(path: &Path) -> Result<Linkage, ElfError> {
    let bytes = fs::read(path)?;
    linkage(&bytes)
}
