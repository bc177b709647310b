//! Support for the Executable and Linkable Format, used on Linux.
//!
//! [`ElfObject`] parses the file header, the program header table, and the
//! section header table of an ELF file. All four on-disk encodings (32- and
//! 64-bit class, little- and big-endian data) canonicalize into the same
//! 64-bit native-endian records, so downstream code never dispatches on the
//! encoding again. Section and segment payloads are borrowed slices into the
//! original buffer; nothing is copied.

use std::error::Error;
use std::fmt;

use thiserror::Error;

mod raw;

pub use raw::*;

/// The kind of an [`ElfError`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Error)]
pub enum ElfErrorKind {
    /// The buffer does not start with `\x7fELF`.
    #[error("bad ELF magic number")]
    BadMagic,
    /// The identification block declares an unknown file class.
    #[error("bad ELF class {0}")]
    BadClass(u8),
    /// The identification block declares an unknown data encoding.
    #[error("bad ELF data encoding {0}")]
    BadEncoding(u8),
    /// The identification block declares an unsupported ELF version.
    #[error("unknown ELF identification version {0}")]
    UnknownIdentVersion(u8),
    /// The file header declares an unsupported ELF version.
    #[error("unknown ELF version {0}")]
    UnknownVersion(u32),
    /// The section name string table index points outside the section table.
    #[error("bad section name string table index {shstrndx} (of {shnum} sections)")]
    BadSectionStringTableIndex {
        /// The declared index.
        shstrndx: u16,
        /// The number of sections in the file.
        shnum: u16,
    },
    /// A header table or string reached past the end of the buffer.
    #[error("file ended prematurely")]
    UnexpectedEof,
    /// A typed projection was requested on a section of the wrong type.
    #[error("cannot use section of type {actual:#x} as {expected}")]
    SectionTypeMismatch {
        /// The projection that was requested.
        expected: &'static str,
        /// The actual section type.
        actual: u32,
    },
    /// A string table entry is not NUL-terminated before the section ends.
    #[error("unterminated string")]
    UnterminatedString,
    /// A string table entry is not valid UTF-8.
    #[error("invalid string data")]
    InvalidString,
    /// A string table offset points outside the table.
    #[error("string offset {0} exceeds section size")]
    StringOffsetOutOfRange(u64),
    /// A symbol index points outside the symbol table.
    #[error("symbol index {0} out of bounds")]
    SymbolIndexOutOfRange(usize),
}

/// An error encountered while parsing an ELF file.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct ElfError {
    kind: ElfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ElfError {
    fn new<E>(kind: ElfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`ElfErrorKind`] for this error.
    pub fn kind(&self) -> ElfErrorKind {
        self.kind
    }
}

impl From<ElfErrorKind> for ElfError {
    fn from(kind: ElfErrorKind) -> Self {
        Self { kind, source: None }
    }
}

/// An ELF object file with canonicalized headers.
///
/// All headers are decoded eagerly at parse time; section and segment
/// payloads are lazy slices of the input buffer and remain valid for the
/// buffer's lifetime.
pub struct ElfObject<'data> {
    data: &'data [u8],
    class: Class,
    encoding: Encoding,
    osabi: u8,
    abiversion: u8,
    header: FileHeader,
    sections: Vec<ElfSection<'data>>,
    segments: Vec<ElfSegment<'data>>,
}

impl<'data> ElfObject<'data> {
    /// Tests whether the buffer could contain an ELF object.
    pub fn test(data: &[u8]) -> bool {
        data.get(..4).map_or(false, |magic| magic == ELF_MAGIC)
    }

    /// Tries to parse an ELF object from the given buffer.
    pub fn parse(data: &'data [u8]) -> Result<Self, ElfError> {
        let ident = data.get(..EI_NIDENT).ok_or(ElfErrorKind::BadMagic)?;
        if ident[..4] != ELF_MAGIC {
            return Err(ElfErrorKind::BadMagic.into());
        }

        let class = Class::from_ident(ident[4])?;
        let encoding = Encoding::from_ident(ident[5])?;
        if ident[6] != 1 {
            return Err(ElfErrorKind::UnknownIdentVersion(ident[6]).into());
        }

        let header = FileHeader::parse(&data[EI_NIDENT..], class, encoding)?;
        if header.version != 1 {
            return Err(ElfErrorKind::UnknownVersion(header.version).into());
        }
        if header.shnum > 0 && header.shstrndx >= header.shnum {
            return Err(ElfErrorKind::BadSectionStringTableIndex {
                shstrndx: header.shstrndx,
                shnum: header.shnum,
            }
            .into());
        }

        let mut obj = ElfObject {
            data,
            class,
            encoding,
            osabi: ident[7],
            abiversion: ident[8],
            header,
            sections: Vec::new(),
            segments: Vec::new(),
        };

        obj.segments = obj.parse_segments()?;
        obj.sections = obj.parse_sections()?;

        Ok(obj)
    }

    fn table_entry(&self, base: u64, stride: u16, index: u16) -> Result<&'data [u8], ElfError> {
        usize::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(stride as usize * index as usize))
            .and_then(|offset| self.data.get(offset..offset.checked_add(stride as usize)?))
            .ok_or_else(|| ElfErrorKind::UnexpectedEof.into())
    }

    fn parse_segments(&self) -> Result<Vec<ElfSegment<'data>>, ElfError> {
        let mut segments = Vec::with_capacity(self.header.phnum as usize);
        for i in 0..self.header.phnum {
            let entry = self.table_entry(self.header.phoff, self.header.phentsize, i)?;
            let header = ProgramHeader::parse(entry, self.class, self.encoding)?;
            let data = slice_payload(self.data, header.offset, header.filesz);
            segments.push(ElfSegment { header, data });
        }
        Ok(segments)
    }

    fn parse_sections(&self) -> Result<Vec<ElfSection<'data>>, ElfError> {
        let mut headers = Vec::with_capacity(self.header.shnum as usize);
        for i in 0..self.header.shnum {
            let entry = self.table_entry(self.header.shoff, self.header.shentsize, i)?;
            headers.push(SectionHeader::parse(entry, self.class, self.encoding)?);
        }

        // Section names all come from the section header string table.
        let shstrtab = match headers.get(self.header.shstrndx as usize) {
            Some(hdr) if self.header.shnum > 0 => Strtab {
                data: slice_payload(self.data, hdr.offset, hdr.size)
                    .ok_or(ElfErrorKind::UnexpectedEof)?,
            },
            _ => Strtab { data: &[] },
        };

        let mut sections = Vec::with_capacity(headers.len());
        for header in headers {
            let data = if header.shtype == SHT_NOBITS {
                None
            } else {
                slice_payload(self.data, header.offset, header.size)
            };
            let name = shstrtab.get(header.name as u64)?;
            sections.push(ElfSection {
                header,
                name,
                data,
                class: self.class,
                encoding: self.encoding,
            });
        }
        Ok(sections)
    }

    /// Returns the file class of this object.
    pub fn class(&self) -> Class {
        self.class
    }

    /// Returns the data encoding of this object.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Returns the OS ABI byte of the identification block.
    pub fn osabi(&self) -> u8 {
        self.osabi
    }

    /// Returns the ABI version byte of the identification block.
    pub fn abiversion(&self) -> u8 {
        self.abiversion
    }

    /// Returns the canonical file header.
    ///
    /// The canonical form is identical for all four on-disk encodings of the
    /// same logical file.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Returns the sections in this file.
    pub fn sections(&self) -> &[ElfSection<'data>] {
        &self.sections
    }

    /// Returns the segments in this file.
    pub fn segments(&self) -> &[ElfSegment<'data>] {
        &self.segments
    }

    /// Returns the section with the given name, or `None` if there is none.
    ///
    /// Performs a linear scan over the section table.
    pub fn section_by_name(&self, name: &str) -> Option<&ElfSection<'data>> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// Returns the section at the given index, or `None` if out of bounds.
    pub fn section(&self, index: usize) -> Option<&ElfSection<'data>> {
        self.sections.get(index)
    }

    /// Returns the segment at the given index, or `None` if out of bounds.
    pub fn segment(&self, index: usize) -> Option<&ElfSegment<'data>> {
        self.segments.get(index)
    }

    /// Returns the size in bytes of a symbol table entry in this file.
    pub fn sym_entry_size(&self) -> usize {
        self.class.sym_size()
    }
}

impl fmt::Debug for ElfObject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElfObject")
            .field("class", &self.class)
            .field("encoding", &self.encoding)
            .field("sections", &self.sections.len())
            .field("segments", &self.segments.len())
            .finish()
    }
}

/// Slices `size` payload bytes at `offset`, if they are inside the buffer.
fn slice_payload(data: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let offset = usize::try_from(offset).ok()?;
    let size = usize::try_from(size).ok()?;
    data.get(offset..offset.checked_add(size)?)
}

/// A section of an ELF file.
#[derive(Clone, Copy)]
pub struct ElfSection<'data> {
    header: SectionHeader,
    name: &'data str,
    data: Option<&'data [u8]>,
    class: Class,
    encoding: Encoding,
}

impl<'data> ElfSection<'data> {
    /// Returns the canonical section header.
    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    /// Returns this section's name.
    pub fn name(&self) -> &'data str {
        self.name
    }

    /// Returns this section's contents.
    ///
    /// Returns `None` for `SHT_NOBITS` sections and for sections whose
    /// declared range reaches past the end of the file.
    pub fn data(&self) -> Option<&'data [u8]> {
        self.data
    }

    /// Returns the size of this section in bytes.
    pub fn size(&self) -> u64 {
        self.header.size
    }

    fn require_data(&self) -> Result<&'data [u8], ElfError> {
        self.data.ok_or_else(|| ElfErrorKind::UnexpectedEof.into())
    }

    /// Returns this section as a string table.
    ///
    /// Fails with a section type mismatch if this is not a `SHT_STRTAB`
    /// section.
    pub fn as_strtab(&self) -> Result<Strtab<'data>, ElfError> {
        if self.header.shtype != SHT_STRTAB {
            return Err(ElfErrorKind::SectionTypeMismatch {
                expected: "strtab",
                actual: self.header.shtype,
            }
            .into());
        }
        Ok(Strtab {
            data: self.require_data()?,
        })
    }

    /// Returns this section as a symbol table.
    ///
    /// The file is consulted for the linked string table. Fails with a
    /// section type mismatch if this is neither a `SHT_SYMTAB` nor a
    /// `SHT_DYNSYM` section.
    pub fn as_symtab(&self, file: &ElfObject<'data>) -> Result<Symtab<'data>, ElfError> {
        if self.header.shtype != SHT_SYMTAB && self.header.shtype != SHT_DYNSYM {
            return Err(ElfErrorKind::SectionTypeMismatch {
                expected: "symtab",
                actual: self.header.shtype,
            }
            .into());
        }
        let strs = match file.section(self.header.link as usize) {
            Some(section) => section.as_strtab()?,
            None => Strtab { data: &[] },
        };
        Ok(Symtab {
            data: self.require_data()?,
            strs,
            class: self.class,
            encoding: self.encoding,
        })
    }

    /// Returns an iterator over the `Rel` entries of this section.
    ///
    /// Fails with a section type mismatch if this is not a `SHT_REL`
    /// section.
    pub fn rels(&self) -> Result<RelIter<'data>, ElfError> {
        if self.header.shtype != SHT_REL {
            return Err(ElfErrorKind::SectionTypeMismatch {
                expected: "rel",
                actual: self.header.shtype,
            }
            .into());
        }
        Ok(RelIter {
            data: self.require_data()?,
            class: self.class,
            encoding: self.encoding,
        })
    }

    /// Returns an iterator over the `Rela` entries of this section.
    ///
    /// Fails with a section type mismatch if this is not a `SHT_RELA`
    /// section.
    pub fn relas(&self) -> Result<RelaIter<'data>, ElfError> {
        if self.header.shtype != SHT_RELA {
            return Err(ElfErrorKind::SectionTypeMismatch {
                expected: "rela",
                actual: self.header.shtype,
            }
            .into());
        }
        Ok(RelaIter {
            data: self.require_data()?,
            class: self.class,
            encoding: self.encoding,
        })
    }
}

impl fmt::Debug for ElfSection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElfSection")
            .field("name", &self.name)
            .field("shtype", &self.header.shtype)
            .field("offset", &format_args!("{:#x}", self.header.offset))
            .field("size", &format_args!("{:#x}", self.header.size))
            .finish()
    }
}

/// A segment of an ELF file.
#[derive(Clone, Copy)]
pub struct ElfSegment<'data> {
    header: ProgramHeader,
    data: Option<&'data [u8]>,
}

impl<'data> ElfSegment<'data> {
    /// Returns the canonical program header.
    pub fn header(&self) -> &ProgramHeader {
        &self.header
    }

    /// Returns this segment's contents, `file_size()` bytes long.
    ///
    /// Returns `None` if the declared range reaches past the end of the
    /// file.
    pub fn data(&self) -> Option<&'data [u8]> {
        self.data
    }

    /// Returns the on-disk size of this segment in bytes.
    pub fn file_size(&self) -> u64 {
        self.header.filesz
    }

    /// Returns the in-memory size of this segment in bytes.
    ///
    /// Bytes between `file_size()` and `mem_size()` are implicitly zero.
    pub fn mem_size(&self) -> u64 {
        self.header.memsz
    }
}

impl fmt::Debug for ElfSegment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElfSegment")
            .field("ptype", &self.header.ptype)
            .field("offset", &format_args!("{:#x}", self.header.offset))
            .field("filesz", &format_args!("{:#x}", self.header.filesz))
            .finish()
    }
}

/// An ELF string table.
#[derive(Clone, Copy, Debug)]
pub struct Strtab<'data> {
    data: &'data [u8],
}

impl<'data> Strtab<'data> {
    /// Returns the string at the given offset in this table.
    ///
    /// The returned slice points directly into the loaded section. An offset
    /// past the end of the table and a string without a NUL terminator are
    /// both errors.
    pub fn get(&self, offset: u64) -> Result<&'data str, ElfError> {
        if offset == 0 && self.data.is_empty() {
            return Ok("");
        }
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.data.len())
            .ok_or(ElfErrorKind::StringOffsetOutOfRange(offset))?;

        let tail = &self.data[start..];
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(ElfErrorKind::UnterminatedString)?;
        std::str::from_utf8(&tail[..len])
            .map_err(|e| ElfError::new(ElfErrorKind::InvalidString, e))
    }
}

/// An ELF symbol table with its linked string table.
#[derive(Clone, Copy, Debug)]
pub struct Symtab<'data> {
    data: &'data [u8],
    strs: Strtab<'data>,
    class: Class,
    encoding: Encoding,
}

impl<'data> Symtab<'data> {
    /// Returns the number of symbols in this table.
    pub fn len(&self) -> usize {
        self.data.len() / self.class.sym_size()
    }

    /// Returns `true` if this table holds no symbols.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the symbol at the given index.
    pub fn get(&self, index: usize) -> Result<ElfSymbol<'data>, ElfError> {
        let stride = self.class.sym_size();
        let entry = self
            .data
            .get(index * stride..(index + 1) * stride)
            .ok_or(ElfErrorKind::SymbolIndexOutOfRange(index))?;
        Ok(ElfSymbol {
            sym: Sym::parse(entry, self.class, self.encoding)?,
            strs: self.strs,
        })
    }

    /// Returns an iterator over the symbols in this table.
    pub fn iter(&self) -> SymbolIter<'data> {
        SymbolIter {
            tab: *self,
            index: 0,
        }
    }
}

impl<'data> IntoIterator for &Symtab<'data> {
    type Item = ElfSymbol<'data>;
    type IntoIter = SymbolIter<'data>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the symbols of a [`Symtab`].
#[derive(Clone, Debug)]
pub struct SymbolIter<'data> {
    tab: Symtab<'data>,
    index: usize,
}

impl<'data> Iterator for SymbolIter<'data> {
    type Item = ElfSymbol<'data>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.tab.len() {
            return None;
        }
        let symbol = self.tab.get(self.index).ok()?;
        self.index += 1;
        Some(symbol)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.tab.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

/// A symbol from a symbol table.
#[derive(Clone, Copy, Debug)]
pub struct ElfSymbol<'data> {
    sym: Sym,
    strs: Strtab<'data>,
}

impl<'data> ElfSymbol<'data> {
    /// Returns this symbol's canonical record.
    pub fn raw(&self) -> &Sym {
        &self.sym
    }

    /// Returns this symbol's name from the linked string table.
    ///
    /// The returned slice points directly into the string table section.
    pub fn name(&self) -> Result<&'data str, ElfError> {
        self.strs.get(self.sym.name as u64)
    }

    /// Returns the binding half of the info field (`STB_*`).
    pub fn binding(&self) -> u8 {
        self.sym.info >> 4
    }

    /// Returns the type half of the info field (`STT_*`).
    pub fn symbol_type(&self) -> u8 {
        self.sym.info & 0xf
    }

    /// Returns the symbol value, usually an address.
    pub fn value(&self) -> u64 {
        self.sym.value
    }

    /// Returns the symbol size in bytes.
    pub fn size(&self) -> u64 {
        self.sym.size
    }
}

/// An iterator over the entries of a `SHT_REL` section.
#[derive(Clone, Debug)]
pub struct RelIter<'data> {
    data: &'data [u8],
    class: Class,
    encoding: Encoding,
}

impl Iterator for RelIter<'_> {
    type Item = Rel;

    fn next(&mut self) -> Option<Self::Item> {
        let stride = self.class.rel_size();
        if self.data.len() < stride {
            return None;
        }
        let entry = Rel::parse(&self.data[..stride], self.class, self.encoding).ok()?;
        self.data = &self.data[stride..];
        Some(entry)
    }
}

/// An iterator over the entries of a `SHT_RELA` section.
#[derive(Clone, Debug)]
pub struct RelaIter<'data> {
    data: &'data [u8],
    class: Class,
    encoding: Encoding,
}

impl Iterator for RelaIter<'_> {
    type Item = Rela;

    fn next(&mut self) -> Option<Self::Item> {
        let stride = self.class.rela_size();
        if self.data.len() < stride {
            return None;
        }
        let entry = Rela::parse(&self.data[..stride], self.class, self.encoding).ok()?;
        self.data = &self.data[stride..];
        Some(entry)
    }
}

/// Returns a printable name for a symbol binding, if it is a well-known one.
pub fn symbol_binding_name(binding: u8) -> Option<&'static str> {
    Some(match binding {
        0 => "LOCAL",
        1 => "GLOBAL",
        2 => "WEAK",
        _ => return None,
    })
}

/// Returns a printable name for a symbol type, if it is a well-known one.
pub fn symbol_type_name(symbol_type: u8) -> Option<&'static str> {
    Some(match symbol_type {
        0 => "NOTYPE",
        1 => "OBJECT",
        2 => "FUNC",
        3 => "SECTION",
        4 => "FILE",
        5 => "COMMON",
        6 => "TLS",
        _ => return None,
    })
}
