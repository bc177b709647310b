//! On-disk ELF record layouts and their canonical in-memory form.
//!
//! Every ELF structure exists in four encodings: 32- or 64-bit class times
//! little- or big-endian data. All of them decode into a single canonical
//! record with 64-bit-wide fields in native byte order. Each record type has
//! exactly one decoder, parameterized by [`Class`] and [`Encoding`]; the
//! class-dependent field orders of `Phdr` and `Sym` are handled inside that
//! decoder rather than by per-variant copies.

use super::{ElfError, ElfErrorKind};

/// The four magic bytes at the start of every ELF file.
pub const ELF_MAGIC: [u8; 4] = *b"\x7fELF";

/// Size of the identification block preceding the file header fields.
pub const EI_NIDENT: usize = 16;

/// Section type: inactive header.
pub const SHT_NULL: u32 = 0;
/// Section type: program-defined contents.
pub const SHT_PROGBITS: u32 = 1;
/// Section type: symbol table.
pub const SHT_SYMTAB: u32 = 2;
/// Section type: string table.
pub const SHT_STRTAB: u32 = 3;
/// Section type: relocations with explicit addends.
pub const SHT_RELA: u32 = 4;
/// Section type: symbol hash table.
pub const SHT_HASH: u32 = 5;
/// Section type: dynamic linking information.
pub const SHT_DYNAMIC: u32 = 6;
/// Section type: notes.
pub const SHT_NOTE: u32 = 7;
/// Section type: occupies no file space.
pub const SHT_NOBITS: u32 = 8;
/// Section type: relocations without addends.
pub const SHT_REL: u32 = 9;
/// Section type: dynamic linker symbol table.
pub const SHT_DYNSYM: u32 = 11;

/// Segment type: unused entry.
pub const PT_NULL: u32 = 0;
/// Segment type: loadable segment.
pub const PT_LOAD: u32 = 1;
/// Segment type: dynamic linking information.
pub const PT_DYNAMIC: u32 = 2;
/// Segment type: interpreter path.
pub const PT_INTERP: u32 = 3;
/// Segment type: auxiliary information.
pub const PT_NOTE: u32 = 4;
/// Segment type: reserved.
pub const PT_SHLIB: u32 = 5;
/// Segment type: the program header table itself.
pub const PT_PHDR: u32 = 6;
/// Segment type: thread-local storage template.
pub const PT_TLS: u32 = 7;

/// The file class of an ELF object: 32- or 64-bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Class {
    /// `ELFCLASS32`.
    Elf32,
    /// `ELFCLASS64`.
    Elf64,
}

impl Class {
    pub(crate) fn from_ident(value: u8) -> Result<Self, ElfError> {
        match value {
            1 => Ok(Class::Elf32),
            2 => Ok(Class::Elf64),
            _ => Err(ElfErrorKind::BadClass(value).into()),
        }
    }

    /// Size in bytes of a symbol table entry of this class.
    pub fn sym_size(self) -> usize {
        match self {
            Class::Elf32 => 16,
            Class::Elf64 => 24,
        }
    }

    /// Size in bytes of a `Rel` entry of this class.
    pub fn rel_size(self) -> usize {
        match self {
            Class::Elf32 => 8,
            Class::Elf64 => 16,
        }
    }

    /// Size in bytes of a `Rela` entry of this class.
    pub fn rela_size(self) -> usize {
        match self {
            Class::Elf32 => 12,
            Class::Elf64 => 24,
        }
    }

    /// The shift separating the symbol index from the relocation type in the
    /// `r_info` field.
    pub fn rel_sym_shift(self) -> u32 {
        match self {
            Class::Elf32 => 8,
            Class::Elf64 => 32,
        }
    }

    /// The mask extracting the relocation type from the `r_info` field.
    pub fn rel_type_mask(self) -> u64 {
        match self {
            Class::Elf32 => 0xff,
            Class::Elf64 => 0xffff_ffff,
        }
    }
}

/// The data encoding of an ELF object: little- or big-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// `ELFDATA2LSB`.
    Lsb,
    /// `ELFDATA2MSB`.
    Msb,
}

impl Encoding {
    pub(crate) fn from_ident(value: u8) -> Result<Self, ElfError> {
        match value {
            1 => Ok(Encoding::Lsb),
            2 => Ok(Encoding::Msb),
            _ => Err(ElfErrorKind::BadEncoding(value).into()),
        }
    }
}

/// A bounds-checked, endian-aware reader over raw ELF bytes.
pub(crate) struct Reader<'data> {
    data: &'data [u8],
    pos: usize,
    encoding: Encoding,
}

impl<'data> Reader<'data> {
    pub fn new(data: &'data [u8], encoding: Encoding) -> Self {
        Reader {
            data,
            pos: 0,
            encoding,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'data [u8], ElfError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + len)
            .ok_or(ElfErrorKind::UnexpectedEof)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8, ElfError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, ElfError> {
        let bytes = self.take(2)?.try_into().unwrap();
        Ok(match self.encoding {
            Encoding::Lsb => u16::from_le_bytes(bytes),
            Encoding::Msb => u16::from_be_bytes(bytes),
        })
    }

    pub fn u32(&mut self) -> Result<u32, ElfError> {
        let bytes = self.take(4)?.try_into().unwrap();
        Ok(match self.encoding {
            Encoding::Lsb => u32::from_le_bytes(bytes),
            Encoding::Msb => u32::from_be_bytes(bytes),
        })
    }

    pub fn u64(&mut self) -> Result<u64, ElfError> {
        let bytes = self.take(8)?.try_into().unwrap();
        Ok(match self.encoding {
            Encoding::Lsb => u64::from_le_bytes(bytes),
            Encoding::Msb => u64::from_be_bytes(bytes),
        })
    }

    /// Reads a class-sized address or offset, widened to 64 bits.
    pub fn addr(&mut self, class: Class) -> Result<u64, ElfError> {
        match class {
            Class::Elf32 => Ok(self.u32()? as u64),
            Class::Elf64 => self.u64(),
        }
    }
}

/// The canonical ELF file header.
///
/// Identification bytes (class, encoding, OS ABI) live on
/// [`ElfObject`](super::ElfObject); the canonical header itself is identical
/// for all four on-disk encodings of the same logical file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// Object file type (`ET_*`).
    pub etype: u16,
    /// Target machine (`EM_*`).
    pub machine: u16,
    /// Object file version; must be 1.
    pub version: u32,
    /// Entry point virtual address.
    pub entry: u64,
    /// File offset of the program header table.
    pub phoff: u64,
    /// File offset of the section header table.
    pub shoff: u64,
    /// Processor-specific flags.
    pub flags: u32,
    /// Size of this header on disk.
    pub ehsize: u16,
    /// Size of one program header table entry.
    pub phentsize: u16,
    /// Number of program header table entries.
    pub phnum: u16,
    /// Size of one section header table entry.
    pub shentsize: u16,
    /// Number of section header table entries.
    pub shnum: u16,
    /// Section header table index of the section name string table.
    pub shstrndx: u16,
}

impl FileHeader {
    /// Decodes the fields following the identification block.
    pub(crate) fn parse(
        data: &[u8],
        class: Class,
        encoding: Encoding,
    ) -> Result<Self, ElfError> {
        let mut r = Reader::new(data, encoding);
        Ok(FileHeader {
            etype: r.u16()?,
            machine: r.u16()?,
            version: r.u32()?,
            entry: r.addr(class)?,
            phoff: r.addr(class)?,
            shoff: r.addr(class)?,
            flags: r.u32()?,
            ehsize: r.u16()?,
            phentsize: r.u16()?,
            phnum: r.u16()?,
            shentsize: r.u16()?,
            shnum: r.u16()?,
            shstrndx: r.u16()?,
        })
    }
}

/// The canonical program header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramHeader {
    /// Segment type (`PT_*`).
    pub ptype: u32,
    /// Segment flags (`PF_*`).
    pub flags: u32,
    /// File offset of the segment contents.
    pub offset: u64,
    /// Virtual address of the segment in memory.
    pub vaddr: u64,
    /// Physical address, where relevant.
    pub paddr: u64,
    /// Size of the segment in the file.
    pub filesz: u64,
    /// Size of the segment in memory.
    pub memsz: u64,
    /// Alignment constraint.
    pub align: u64,
}

impl ProgramHeader {
    pub(crate) fn parse(
        data: &[u8],
        class: Class,
        encoding: Encoding,
    ) -> Result<Self, ElfError> {
        let mut r = Reader::new(data, encoding);
        let mut hdr = ProgramHeader {
            ptype: r.u32()?,
            ..Default::default()
        };

        // The flags field moved between the 32- and 64-bit layouts.
        match class {
            Class::Elf32 => {
                hdr.offset = r.addr(class)?;
                hdr.vaddr = r.addr(class)?;
                hdr.paddr = r.addr(class)?;
                hdr.filesz = r.addr(class)?;
                hdr.memsz = r.addr(class)?;
                hdr.flags = r.u32()?;
                hdr.align = r.addr(class)?;
            }
            Class::Elf64 => {
                hdr.flags = r.u32()?;
                hdr.offset = r.addr(class)?;
                hdr.vaddr = r.addr(class)?;
                hdr.paddr = r.addr(class)?;
                hdr.filesz = r.addr(class)?;
                hdr.memsz = r.addr(class)?;
                hdr.align = r.addr(class)?;
            }
        }

        Ok(hdr)
    }
}

/// The canonical section header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectionHeader {
    /// Offset of the section name in the section name string table.
    pub name: u32,
    /// Section type (`SHT_*`).
    pub shtype: u32,
    /// Section flags (`SHF_*`).
    pub flags: u64,
    /// Virtual address of the section in memory, or 0.
    pub addr: u64,
    /// File offset of the section contents.
    pub offset: u64,
    /// Size of the section in bytes.
    pub size: u64,
    /// Section-type-specific link to another section.
    pub link: u32,
    /// Section-type-specific extra information.
    pub info: u32,
    /// Alignment constraint.
    pub addralign: u64,
    /// Entry size for sections holding fixed-size records, or 0.
    pub entsize: u64,
}

impl SectionHeader {
    pub(crate) fn parse(
        data: &[u8],
        class: Class,
        encoding: Encoding,
    ) -> Result<Self, ElfError> {
        let mut r = Reader::new(data, encoding);
        Ok(SectionHeader {
            name: r.u32()?,
            shtype: r.u32()?,
            flags: r.addr(class)?,
            addr: r.addr(class)?,
            offset: r.addr(class)?,
            size: r.addr(class)?,
            link: r.u32()?,
            info: r.u32()?,
            addralign: r.addr(class)?,
            entsize: r.addr(class)?,
        })
    }
}

/// The canonical symbol table entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Sym {
    /// Offset of the symbol name in the linked string table.
    pub name: u32,
    /// Binding and type nibbles.
    pub info: u8,
    /// Visibility.
    pub other: u8,
    /// Index of the section this symbol is defined in.
    pub shndx: u16,
    /// Symbol value, usually an address.
    pub value: u64,
    /// Symbol size in bytes, or 0 if unknown.
    pub size: u64,
}

impl Sym {
    pub(crate) fn parse(
        data: &[u8],
        class: Class,
        encoding: Encoding,
    ) -> Result<Self, ElfError> {
        let mut r = Reader::new(data, encoding);
        let mut sym = Sym {
            name: r.u32()?,
            ..Default::default()
        };

        // The value/size pair precedes info in the 32-bit layout and follows
        // it in the 64-bit layout.
        match class {
            Class::Elf32 => {
                sym.value = r.addr(class)?;
                sym.size = r.addr(class)?;
                sym.info = r.u8()?;
                sym.other = r.u8()?;
                sym.shndx = r.u16()?;
            }
            Class::Elf64 => {
                sym.info = r.u8()?;
                sym.other = r.u8()?;
                sym.shndx = r.u16()?;
                sym.value = r.addr(class)?;
                sym.size = r.addr(class)?;
            }
        }

        Ok(sym)
    }
}

/// A relocation entry without an explicit addend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rel {
    /// Location to apply the relocation at.
    pub offset: u64,
    /// Combined symbol index and relocation type.
    pub info: u64,
    pub(crate) class: Class,
}

/// A relocation entry with an explicit addend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rela {
    /// Location to apply the relocation at.
    pub offset: u64,
    /// Combined symbol index and relocation type.
    pub info: u64,
    /// Constant addend.
    pub addend: i64,
    pub(crate) class: Class,
}

impl Rel {
    pub(crate) fn parse(
        data: &[u8],
        class: Class,
        encoding: Encoding,
    ) -> Result<Self, ElfError> {
        let mut r = Reader::new(data, encoding);
        Ok(Rel {
            offset: r.addr(class)?,
            info: r.addr(class)?,
            class,
        })
    }

    /// The index into the linked symbol table.
    pub fn sym_index(&self) -> u32 {
        (self.info >> self.class.rel_sym_shift()) as u32
    }

    /// The processor-specific relocation type.
    pub fn rel_type(&self) -> u32 {
        (self.info & self.class.rel_type_mask()) as u32
    }
}

impl Rela {
    pub(crate) fn parse(
        data: &[u8],
        class: Class,
        encoding: Encoding,
    ) -> Result<Self, ElfError> {
        let mut r = Reader::new(data, encoding);
        let offset = r.addr(class)?;
        let info = r.addr(class)?;
        let addend = match class {
            Class::Elf32 => r.u32()? as i32 as i64,
            Class::Elf64 => r.u64()? as i64,
        };
        Ok(Rela {
            offset,
            info,
            addend,
            class,
        })
    }

    /// The index into the linked symbol table.
    pub fn sym_index(&self) -> u32 {
        (self.info >> self.class.rel_sym_shift()) as u32
    }

    /// The processor-specific relocation type.
    pub fn rel_type(&self) -> u32 {
        (self.info & self.class.rel_type_mask()) as u32
    }
}

/// Returns a printable name for a section type, if it is a well-known one.
pub fn section_type_name(shtype: u32) -> Option<&'static str> {
    Some(match shtype {
        SHT_NULL => "NULL",
        SHT_PROGBITS => "PROGBITS",
        SHT_SYMTAB => "SYMTAB",
        SHT_STRTAB => "STRTAB",
        SHT_RELA => "RELA",
        SHT_HASH => "HASH",
        SHT_DYNAMIC => "DYNAMIC",
        SHT_NOTE => "NOTE",
        SHT_NOBITS => "NOBITS",
        SHT_REL => "REL",
        SHT_DYNSYM => "DYNSYM",
        _ => return None,
    })
}

/// Returns a printable name for a segment type, if it is a well-known one.
pub fn segment_type_name(ptype: u32) -> Option<&'static str> {
    Some(match ptype {
        PT_NULL => "NULL",
        PT_LOAD => "LOAD",
        PT_DYNAMIC => "DYNAMIC",
        PT_INTERP => "INTERP",
        PT_NOTE => "NOTE",
        PT_SHLIB => "SHLIB",
        PT_PHDR => "PHDR",
        PT_TLS => "TLS",
        _ => return None,
    })
}
