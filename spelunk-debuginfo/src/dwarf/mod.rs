//! Support for DWARF debugging information, versions 2 to 4.
//!
//! The entry point is [`Dwarf`], which borrows its sections from a
//! [`SectionLoader`] (typically an [`ElfObject`]). Compilation units are
//! enumerated eagerly at parse time; everything below them — abbreviation
//! tables, debugging information entries, attribute values — is decoded on
//! demand and without copying section data.
//!
//! ```no_run
//! use spelunk_common::ByteView;
//! use spelunk_debuginfo::dwarf::constants::DW_AT_name;
//! use spelunk_debuginfo::dwarf::Dwarf;
//! use spelunk_debuginfo::elf::ElfObject;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let view = ByteView::open("a.out")?;
//! let elf = ElfObject::parse(&view)?;
//! let dwarf = Dwarf::parse(&elf)?;
//!
//! for unit in dwarf.units() {
//!     let root = unit.root()?;
//!     if root.has(DW_AT_name) {
//!         println!("{}", root.attr(DW_AT_name)?.as_string()?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::error::Error;
use std::fmt;

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::elf::ElfObject;

pub mod constants;

mod abbrev;
mod cursor;
mod die;
mod rangelist;
mod unit;
mod value;

pub use self::constants::{DwAt, DwForm, DwTag};
pub use self::die::{Children, Die};
pub use self::rangelist::{RangeEntry, RangeIter, RangeList};
pub use self::unit::CompilationUnit;
pub use self::value::{Value, ValueType};

pub(crate) use self::abbrev::{AbbrevEntry, AbbrevTable};
pub(crate) use self::cursor::Cursor;

/// The DWARF sections a [`SectionLoader`] can provide.
///
/// The variants correspond to the ELF section names `.debug_<kind>`; DWARF
/// can be embedded in other container formats under equivalent names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// `.debug_info`: the DIE trees of all compilation units.
    Info,
    /// `.debug_abbrev`: abbreviation tables.
    Abbrev,
    /// `.debug_aranges`: address range lookup table.
    Aranges,
    /// `.debug_frame`: call frame information.
    Frame,
    /// `.debug_line`: line number programs.
    Line,
    /// `.debug_loc`: location lists.
    Loc,
    /// `.debug_macinfo`: macro information.
    MacInfo,
    /// `.debug_pubnames`: lookup table for global objects and functions.
    PubNames,
    /// `.debug_pubtypes`: lookup table for global types.
    PubTypes,
    /// `.debug_ranges`: non-contiguous address ranges.
    Ranges,
    /// `.debug_str`: string table referenced by `DW_FORM_strp`.
    Str,
    /// `.debug_types`: type units.
    Types,
}

impl SectionKind {
    const ALL: [SectionKind; 12] = [
        SectionKind::Info,
        SectionKind::Abbrev,
        SectionKind::Aranges,
        SectionKind::Frame,
        SectionKind::Line,
        SectionKind::Loc,
        SectionKind::MacInfo,
        SectionKind::PubNames,
        SectionKind::PubTypes,
        SectionKind::Ranges,
        SectionKind::Str,
        SectionKind::Types,
    ];

    /// Returns the name of the ELF section holding this kind of data.
    pub fn elf_name(self) -> &'static str {
        match self {
            SectionKind::Info => ".debug_info",
            SectionKind::Abbrev => ".debug_abbrev",
            SectionKind::Aranges => ".debug_aranges",
            SectionKind::Frame => ".debug_frame",
            SectionKind::Line => ".debug_line",
            SectionKind::Loc => ".debug_loc",
            SectionKind::MacInfo => ".debug_macinfo",
            SectionKind::PubNames => ".debug_pubnames",
            SectionKind::PubTypes => ".debug_pubtypes",
            SectionKind::Ranges => ".debug_ranges",
            SectionKind::Str => ".debug_str",
            SectionKind::Types => ".debug_types",
        }
    }

    /// Translates an ELF section name into a DWARF section kind.
    pub fn from_elf_name(name: &str) -> Option<Self> {
        SectionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.elf_name() == name)
    }

    fn index(self) -> usize {
        SectionKind::ALL
            .iter()
            .position(|&kind| kind == self)
            .unwrap_or(0)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.elf_name())
    }
}

/// The DWARF format of a section or section slice, set by the initial
/// length. Governs the width of offsets read from the slice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    /// Not determined yet; no initial length has been consumed.
    #[default]
    Unknown,
    /// 32-bit DWARF: offsets are 4 bytes.
    Dwarf32,
    /// 64-bit DWARF: offsets are 8 bytes.
    Dwarf64,
}

/// A DWARF section or a slice of one, together with the dynamic information
/// needed to decode values inside it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Section<'data> {
    pub kind: SectionKind,
    pub data: &'data [u8],
    pub format: Format,
    /// In bytes; 0 until a unit header has been consumed.
    pub address_size: u8,
}

impl<'data> Section<'data> {
    pub fn new(kind: SectionKind, data: &'data [u8]) -> Self {
        Section {
            kind,
            data,
            format: Format::Unknown,
            address_size: 0,
        }
    }
}

/// The kind of a [`DwarfError`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Error)]
pub enum DwarfErrorKind {
    /// A section required for the requested operation is not present.
    #[error("required {0} section missing")]
    MissingSection(SectionKind),
    /// A read reached past the end of a section or subsection.
    #[error("section ended prematurely")]
    UnexpectedEof,
    /// A DWARF32 initial length in the reserved range `0xfffffff0..=0xfffffffe`.
    #[error("reserved initial length {0:#x}")]
    ReservedInitialLength(u32),
    /// An offset-sized read was attempted before any initial length
    /// established the section format.
    #[error("offset read in section of unknown DWARF format")]
    UnknownFormat,
    /// A compilation unit declares a version outside 2..=4.
    #[error("unknown compilation unit version {0}")]
    UnknownVersion(u16),
    /// A compilation unit declares an address size other than 1, 2, 4 or 8.
    #[error("unsupported address size {0}")]
    UnsupportedAddressSize(u8),
    /// A DIE references an abbreviation code its table does not define.
    #[error("unknown abbrev code {0:#x}")]
    UnknownAbbrevCode(u64),
    /// An attribute uses a form this library does not know.
    #[error("unknown attribute form {0}")]
    UnknownForm(DwForm),
    /// `DW_FORM_sec_offset` was used with an attribute that has no
    /// section-pointer class.
    #[error("DW_FORM_sec_offset not expected for attribute {0}")]
    UnexpectedSecOffset(DwAt),
    /// A LEB128 encoding does not fit into 64 bits.
    #[error("LEB128 value too large")]
    Leb128TooLarge,
    /// An inline or table string is not NUL-terminated before its section
    /// ends.
    #[error("unterminated string")]
    UnterminatedString,
    /// A string is not valid UTF-8.
    #[error("invalid string data")]
    InvalidString,
    /// A typed accessor was invoked on a value of an incompatible type.
    #[error("cannot read {actual} as {expected}")]
    ValueTypeMismatch {
        /// The representation the accessor would have produced.
        expected: &'static str,
        /// The actual type of the value.
        actual: ValueType,
    },
    /// The DIE does not have the requested attribute.
    #[error("DIE does not have attribute {0}")]
    MissingAttribute(DwAt),
    /// The operation touches a DWARF feature this library does not
    /// implement.
    #[error("{0} not implemented")]
    NotImplemented(&'static str),
}

/// An error encountered while reading DWARF data.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct DwarfError {
    kind: DwarfErrorKind,
    #[source]
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl DwarfError {
    pub(crate) fn new<E>(kind: DwarfErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`DwarfErrorKind`] for this error.
    pub fn kind(&self) -> DwarfErrorKind {
        self.kind
    }
}

impl From<DwarfErrorKind> for DwarfError {
    fn from(kind: DwarfErrorKind) -> Self {
        Self { kind, source: None }
    }
}

/// A source of DWARF section data.
///
/// The returned buffers must remain valid and unchanged for as long as the
/// loader itself is borrowed; [`Dwarf`] keeps the loader borrowed for its
/// whole lifetime. Returning `None` means the section is not present, which
/// is an error only for `.debug_info` and `.debug_abbrev`.
pub trait SectionLoader {
    /// Returns the bytes of the given DWARF section, if present.
    fn load(&self, kind: SectionKind) -> Option<&[u8]>;
}

impl SectionLoader for ElfObject<'_> {
    fn load(&self, kind: SectionKind) -> Option<&[u8]> {
        self.section_by_name(kind.elf_name())?.data()
    }
}

/// Lazily loaded optional sections, one one-shot slot per kind.
#[derive(Debug, Default)]
struct LazySections<'data> {
    slots: [OnceCell<Option<Section<'data>>>; 12],
}

/// A DWARF file.
///
/// Owns the list of compilation units and the section slices everything else
/// borrows from. Cloning handles out of it is cheap: [`UnitRef`], [`Die`] and
/// [`Value`] are all small `Copy`-able borrow pairs.
pub struct Dwarf<'data> {
    loader: &'data dyn SectionLoader,
    info: Section<'data>,
    abbrev: Section<'data>,
    lazy: LazySections<'data>,
    units: Vec<CompilationUnit<'data>>,
}

impl<'data> Dwarf<'data> {
    /// Parses the DWARF data provided by the given loader.
    ///
    /// `.debug_info` and `.debug_abbrev` are required and loaded eagerly;
    /// all compilation unit headers are decoded up front. Optional sections
    /// are loaded on first use. An empty `.debug_info` section yields a file
    /// with zero units, not an error.
    pub fn parse(loader: &'data dyn SectionLoader) -> Result<Self, DwarfError> {
        let info = Section::new(
            SectionKind::Info,
            loader
                .load(SectionKind::Info)
                .ok_or(DwarfErrorKind::MissingSection(SectionKind::Info))?,
        );
        let abbrev = Section::new(
            SectionKind::Abbrev,
            loader
                .load(SectionKind::Abbrev)
                .ok_or(DwarfErrorKind::MissingSection(SectionKind::Abbrev))?,
        );

        // Everything derives from the compilation units, so there is no
        // point in enumerating them lazily.
        let mut units = Vec::new();
        let mut cursor = Cursor::new(info);
        while !cursor.at_end() {
            let offset = cursor.position();
            let subsec = cursor.subsection()?;
            units.push(CompilationUnit::parse(subsec, offset)?);
        }

        Ok(Dwarf {
            loader,
            info,
            abbrev,
            lazy: LazySections::default(),
            units,
        })
    }

    /// Returns the number of compilation units in this file.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Returns a handle to the compilation unit at the given index.
    pub fn unit(&self, index: usize) -> Option<UnitRef<'data, '_>> {
        self.units.get(index).map(|unit| UnitRef { dwarf: self, unit })
    }

    /// Returns an iterator over the compilation units in this file.
    pub fn units(&self) -> Units<'data, '_> {
        Units {
            dwarf: self,
            index: 0,
        }
    }

    pub(crate) fn abbrev_section(&self) -> Section<'data> {
        self.abbrev
    }

    /// Returns the given section, loading and caching it on first use.
    pub(crate) fn section(&self, kind: SectionKind) -> Option<Section<'data>> {
        match kind {
            SectionKind::Info => Some(self.info),
            SectionKind::Abbrev => Some(self.abbrev),
            _ => {
                let loader = self.loader;
                *self.lazy.slots[kind.index()]
                    .get_or_init(|| loader.load(kind).map(|data| Section::new(kind, data)))
            }
        }
    }

    /// Like [`section`](Self::section), but a missing section is an error.
    pub(crate) fn require_section(&self, kind: SectionKind) -> Result<Section<'data>, DwarfError> {
        self.section(kind)
            .ok_or_else(|| DwarfErrorKind::MissingSection(kind).into())
    }
}

impl fmt::Debug for Dwarf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dwarf")
            .field("info_len", &self.info.data.len())
            .field("abbrev_len", &self.abbrev.data.len())
            .field("units", &self.units.len())
            .finish()
    }
}

/// A slim handle pairing a compilation unit with the file that owns it.
///
/// The unit needs its file to reach the abbreviation section and the lazily
/// loaded optional sections; keeping the pair in one `Copy` value avoids an
/// owning back-reference from the unit to the file.
#[derive(Clone, Copy, Debug)]
pub struct UnitRef<'data, 'a> {
    pub(crate) dwarf: &'a Dwarf<'data>,
    pub(crate) unit: &'a CompilationUnit<'data>,
}

impl<'data, 'a> UnitRef<'data, 'a> {
    /// Returns the compilation unit this handle refers to.
    pub fn unit(&self) -> &'a CompilationUnit<'data> {
        self.unit
    }

    /// Returns the byte offset of this unit in the `.debug_info` section.
    pub fn section_offset(&self) -> u64 {
        self.unit.section_offset()
    }

    /// Returns the root DIE of this compilation unit.
    ///
    /// This should have tag `DW_TAG_compile_unit` or `DW_TAG_partial_unit`.
    /// The first call forces the unit's abbreviation table.
    pub fn root(&self) -> Result<Die<'data, 'a>, DwarfError> {
        Die::read(*self, self.unit.root_offset())
    }

    pub(crate) fn abbrevs(&self) -> Result<&'a AbbrevTable, DwarfError> {
        self.unit.abbrevs(self.dwarf)
    }

    pub(crate) fn same_unit(&self, other: &UnitRef<'_, '_>) -> bool {
        std::ptr::eq(
            self.unit as *const CompilationUnit<'_> as *const (),
            other.unit as *const CompilationUnit<'_> as *const (),
        )
    }
}

/// An iterator over the compilation units of a [`Dwarf`] file.
#[derive(Clone, Debug)]
pub struct Units<'data, 'a> {
    dwarf: &'a Dwarf<'data>,
    index: usize,
}

impl<'data, 'a> Iterator for Units<'data, 'a> {
    type Item = UnitRef<'data, 'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let unit = self.dwarf.unit(self.index)?;
        self.index += 1;
        Some(unit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dwarf.units.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}
