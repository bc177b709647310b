//! Compilation unit headers and the per-unit abbreviation slot.

use once_cell::sync::OnceCell;

use super::{AbbrevTable, Cursor, Dwarf, DwarfError, DwarfErrorKind, Section};

/// A compilation unit within a DWARF file.
///
/// Most of the information in a DWARF file is divided up by compilation
/// unit. The header is decoded eagerly when the file is parsed; the
/// abbreviation table is built once, on first access to the unit's DIEs.
#[derive(Debug)]
pub struct CompilationUnit<'data> {
    /// Offset of this unit in `.debug_info`.
    section_offset: u64,
    version: u16,
    /// Offset of this unit's abbreviations in `.debug_abbrev`.
    debug_abbrev_offset: u64,
    address_size: u8,
    /// The unit's slice of `.debug_info`, including the header. Carries the
    /// unit's format and address size for every cursor derived from it.
    subsec: Section<'data>,
    /// Offset of the root DIE, relative to `subsec`.
    root_offset: u64,
    abbrevs: OnceCell<AbbrevTable>,
}

impl<'data> CompilationUnit<'data> {
    /// Decodes a unit header from a subsection of `.debug_info`.
    ///
    /// `section_offset` is the offset the subsection was framed at.
    pub(crate) fn parse(subsec: Section<'data>, section_offset: u64) -> Result<Self, DwarfError> {
        // Section 7.5.1.1
        let mut cur = Cursor::new(subsec);
        cur.skip_initial_length()?;

        let version = cur.u16()?;
        if !(2..=4).contains(&version) {
            return Err(DwarfErrorKind::UnknownVersion(version).into());
        }

        let debug_abbrev_offset = cur.offset()?;

        let address_size = cur.u8()?;
        if !matches!(address_size, 1 | 2 | 4 | 8) {
            return Err(DwarfErrorKind::UnsupportedAddressSize(address_size).into());
        }

        let mut subsec = cur.section();
        subsec.address_size = address_size;

        Ok(CompilationUnit {
            section_offset,
            version,
            debug_abbrev_offset,
            address_size,
            subsec,
            root_offset: cur.position(),
            abbrevs: OnceCell::new(),
        })
    }

    /// Returns the byte offset of this unit in the `.debug_info` section.
    pub fn section_offset(&self) -> u64 {
        self.section_offset
    }

    /// Returns the DWARF version of this unit, between 2 and 4.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Returns the offset of this unit's abbreviations in `.debug_abbrev`.
    pub fn debug_abbrev_offset(&self) -> u64 {
        self.debug_abbrev_offset
    }

    /// Returns the size in bytes of addresses in this unit.
    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// Returns the size in bytes of this unit's contribution to
    /// `.debug_info`, including the header.
    pub fn total_size(&self) -> u64 {
        self.subsec.data.len() as u64
    }

    pub(crate) fn subsection(&self) -> Section<'data> {
        self.subsec
    }

    pub(crate) fn root_offset(&self) -> u64 {
        self.root_offset
    }

    /// Returns this unit's abbreviation table, building it on first use.
    pub(crate) fn abbrevs(&self, dwarf: &Dwarf<'data>) -> Result<&AbbrevTable, DwarfError> {
        self.abbrevs.get_or_try_init(|| {
            AbbrevTable::parse(dwarf.abbrev_section(), self.debug_abbrev_offset)
        })
    }
}
