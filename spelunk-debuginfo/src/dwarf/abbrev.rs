//! Parsing of `.debug_abbrev` abbreviation tables.
//!
//! Abbreviations are the schema of the DIE tree: each entry gives a tag,
//! whether the DIE has children, and the `(name, form)` list of its
//! attributes. The semantic type of every attribute is computed once here,
//! at table build time, so DIE decoding never revisits the form/name pair.

use std::collections::HashMap;

use super::constants::*;
use super::value::ValueType;
use super::{Cursor, DwarfError, DwarfErrorKind, Section};

/// An attribute specification in an abbreviation entry.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AttributeSpec {
    pub name: DwAt,
    pub form: DwForm,
    /// Computed from `(name, form)`.
    pub ty: ValueType,
}

impl AttributeSpec {
    fn new(name: DwAt, form: DwForm) -> Result<Self, DwarfError> {
        Ok(AttributeSpec {
            name,
            form,
            ty: resolve_type(name, form)?,
        })
    }
}

/// Computes the semantic type of an attribute from its name and form.
///
/// Most forms carry a fixed type. `DW_FORM_sec_offset` is the exception: it
/// points into one of four different sections depending on the attribute
/// name (DWARF 4, section 7.5.4).
pub(crate) fn resolve_type(name: DwAt, form: DwForm) -> Result<ValueType, DwarfError> {
    match form {
        DW_FORM_addr => Ok(ValueType::Address),
        DW_FORM_block | DW_FORM_block1 | DW_FORM_block2 | DW_FORM_block4 => Ok(ValueType::Block),
        DW_FORM_data1 | DW_FORM_data2 | DW_FORM_data4 | DW_FORM_data8 | DW_FORM_udata => {
            Ok(ValueType::UConstant)
        }
        DW_FORM_sdata => Ok(ValueType::SConstant),
        DW_FORM_exprloc => Ok(ValueType::Exprloc),
        DW_FORM_flag | DW_FORM_flag_present => Ok(ValueType::Flag),
        DW_FORM_ref1 | DW_FORM_ref2 | DW_FORM_ref4 | DW_FORM_ref8 | DW_FORM_ref_addr
        | DW_FORM_ref_sig8 | DW_FORM_ref_udata => Ok(ValueType::Reference),
        DW_FORM_string | DW_FORM_strp => Ok(ValueType::String),

        // Nothing meaningful can be computed until the DIE data reveals the
        // concrete form.
        DW_FORM_indirect => Ok(ValueType::Invalid),

        DW_FORM_sec_offset => match name {
            DW_AT_stmt_list => Ok(ValueType::LinePtr),

            DW_AT_location
            | DW_AT_string_length
            | DW_AT_return_addr
            | DW_AT_data_member_location
            | DW_AT_frame_base
            | DW_AT_segment
            | DW_AT_static_link
            | DW_AT_use_location
            | DW_AT_vtable_elem_location => Ok(ValueType::LocListPtr),

            DW_AT_macro_info => Ok(ValueType::MacPtr),

            DW_AT_start_scope | DW_AT_ranges => Ok(ValueType::RangeListPtr),

            _ => Err(DwarfErrorKind::UnexpectedSecOffset(name).into()),
        },

        _ => Err(DwarfErrorKind::UnknownForm(form).into()),
    }
}

/// An entry in `.debug_abbrev`.
#[derive(Clone, Debug)]
pub(crate) struct AbbrevEntry {
    pub code: u64,
    pub tag: DwTag,
    pub has_children: bool,
    pub attributes: Vec<AttributeSpec>,
}

impl AbbrevEntry {
    /// Reads one entry at the cursor. Returns `None` at the table
    /// terminator (code 0).
    fn read(cur: &mut Cursor<'_>) -> Result<Option<Self>, DwarfError> {
        // Section 7.5.3
        let code = cur.uleb128()?;
        if code == 0 {
            return Ok(None);
        }

        let tag = DwTag(cur.uleb128()?);
        let has_children = cur.u8()? == DW_CHILDREN_yes;

        let mut attributes = Vec::new();
        loop {
            let name = DwAt(cur.uleb128()?);
            let form = DwForm(cur.uleb128()?);
            if name.0 == 0 && form.0 == 0 {
                break;
            }
            attributes.push(AttributeSpec::new(name, form)?);
        }

        Ok(Some(AbbrevEntry {
            code,
            tag,
            has_children,
            attributes,
        }))
    }
}

/// The abbreviation table of one compilation unit.
///
/// Codes are usually assigned densely starting at 1, in which case a plain
/// vector indexed by code keeps lookups branch-free and compact. Producers
/// that assign sparse codes get a hash map instead; the cutoff is a density
/// of two thirds.
#[derive(Debug)]
pub(crate) enum AbbrevTable {
    Dense(Vec<Option<AbbrevEntry>>),
    Sparse(HashMap<u64, AbbrevEntry>),
}

impl AbbrevTable {
    /// Parses the table at the given offset in `.debug_abbrev`.
    pub fn parse(section: Section<'_>, offset: u64) -> Result<Self, DwarfError> {
        let mut cur = Cursor::at(section, offset);

        let mut entries = Vec::new();
        let mut max_code = 0u64;
        while let Some(entry) = AbbrevEntry::read(&mut cur)? {
            max_code = max_code.max(entry.code);
            entries.push(entry);
        }

        let dense = max_code
            .checked_mul(10)
            .map_or(false, |scaled| scaled < entries.len() as u64 * 15);

        if dense {
            let mut table = Vec::new();
            table.resize_with(max_code as usize + 1, || None);
            for entry in entries {
                let code = entry.code;
                table[code as usize] = Some(entry);
            }
            Ok(AbbrevTable::Dense(table))
        } else {
            Ok(AbbrevTable::Sparse(
                entries.into_iter().map(|entry| (entry.code, entry)).collect(),
            ))
        }
    }

    /// Looks up the entry for the given code.
    pub fn get(&self, code: u64) -> Result<&AbbrevEntry, DwarfError> {
        let entry = match self {
            AbbrevTable::Dense(table) => {
                usize::try_from(code).ok().and_then(|code| table.get(code)?.as_ref())
            }
            AbbrevTable::Sparse(table) => table.get(&code),
        };
        entry.ok_or_else(|| DwarfErrorKind::UnknownAbbrevCode(code).into())
    }
}
