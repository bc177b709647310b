//! Typed decoding of DIE attribute values.

use std::borrow::Cow;
use std::fmt;

use super::abbrev::resolve_type;
use super::constants::*;
use super::{Cursor, Die, DwarfError, DwarfErrorKind, RangeList, SectionKind, UnitRef};

/// The semantic type of an attribute value.
///
/// Computed from the attribute name and form when the abbreviation table is
/// built. Values of type `Constant` have no specified signedness and can be
/// read through either constant accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Not determined; only seen on unresolved `DW_FORM_indirect`.
    Invalid,
    /// A machine address of the unit's address size.
    Address,
    /// An uninterpreted block of bytes.
    Block,
    /// A constant of unspecified signedness.
    Constant,
    /// An unsigned constant.
    UConstant,
    /// A signed constant.
    SConstant,
    /// A DWARF expression.
    Exprloc,
    /// A boolean flag.
    Flag,
    /// An offset into `.debug_line`.
    LinePtr,
    /// An offset into `.debug_loc`.
    LocListPtr,
    /// An offset into `.debug_macinfo`.
    MacPtr,
    /// An offset into `.debug_ranges`.
    RangeListPtr,
    /// A reference to another DIE.
    Reference,
    /// A string.
    String,
}

impl ValueType {
    /// Returns the lower-case name of this type.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Invalid => "invalid",
            ValueType::Address => "address",
            ValueType::Block => "block",
            ValueType::Constant => "constant",
            ValueType::UConstant => "uconstant",
            ValueType::SConstant => "sconstant",
            ValueType::Exprloc => "exprloc",
            ValueType::Flag => "flag",
            ValueType::LinePtr => "lineptr",
            ValueType::LocListPtr => "loclistptr",
            ValueType::MacPtr => "macptr",
            ValueType::RangeListPtr => "rangelistptr",
            ValueType::Reference => "reference",
            ValueType::String => "string",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The value of a DIE attribute.
///
/// This is logically a union of many different types. Each type has a
/// corresponding `as_*` accessor that decodes the value or fails with a
/// type mismatch if the attribute is of an incompatible type. Nothing is
/// read from the section until an accessor runs.
#[derive(Clone, Copy)]
pub struct Value<'data, 'a> {
    unit: UnitRef<'data, 'a>,
    form: DwForm,
    ty: ValueType,
    /// Offset of the encoded value, relative to the unit.
    offset: u64,
}

impl<'data, 'a> Value<'data, 'a> {
    /// Creates a value, resolving `DW_FORM_indirect` immediately.
    pub(crate) fn new(
        unit: UnitRef<'data, 'a>,
        name: DwAt,
        form: DwForm,
        ty: ValueType,
        offset: u64,
    ) -> Result<Self, DwarfError> {
        let mut value = Value {
            unit,
            form,
            ty,
            offset,
        };
        if form == DW_FORM_indirect {
            value.resolve_indirect(name)?;
        }
        Ok(value)
    }

    /// The form data actually follows an indirect form specifier in the DIE
    /// itself; read the concrete form and rebase the offset past it.
    fn resolve_indirect(&mut self, name: DwAt) -> Result<(), DwarfError> {
        let mut cur = Cursor::at(self.unit.unit.subsection(), self.offset);
        let mut form = DwForm(cur.uleb128()?);
        while form == DW_FORM_indirect {
            form = DwForm(cur.uleb128()?);
        }
        self.form = form;
        self.ty = resolve_type(name, form)?;
        self.offset = cur.position();
        Ok(())
    }

    /// Returns this value's semantic type.
    pub fn value_type(&self) -> ValueType {
        self.ty
    }

    /// Returns this value's encoding.
    ///
    /// Indirect encodings are resolved on construction, so this never
    /// returns `DW_FORM_indirect`.
    pub fn form(&self) -> DwForm {
        self.form
    }

    /// Returns this value's byte offset within its compilation unit.
    pub fn unit_offset(&self) -> u64 {
        self.offset
    }

    /// Returns this value's byte offset within the `.debug_info` section.
    pub fn section_offset(&self) -> u64 {
        self.unit.unit.section_offset() + self.offset
    }

    fn cursor(&self) -> Cursor<'data> {
        Cursor::at(self.unit.unit.subsection(), self.offset)
    }

    fn mismatch(&self, expected: &'static str) -> DwarfError {
        DwarfErrorKind::ValueTypeMismatch {
            expected,
            actual: self.ty,
        }
        .into()
    }

    /// Decodes this value as a machine address.
    pub fn as_address(&self) -> Result<u64, DwarfError> {
        if self.form != DW_FORM_addr {
            return Err(self.mismatch("address"));
        }
        self.cursor().address()
    }

    /// Decodes this value as a block of bytes.
    ///
    /// The returned slice points directly into the section data. The block
    /// is not interpreted further; what its bytes mean is the caller's
    /// responsibility.
    pub fn as_block(&self) -> Result<&'data [u8], DwarfError> {
        let mut cur = self.cursor();
        let len = match self.form {
            DW_FORM_block1 => cur.u8()? as u64,
            DW_FORM_block2 => cur.u16()? as u64,
            DW_FORM_block4 => cur.u32()? as u64,
            DW_FORM_block => cur.uleb128()?,
            _ => return Err(self.mismatch("block")),
        };
        let len = usize::try_from(len).map_err(|_| DwarfErrorKind::UnexpectedEof)?;
        cur.bytes(len)
    }

    /// Decodes this value as an unsigned constant.
    pub fn as_uconstant(&self) -> Result<u64, DwarfError> {
        let mut cur = self.cursor();
        match self.form {
            DW_FORM_data1 => Ok(cur.u8()? as u64),
            DW_FORM_data2 => Ok(cur.u16()? as u64),
            DW_FORM_data4 => Ok(cur.u32()? as u64),
            DW_FORM_data8 => cur.u64(),
            DW_FORM_udata => cur.uleb128(),
            _ => Err(self.mismatch("uconstant")),
        }
    }

    /// Decodes this value as a signed constant.
    pub fn as_sconstant(&self) -> Result<i64, DwarfError> {
        let mut cur = self.cursor();
        match self.form {
            DW_FORM_data1 => Ok(cur.i8()? as i64),
            DW_FORM_data2 => Ok(cur.i16()? as i64),
            DW_FORM_data4 => Ok(cur.i32()? as i64),
            DW_FORM_data8 => cur.i64(),
            DW_FORM_sdata => cur.sleb128(),
            _ => Err(self.mismatch("sconstant")),
        }
    }

    /// Decodes this value as a DWARF expression.
    ///
    /// The returned slice contains the raw expression bytes; evaluating
    /// them is out of scope for this library.
    pub fn as_exprloc(&self) -> Result<&'data [u8], DwarfError> {
        if self.form != DW_FORM_exprloc {
            return Err(self.mismatch("exprloc"));
        }
        let mut cur = self.cursor();
        let len = cur.uleb128()?;
        let len = usize::try_from(len).map_err(|_| DwarfErrorKind::UnexpectedEof)?;
        cur.bytes(len)
    }

    /// Decodes this value as a flag.
    pub fn as_flag(&self) -> Result<bool, DwarfError> {
        match self.form {
            DW_FORM_flag => Ok(self.cursor().u8()? != 0),
            DW_FORM_flag_present => Ok(true),
            _ => Err(self.mismatch("flag")),
        }
    }

    fn string_bytes(&self) -> Result<&'data [u8], DwarfError> {
        let mut cur = self.cursor();
        match self.form {
            DW_FORM_string => cur.string(),
            DW_FORM_strp => {
                let offset = cur.offset()?;
                let strs = self.unit.dwarf.require_section(SectionKind::Str)?;
                Cursor::at(strs, offset).string()
            }
            _ => Err(self.mismatch("string")),
        }
    }

    /// Decodes this value as a string.
    ///
    /// The returned slice points directly into the section data; no copy is
    /// made. Non-UTF-8 data is an error; use
    /// [`as_string_lossy`](Self::as_string_lossy) to accept it.
    pub fn as_string(&self) -> Result<&'data str, DwarfError> {
        std::str::from_utf8(self.string_bytes()?)
            .map_err(|e| DwarfError::new(DwarfErrorKind::InvalidString, e))
    }

    /// Decodes this value as a string, replacing invalid UTF-8 sequences.
    ///
    /// Borrows from the section for valid UTF-8 and copies only when
    /// replacement characters are needed.
    pub fn as_string_lossy(&self) -> Result<Cow<'data, str>, DwarfError> {
        Ok(String::from_utf8_lossy(self.string_bytes()?))
    }

    /// Decodes this value as a reference and reads the DIE it refers to.
    ///
    /// The unit-relative reference forms all resolve within this value's
    /// own compilation unit. `DW_FORM_ref_addr` and `DW_FORM_ref_sig8` are
    /// not implemented and fail rather than return wrong data.
    pub fn as_reference(&self) -> Result<Die<'data, 'a>, DwarfError> {
        let mut cur = self.cursor();
        let offset = match self.form {
            DW_FORM_ref1 => cur.u8()? as u64,
            DW_FORM_ref2 => cur.u16()? as u64,
            DW_FORM_ref4 => cur.u32()? as u64,
            DW_FORM_ref8 => cur.u64()?,
            DW_FORM_ref_udata => cur.uleb128()?,

            DW_FORM_ref_addr => {
                return Err(DwarfErrorKind::NotImplemented("DW_FORM_ref_addr").into())
            }
            DW_FORM_ref_sig8 => {
                return Err(DwarfErrorKind::NotImplemented("DW_FORM_ref_sig8").into())
            }

            _ => return Err(self.mismatch("reference")),
        };
        Die::read(self.unit, offset)
    }

    /// Decodes this value as a raw section offset.
    ///
    /// Available for the section-pointer types `lineptr`, `loclistptr`,
    /// `macptr`, and `rangelistptr`.
    pub fn as_sec_offset(&self) -> Result<u64, DwarfError> {
        match self.ty {
            ValueType::LinePtr
            | ValueType::LocListPtr
            | ValueType::MacPtr
            | ValueType::RangeListPtr => self.cursor().offset(),
            _ => Err(self.mismatch("section offset")),
        }
    }

    /// Decodes this value as a range list from `.debug_ranges`.
    pub fn as_rangelist(&self) -> Result<RangeList<'data>, DwarfError> {
        if self.ty != ValueType::RangeListPtr {
            return Err(self.mismatch("rangelist"));
        }
        let offset = self.cursor().offset()?;
        let mut section = self.unit.dwarf.require_section(SectionKind::Ranges)?;
        section.address_size = self.unit.unit.address_size();
        Ok(RangeList::section(section, offset))
    }
}

impl fmt::Debug for Value<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("type", &format_args!("{}", self.ty))
            .field("form", &format_args!("{}", self.form))
            .field("offset", &format_args!("{:#x}", self.offset))
            .finish()
    }
}
