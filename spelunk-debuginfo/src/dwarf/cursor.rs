//! A bounds-checked streaming reader over a DWARF section slice.

use super::constants::*;
use super::{DwarfError, DwarfErrorKind, Format, Section};

/// A cursor pointing into a DWARF section.
///
/// Provides all deserialization primitives: fixed-width integers in the
/// target's native representation, ULEB128/SLEB128 variable-width integers,
/// address-size-aware addresses, format-sized offsets, NUL-terminated
/// strings, and initial-length subsection framing. Every read is bounds
/// checked; running off the end of the slice is a format error, never a
/// panic.
///
/// Cursors are plain values: copying one is free and the copy advances
/// independently.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Cursor<'data> {
    section: Section<'data>,
    pos: usize,
}

impl<'data> Cursor<'data> {
    /// Creates a cursor at the start of the given section.
    pub fn new(section: Section<'data>) -> Self {
        Cursor { section, pos: 0 }
    }

    /// Creates a cursor at the given offset into the section.
    ///
    /// An offset past the end of the section is allowed; every subsequent
    /// read will report a premature end.
    pub fn at(section: Section<'data>, offset: u64) -> Self {
        Cursor {
            section,
            pos: usize::try_from(offset).unwrap_or(usize::MAX),
        }
    }

    /// Returns the section this cursor reads from.
    pub fn section(&self) -> Section<'data> {
        self.section
    }

    /// Returns the current offset from the start of the section.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Returns `true` once the cursor has consumed the whole section.
    pub fn at_end(&self) -> bool {
        self.pos >= self.section.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'data [u8], DwarfError> {
        let bytes = self
            .pos
            .checked_add(len)
            .and_then(|end| self.section.data.get(self.pos..end))
            .ok_or(DwarfErrorKind::UnexpectedEof)?;
        self.pos += len;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), DwarfError> {
        self.take(len).map(|_| ())
    }

    /// Reads `len` raw bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'data [u8], DwarfError> {
        self.take(len)
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> Result<u8, DwarfError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a 16-bit integer in the target's native representation.
    pub fn u16(&mut self) -> Result<u16, DwarfError> {
        Ok(u16::from_ne_bytes(self.take(2)?.try_into().unwrap()))
    }

    /// Reads a 32-bit integer in the target's native representation.
    pub fn u32(&mut self) -> Result<u32, DwarfError> {
        Ok(u32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    /// Reads a 64-bit integer in the target's native representation.
    pub fn u64(&mut self) -> Result<u64, DwarfError> {
        Ok(u64::from_ne_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Reads a signed byte.
    pub fn i8(&mut self) -> Result<i8, DwarfError> {
        Ok(self.u8()? as i8)
    }

    /// Reads a signed 16-bit integer.
    pub fn i16(&mut self) -> Result<i16, DwarfError> {
        Ok(self.u16()? as i16)
    }

    /// Reads a signed 32-bit integer.
    pub fn i32(&mut self) -> Result<i32, DwarfError> {
        Ok(self.u32()? as i32)
    }

    /// Reads a signed 64-bit integer.
    pub fn i64(&mut self) -> Result<i64, DwarfError> {
        Ok(self.u64()? as i64)
    }

    /// Reads an unsigned LEB128 integer (DWARF 4, appendix C).
    ///
    /// Encodings that do not fit into 64 bits are format errors, not silent
    /// truncations.
    pub fn uleb128(&mut self) -> Result<u64, DwarfError> {
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            let low = (byte & 0x7f) as u64;
            if shift >= 64 || (shift == 63 && low > 1) {
                if low != 0 {
                    return Err(DwarfErrorKind::Leb128TooLarge.into());
                }
            } else {
                result |= low << shift;
            }
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    /// Reads a signed LEB128 integer (DWARF 4, appendix C).
    ///
    /// Sign-extends from the final byte. Encodings that do not fit into 64
    /// bits are format errors.
    pub fn sleb128(&mut self) -> Result<i64, DwarfError> {
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            let low = byte & 0x7f;
            if shift >= 64 {
                let padding = if result < 0 { 0x7f } else { 0 };
                if low != padding {
                    return Err(DwarfErrorKind::Leb128TooLarge.into());
                }
            } else {
                result |= (low as i64) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Reads a target address; the width is the section's address size.
    pub fn address(&mut self) -> Result<u64, DwarfError> {
        match self.section.address_size {
            1 => Ok(self.u8()? as u64),
            2 => Ok(self.u16()? as u64),
            4 => Ok(self.u32()? as u64),
            8 => self.u64(),
            n => Err(DwarfErrorKind::UnsupportedAddressSize(n).into()),
        }
    }

    /// Reads a section offset; 4 bytes in DWARF32, 8 bytes in DWARF64.
    pub fn offset(&mut self) -> Result<u64, DwarfError> {
        match self.section.format {
            Format::Dwarf32 => Ok(self.u32()? as u64),
            Format::Dwarf64 => self.u64(),
            Format::Unknown => Err(DwarfErrorKind::UnknownFormat.into()),
        }
    }

    /// Reads a NUL-terminated string and returns its bytes without the
    /// terminator. The cursor advances past the terminator.
    pub fn string(&mut self) -> Result<&'data [u8], DwarfError> {
        let tail = self
            .section
            .data
            .get(self.pos..)
            .ok_or(DwarfErrorKind::UnexpectedEof)?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(DwarfErrorKind::UnterminatedString)?;
        self.pos += len + 1;
        Ok(&tail[..len])
    }

    /// Reads an initial length word, returning the DWARF format it selects
    /// and the declared length in bytes.
    ///
    /// A leading word of `0xffffffff` selects DWARF64 with the real length
    /// in the following 8 bytes; the words `0xfffffff0..=0xfffffffe` are
    /// reserved and rejected.
    fn initial_length(&mut self) -> Result<(Format, u64), DwarfError> {
        // Section 7.4
        let word = self.u32()?;
        if word == 0xffff_ffff {
            Ok((Format::Dwarf64, self.u64()?))
        } else if word >= 0xffff_fff0 {
            Err(DwarfErrorKind::ReservedInitialLength(word).into())
        } else {
            Ok((Format::Dwarf32, word as u64))
        }
    }

    /// Consumes an initial length and records the format it selects on this
    /// cursor's section view.
    pub fn skip_initial_length(&mut self) -> Result<(), DwarfError> {
        let (format, _) = self.initial_length()?;
        self.section.format = format;
        Ok(())
    }

    /// Reads a subsection. The cursor must be at an initial length.
    ///
    /// The returned section covers the initial length itself plus exactly
    /// the declared number of bytes, carries the format the initial length
    /// selected, and inherits the address size. Afterwards this cursor
    /// points just past the end of the subsection, so repeated calls frame
    /// consecutive contributions. Reading the returned section usually
    /// starts with [`skip_initial_length`](Self::skip_initial_length).
    pub fn subsection(&mut self) -> Result<Section<'data>, DwarfError> {
        let start = self.pos;
        let (format, length) = self.initial_length()?;
        let header_len = self.pos - start;

        let total = usize::try_from(length)
            .ok()
            .and_then(|len| len.checked_add(header_len))
            .ok_or(DwarfErrorKind::UnexpectedEof)?;
        let data = start
            .checked_add(total)
            .and_then(|end| self.section.data.get(start..end))
            .ok_or(DwarfErrorKind::UnexpectedEof)?;

        self.pos = start + total;
        Ok(Section {
            kind: self.section.kind,
            data,
            format,
            address_size: self.section.address_size,
        })
    }

    /// Advances past an attribute value of the given form without decoding
    /// it.
    pub fn skip_form(&mut self, form: DwForm) -> Result<(), DwarfError> {
        // Section 7.5.3
        let mut form = form;
        while form == DW_FORM_indirect {
            form = DwForm(self.uleb128()?);
        }

        match form {
            DW_FORM_addr => {
                self.address()?;
            }
            DW_FORM_block1 => {
                let len = self.u8()? as usize;
                self.skip(len)?;
            }
            DW_FORM_block2 => {
                let len = self.u16()? as usize;
                self.skip(len)?;
            }
            DW_FORM_block4 => {
                let len = self.u32()? as usize;
                self.skip(len)?;
            }
            DW_FORM_block | DW_FORM_exprloc => {
                let len = self.uleb128()?;
                let len = usize::try_from(len).map_err(|_| DwarfErrorKind::UnexpectedEof)?;
                self.skip(len)?;
            }
            DW_FORM_data1 | DW_FORM_ref1 | DW_FORM_flag => self.skip(1)?,
            DW_FORM_data2 | DW_FORM_ref2 => self.skip(2)?,
            DW_FORM_data4 | DW_FORM_ref4 => self.skip(4)?,
            DW_FORM_data8 | DW_FORM_ref8 | DW_FORM_ref_sig8 => self.skip(8)?,
            DW_FORM_sdata | DW_FORM_udata | DW_FORM_ref_udata => {
                // ULEB and SLEB have identical byte structure.
                self.uleb128()?;
            }
            DW_FORM_string => {
                self.string()?;
            }
            DW_FORM_strp | DW_FORM_sec_offset | DW_FORM_ref_addr => {
                self.offset()?;
            }
            DW_FORM_flag_present => {}
            _ => return Err(DwarfErrorKind::UnknownForm(form).into()),
        }

        Ok(())
    }
}

impl PartialEq for Cursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos
    }
}

impl Eq for Cursor<'_> {}

impl PartialOrd for Cursor<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.pos.cmp(&other.pos)
    }
}
