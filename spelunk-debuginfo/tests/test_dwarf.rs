//! Tests against synthetic `.debug_info` / `.debug_abbrev` data.

use similar_asserts::assert_eq;

use spelunk_debuginfo::dwarf::constants::*;
use spelunk_debuginfo::dwarf::{
    Dwarf, DwarfErrorKind, RangeEntry, SectionKind, SectionLoader, ValueType,
};

type Error = Box<dyn std::error::Error>;

/// A section loader over in-memory buffers.
#[derive(Default)]
struct TestSections {
    info: Vec<u8>,
    abbrev: Vec<u8>,
    str_data: Option<Vec<u8>>,
    ranges: Option<Vec<u8>>,
}

impl SectionLoader for TestSections {
    fn load(&self, kind: SectionKind) -> Option<&[u8]> {
        match kind {
            SectionKind::Info => Some(&self.info),
            SectionKind::Abbrev => Some(&self.abbrev),
            SectionKind::Str => self.str_data.as_deref(),
            SectionKind::Ranges => self.ranges.as_deref(),
            _ => None,
        }
    }
}

fn push_uleb(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return;
        }
    }
}

/// Builds one `.debug_abbrev` table.
#[derive(Default)]
struct AbbrevBuilder {
    data: Vec<u8>,
}

impl AbbrevBuilder {
    fn abbrev(mut self, code: u64, tag: DwTag, children: bool, attrs: &[(DwAt, DwForm)]) -> Self {
        push_uleb(&mut self.data, code);
        push_uleb(&mut self.data, tag.0);
        self.data.push(if children {
            DW_CHILDREN_yes
        } else {
            DW_CHILDREN_no
        });
        for &(name, form) in attrs {
            push_uleb(&mut self.data, name.0);
            push_uleb(&mut self.data, form.0);
        }
        push_uleb(&mut self.data, 0);
        push_uleb(&mut self.data, 0);
        self
    }

    fn finish(mut self) -> Vec<u8> {
        push_uleb(&mut self.data, 0);
        self.data
    }
}

/// Size of a DWARF32 unit header: initial length, version, abbrev offset,
/// address size.
const HEADER32_LEN: u64 = 4 + 2 + 4 + 1;

/// Builds the DIE tree of one DWARF32 compilation unit and tracks the
/// unit-relative offset of everything that goes in.
struct InfoBuilder {
    body: Vec<u8>,
}

impl InfoBuilder {
    fn new() -> Self {
        InfoBuilder { body: Vec::new() }
    }

    /// Unit-relative offset of the next byte.
    fn offset(&self) -> u64 {
        HEADER32_LEN + self.body.len() as u64
    }

    /// Starts a DIE with the given abbrev code; returns its offset.
    fn die(&mut self, code: u64) -> u64 {
        let offset = self.offset();
        push_uleb(&mut self.body, code);
        offset
    }

    /// Writes a sibling-list terminator; returns its offset.
    fn terminator(&mut self) -> u64 {
        self.die(0)
    }

    fn string(&mut self, s: &str) {
        self.body.extend_from_slice(s.as_bytes());
        self.body.push(0);
    }

    fn uleb(&mut self, value: u64) {
        push_uleb(&mut self.body, value);
    }

    fn u8(&mut self, value: u8) {
        self.body.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.body.extend_from_slice(&value.to_ne_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.body.extend_from_slice(&value.to_ne_bytes());
    }

    /// Reserves a four-byte slot and returns a handle for patching.
    fn u32_slot(&mut self) -> usize {
        let pos = self.body.len();
        self.u32(0);
        pos
    }

    fn patch_u32(&mut self, slot: usize, value: u32) {
        self.body[slot..slot + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn finish(self, version: u16, address_size: u8, abbrev_offset: u32) -> Vec<u8> {
        let mut out = Vec::new();
        let length = (2 + 4 + 1 + self.body.len()) as u32;
        out.extend_from_slice(&length.to_ne_bytes());
        out.extend_from_slice(&version.to_ne_bytes());
        out.extend_from_slice(&abbrev_offset.to_ne_bytes());
        out.push(address_size);
        out.extend_from_slice(&self.body);
        out
    }
}

#[test]
fn test_minimal_unit() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, false, &[(DW_AT_name, DW_FORM_string)])
        .finish();

    let mut info = InfoBuilder::new();
    let root = info.die(1);
    info.string("hello");
    info.terminator();

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;

    assert_eq!(dwarf.unit_count(), 1);
    let unit = dwarf.unit(0).ok_or("no unit")?;
    assert_eq!(unit.unit().version(), 4);
    assert_eq!(unit.unit().address_size(), 8);
    assert_eq!(unit.unit().section_offset(), 0);

    let die = unit.root()?;
    assert_eq!(die.tag(), DW_TAG_compile_unit);
    assert_eq!(die.unit_offset(), root);
    assert!(die.has(DW_AT_name));
    assert_eq!(die.attr(DW_AT_name)?.as_string()?, "hello");
    assert_eq!(die.children().count(), 0);

    Ok(())
}

#[test]
fn test_nested_children_without_sibling_hint() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, true, &[])
        .abbrev(2, DW_TAG_subprogram, true, &[])
        .abbrev(3, DW_TAG_variable, false, &[])
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    let child1 = info.die(2);
    info.die(3);
    info.terminator();
    let child2 = info.die(2);
    info.die(3);
    info.terminator();
    info.terminator();

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    // The second child is only reachable by walking the first child's
    // subtree to its terminator.
    let children: Result<Vec<_>, _> = root.children().collect();
    let children = children?;
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].unit_offset(), child1);
    assert_eq!(children[1].unit_offset(), child2);

    // Child enumeration is stable across traversals.
    let offsets = |die: &spelunk_debuginfo::dwarf::Die| -> Result<Vec<u64>, Error> {
        Ok(die
            .children()
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .map(|child| child.unit_offset())
            .collect())
    };
    assert_eq!(offsets(&root)?, offsets(&root)?);

    Ok(())
}

#[test]
fn test_sibling_hint_agrees_with_degraded_traversal() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, true, &[])
        .abbrev(2, DW_TAG_subprogram, true, &[(DW_AT_sibling, DW_FORM_ref4)])
        .abbrev(3, DW_TAG_variable, false, &[])
        .abbrev(4, DW_TAG_subprogram, true, &[])
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    let child1 = info.die(2);
    let sibling_slot = info.u32_slot();
    info.die(3);
    info.terminator();
    let child2 = info.die(4);
    info.die(3);
    info.terminator();
    info.terminator();
    info.patch_u32(sibling_slot, child2 as u32);

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    let children: Result<Vec<_>, _> = root.children().collect();
    let children = children?;
    assert_eq!(children.len(), 2);
    assert_eq!(children[0].unit_offset(), child1);
    assert_eq!(children[1].unit_offset(), child2);

    // The DIE the sibling attribute references is the DIE the iterator
    // lands on.
    let via_hint = children[0].attr(DW_AT_sibling)?.as_reference()?;
    assert!(via_hint == children[1]);

    Ok(())
}

#[test]
fn test_indirect_form() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(
            1,
            DW_TAG_compile_unit,
            false,
            &[(DW_AT_byte_size, DW_FORM_indirect)],
        )
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    info.uleb(DW_FORM_data4.0);
    info.u32(1);
    info.terminator();

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    let value = root.attr(DW_AT_byte_size)?;
    assert_eq!(value.form(), DW_FORM_data4);
    assert_eq!(value.value_type(), ValueType::UConstant);
    assert_eq!(value.as_uconstant()?, 1);

    Ok(())
}

#[test]
fn test_rangelist_base_address_selection() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(
            1,
            DW_TAG_compile_unit,
            false,
            &[(DW_AT_ranges, DW_FORM_sec_offset)],
        )
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    info.u32(0); // offset into .debug_ranges
    info.terminator();

    // addr_size = 4: a low word of 0xffffffff selects a new base address
    // and emits nothing.
    let mut ranges = Vec::new();
    for word in [0xffff_ffffu32, 0x1000, 0x10, 0x20, 0, 0] {
        ranges.extend_from_slice(&word.to_ne_bytes());
    }

    let sections = TestSections {
        info: info.finish(4, 4, 0),
        abbrev,
        ranges: Some(ranges),
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    let list = root.attr(DW_AT_ranges)?.as_rangelist()?;
    let entries: Result<Vec<_>, _> = list.iter().collect();
    assert_eq!(
        entries?,
        vec![RangeEntry {
            low: 0x1010,
            high: 0x1020
        }]
    );

    assert!(list.contains(0x1010)?);
    assert!(!list.contains(0x100f)?);
    assert!(!list.contains(0x1020)?);

    Ok(())
}

#[test]
fn test_dwarf64_unit() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, false, &[(DW_AT_name, DW_FORM_strp)])
        .finish();

    // DWARF64 header: escape word, 8-byte length, version, 8-byte abbrev
    // offset, address size. The strp offset is 8 bytes wide as well.
    let mut body = Vec::new();
    push_uleb(&mut body, 1);
    body.extend_from_slice(&5u64.to_ne_bytes());
    push_uleb(&mut body, 0);

    let mut info = Vec::new();
    info.extend_from_slice(&0xffff_ffffu32.to_ne_bytes());
    info.extend_from_slice(&((2 + 8 + 1 + body.len()) as u64).to_ne_bytes());
    info.extend_from_slice(&4u16.to_ne_bytes());
    info.extend_from_slice(&0u64.to_ne_bytes());
    info.push(8);
    info.extend_from_slice(&body);

    let sections = TestSections {
        info,
        abbrev,
        str_data: Some(b"abcd\0hello\0".to_vec()),
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;

    assert_eq!(dwarf.unit_count(), 1);
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;
    assert_eq!(root.attr(DW_AT_name)?.as_string()?, "hello");

    Ok(())
}

#[test]
fn test_empty_info_section() -> Result<(), Error> {
    let sections = TestSections {
        info: Vec::new(),
        abbrev: vec![0],
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;

    assert_eq!(dwarf.unit_count(), 0);
    assert_eq!(dwarf.units().count(), 0);

    Ok(())
}

#[test]
fn test_reserved_initial_length_rejected() {
    for word in [0xffff_fff0u32, 0xffff_fffe] {
        let sections = TestSections {
            info: word.to_ne_bytes().to_vec(),
            abbrev: vec![0],
            ..Default::default()
        };
        let err = Dwarf::parse(&sections).unwrap_err();
        assert!(matches!(
            err.kind(),
            DwarfErrorKind::ReservedInitialLength(_)
        ));
    }
}

#[test]
fn test_unit_header_invariants() {
    // Version 5 is out of range.
    let info = InfoBuilder::new().finish(5, 8, 0);
    let sections = TestSections {
        info,
        abbrev: vec![0],
        ..Default::default()
    };
    let err = Dwarf::parse(&sections).unwrap_err();
    assert!(matches!(err.kind(), DwarfErrorKind::UnknownVersion(5)));

    // Address size 3 is not a power of two we support.
    let info = InfoBuilder::new().finish(4, 3, 0);
    let sections = TestSections {
        info,
        abbrev: vec![0],
        ..Default::default()
    };
    let err = Dwarf::parse(&sections).unwrap_err();
    assert!(matches!(
        err.kind(),
        DwarfErrorKind::UnsupportedAddressSize(3)
    ));
}

#[test]
fn test_missing_required_sections() {
    struct NoSections;

    impl SectionLoader for NoSections {
        fn load(&self, _kind: SectionKind) -> Option<&[u8]> {
            None
        }
    }

    let err = Dwarf::parse(&NoSections).unwrap_err();
    assert!(matches!(
        err.kind(),
        DwarfErrorKind::MissingSection(SectionKind::Info)
    ));
}

#[test]
fn test_unknown_abbrev_code() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, false, &[])
        .finish();

    let mut info = InfoBuilder::new();
    info.die(5);

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;

    let err = dwarf.unit(0).ok_or("no unit")?.root().unwrap_err();
    assert!(matches!(err.kind(), DwarfErrorKind::UnknownAbbrevCode(5)));
    assert_eq!(err.to_string(), "unknown abbrev code 0x5");

    Ok(())
}

#[test]
fn test_flag_present_is_zero_width() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(
            1,
            DW_TAG_compile_unit,
            false,
            &[
                (DW_AT_external, DW_FORM_flag_present),
                (DW_AT_name, DW_FORM_string),
            ],
        )
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    // No bytes for the flag; the string follows immediately.
    info.string("x");
    info.terminator();

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    assert!(root.attr(DW_AT_external)?.as_flag()?);
    assert_eq!(root.attr(DW_AT_name)?.as_string()?, "x");

    Ok(())
}

#[test]
fn test_value_type_mismatch_and_missing_attribute() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, false, &[(DW_AT_name, DW_FORM_string)])
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    info.string("hello");
    info.terminator();

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    let err = root.attr(DW_AT_name)?.as_address().unwrap_err();
    assert!(matches!(
        err.kind(),
        DwarfErrorKind::ValueTypeMismatch { .. }
    ));

    let err = root.attr(DW_AT_low_pc).unwrap_err();
    assert!(matches!(
        err.kind(),
        DwarfErrorKind::MissingAttribute(DW_AT_low_pc)
    ));
    assert!(!root.has(DW_AT_low_pc));

    Ok(())
}

#[test]
fn test_attributes_agree_with_lookup() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(
            1,
            DW_TAG_compile_unit,
            false,
            &[
                (DW_AT_name, DW_FORM_string),
                (DW_AT_language, DW_FORM_data2),
                (DW_AT_prototyped, DW_FORM_flag),
            ],
        )
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    info.string("unit.c");
    info.u16(0x0c);
    info.u8(1);
    info.terminator();

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    let attrs = root.attributes()?;
    assert_eq!(attrs.len(), 3);

    let names: Vec<_> = attrs.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec![DW_AT_name, DW_AT_language, DW_AT_prototyped]);

    for (name, value) in &attrs {
        let direct = root.attr(*name)?;
        assert_eq!(value.unit_offset(), direct.unit_offset());
        assert_eq!(value.form(), direct.form());
        assert_eq!(value.value_type(), direct.value_type());
    }

    assert_eq!(root.attr(DW_AT_language)?.as_uconstant()?, 0x0c);
    assert!(root.attr(DW_AT_prototyped)?.as_flag()?);

    Ok(())
}

#[test]
fn test_unit_enumeration_advance_agreement() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, false, &[])
        .finish();

    let mut first = InfoBuilder::new();
    first.die(1);
    first.terminator();
    let first = first.finish(4, 8, 0);

    let mut second = InfoBuilder::new();
    second.die(1);
    let second = second.finish(2, 4, 0);

    let mut info = first.clone();
    info.extend_from_slice(&second);

    let sections = TestSections {
        info,
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;

    assert_eq!(dwarf.unit_count(), 2);
    let unit0 = dwarf.unit(0).ok_or("no unit")?.unit();
    let unit1 = dwarf.unit(1).ok_or("no unit")?.unit();

    // The subsection framing advance must equal the header-declared
    // length plus the width of the length field itself.
    let declared = u32::from_ne_bytes(first[..4].try_into()?) as u64;
    assert_eq!(unit0.total_size(), declared + 4);
    assert_eq!(unit1.section_offset(), unit0.section_offset() + declared + 4);
    assert_eq!(unit0.total_size(), first.len() as u64);

    assert_eq!(unit0.version(), 4);
    assert_eq!(unit1.version(), 2);
    assert_eq!(unit1.address_size(), 4);

    Ok(())
}

#[test]
fn test_references_resolve_within_the_unit() -> Result<(), Error> {
    let abbrev = AbbrevBuilder::default()
        .abbrev(1, DW_TAG_compile_unit, true, &[])
        .abbrev(2, DW_TAG_base_type, false, &[(DW_AT_name, DW_FORM_string)])
        .abbrev(3, DW_TAG_variable, false, &[(DW_AT_type, DW_FORM_ref4)])
        .finish();

    let mut info = InfoBuilder::new();
    info.die(1);
    let ty = info.die(2);
    info.string("int");
    info.die(3);
    let slot = info.u32_slot();
    info.terminator();
    info.patch_u32(slot, ty as u32);

    let sections = TestSections {
        info: info.finish(4, 8, 0),
        abbrev,
        ..Default::default()
    };
    let dwarf = Dwarf::parse(&sections)?;
    let root = dwarf.unit(0).ok_or("no unit")?.root()?;

    let children: Result<Vec<_>, _> = root.children().collect();
    let children = children?;
    assert_eq!(children.len(), 2);

    let target = children[1].attr(DW_AT_type)?.as_reference()?;
    assert_eq!(target.unit_offset(), ty);
    assert_eq!(target.tag(), DW_TAG_base_type);
    assert_eq!(target.attr(DW_AT_name)?.as_string()?, "int");
    assert!(target == children[0]);

    Ok(())
}
