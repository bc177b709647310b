//! Debugging information entries and their traversal.

use std::fmt;

use smallvec::SmallVec;

use super::constants::*;
use super::{AbbrevEntry, Cursor, DwarfError, DwarfErrorKind, UnitRef, Value};

/// A Debugging Information Entry, or DIE. The basic unit of information in
/// a DWARF file.
///
/// A DIE is decoded on demand from its compilation unit: looking one up
/// records the offset of each attribute value but decodes none of them.
/// DIEs are small and cheap to clone; the attribute offsets live inline for
/// up to six attributes, which covers the overwhelming majority of real
/// entries.
#[derive(Clone)]
pub struct Die<'data, 'a> {
    unit: UnitRef<'data, 'a>,
    /// `None` marks a sibling-list terminator.
    abbrev: Option<&'a AbbrevEntry>,
    /// The beginning of this DIE, relative to the unit.
    offset: u64,
    /// One offset per attribute in the abbrev, relative to the unit.
    attr_offsets: SmallVec<[u64; 6]>,
    /// The offset just past this DIE. Set even for terminators.
    next_offset: u64,
}

impl<'data, 'a> Die<'data, 'a> {
    /// Reads the DIE at the given unit-relative offset.
    pub(crate) fn read(unit: UnitRef<'data, 'a>, offset: u64) -> Result<Self, DwarfError> {
        let mut cur = Cursor::at(unit.unit.subsection(), offset);

        let code = cur.uleb128()?;
        if code == 0 {
            return Ok(Die {
                unit,
                abbrev: None,
                offset,
                attr_offsets: SmallVec::new(),
                next_offset: cur.position(),
            });
        }

        let abbrev = unit.abbrevs()?.get(code)?;

        let mut attr_offsets = SmallVec::with_capacity(abbrev.attributes.len());
        for spec in &abbrev.attributes {
            attr_offsets.push(cur.position());
            cur.skip_form(spec.form)?;
        }

        Ok(Die {
            unit,
            abbrev: Some(abbrev),
            offset,
            attr_offsets,
            next_offset: cur.position(),
        })
    }

    /// Returns the tag of this DIE, or [`DwTag::NULL`] for a terminator.
    pub fn tag(&self) -> DwTag {
        self.abbrev.map_or(DwTag::NULL, |abbrev| abbrev.tag)
    }

    /// Returns `true` if this DIE is a sibling-list terminator.
    pub fn is_null(&self) -> bool {
        self.abbrev.is_none()
    }

    /// Returns `true` if this DIE is followed by children.
    pub fn has_children(&self) -> bool {
        self.abbrev.map_or(false, |abbrev| abbrev.has_children)
    }

    /// Returns this DIE's byte offset within its compilation unit.
    pub fn unit_offset(&self) -> u64 {
        self.offset
    }

    /// Returns this DIE's byte offset within the `.debug_info` section.
    pub fn section_offset(&self) -> u64 {
        self.unit.unit.section_offset() + self.offset
    }

    /// Returns the compilation unit this DIE belongs to.
    pub fn unit(&self) -> UnitRef<'data, 'a> {
        self.unit
    }

    /// Returns `true` if this DIE has the requested attribute.
    pub fn has(&self, name: DwAt) -> bool {
        let Some(abbrev) = self.abbrev else {
            return false;
        };
        abbrev.attributes.iter().any(|spec| spec.name == name)
    }

    /// Returns the value of the requested attribute.
    ///
    /// Fails with a missing-attribute error if this DIE does not have it.
    /// The value itself is not decoded until one of its typed accessors is
    /// invoked.
    pub fn attr(&self, name: DwAt) -> Result<Value<'data, 'a>, DwarfError> {
        let specs = self.abbrev.map(|abbrev| &abbrev.attributes[..]).unwrap_or(&[]);
        for (spec, &offset) in specs.iter().zip(&self.attr_offsets) {
            if spec.name == name {
                return Value::new(self.unit, spec.name, spec.form, spec.ty, offset);
            }
        }
        Err(DwarfErrorKind::MissingAttribute(name).into())
    }

    /// Returns all attributes of this DIE in schema order.
    pub fn attributes(&self) -> Result<Vec<(DwAt, Value<'data, 'a>)>, DwarfError> {
        let specs = self.abbrev.map(|abbrev| &abbrev.attributes[..]).unwrap_or(&[]);
        specs
            .iter()
            .zip(&self.attr_offsets)
            .map(|(spec, &offset)| {
                Ok((
                    spec.name,
                    Value::new(self.unit, spec.name, spec.form, spec.ty, offset)?,
                ))
            })
            .collect()
    }

    /// Returns an iterator over the children of this DIE.
    ///
    /// The first child immediately follows its parent. Advancing from a
    /// child with children of its own follows `DW_AT_sibling` when present;
    /// without the hint, the iterator walks the child's subtree to its
    /// terminator, which costs O(subtree size) per step and makes a full
    /// depth-first search without hints O(n²) in the worst case.
    pub fn children(&self) -> Children<'data, 'a> {
        let state = if self.has_children() {
            ChildrenState::Start(self.next_offset)
        } else {
            ChildrenState::Done
        };
        Children {
            unit: self.unit,
            state,
        }
    }

    /// Computes the unit-relative offset of the DIE following this one at
    /// the same nesting depth.
    fn next_sibling_offset(&self) -> Result<u64, DwarfError> {
        if !self.has_children() {
            // No children, so the successor follows immediately.
            return Ok(self.next_offset);
        }

        if self.has(DW_AT_sibling) {
            return Ok(self.attr(DW_AT_sibling)?.as_reference()?.unit_offset());
        }

        // No sibling hint: walk this DIE's children to their terminator.
        let mut offset = self.next_offset;
        loop {
            let child = Die::read(self.unit, offset)?;
            if child.is_null() {
                return Ok(child.next_offset);
            }
            offset = child.next_sibling_offset()?;
        }
    }
}

impl PartialEq for Die<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.unit.same_unit(&other.unit) && self.offset == other.offset
    }
}

impl Eq for Die<'_, '_> {}

impl fmt::Debug for Die<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Die")
            .field("tag", &format_args!("{}", self.tag()))
            .field("offset", &format_args!("{:#x}", self.offset))
            .field("attrs", &self.attr_offsets.len())
            .finish()
    }
}

enum ChildrenState<'data, 'a> {
    /// Positioned before the child at this offset.
    Start(u64),
    /// The child yielded last; its successor has not been located yet.
    After(Die<'data, 'a>),
    Done,
}

/// An iterator over the children of a DIE.
///
/// Yields each child in document order and stops at the sibling-list
/// terminator. Errors while decoding a child end the iteration after the
/// error is yielded.
pub struct Children<'data, 'a> {
    unit: UnitRef<'data, 'a>,
    state: ChildrenState<'data, 'a>,
}

impl<'data, 'a> Iterator for Children<'data, 'a> {
    type Item = Result<Die<'data, 'a>, DwarfError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = match std::mem::replace(&mut self.state, ChildrenState::Done) {
            ChildrenState::Start(offset) => offset,
            ChildrenState::After(prev) => match prev.next_sibling_offset() {
                Ok(offset) => offset,
                Err(err) => return Some(Err(err)),
            },
            ChildrenState::Done => return None,
        };

        let die = match Die::read(self.unit, offset) {
            Ok(die) => die,
            Err(err) => return Some(Err(err)),
        };
        if die.is_null() {
            return None;
        }

        self.state = ChildrenState::After(die.clone());
        Some(Ok(die))
    }
}

impl std::iter::FusedIterator for Children<'_, '_> {}
