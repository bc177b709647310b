//! A library to read ELF object files and the DWARF (versions 2 to 4)
//! debugging information embedded in them.
//!
//! The [`elf`] module parses ELF containers of all four on-disk encodings
//! (32- and 64-bit, little- and big-endian) into a single canonical in-memory
//! form and exposes sections, segments, string tables, symbol tables, and
//! relocations. The [`dwarf`] module walks the `.debug_info` tree: it
//! enumerates compilation units, decodes debugging information entries (DIEs)
//! against their abbreviation tables on demand, and resolves typed attribute
//! values without copying section data.
//!
//! All parsers borrow the underlying bytes; a
//! [`ByteView`](spelunk_common::ByteView) is the usual owner of the buffer.
//!
//! # Example
//!
//! ```no_run
//! use spelunk_common::ByteView;
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
//!     println!("{}", root.tag());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod dwarf;
pub mod elf;
