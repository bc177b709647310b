//! Tests against synthetic ELF files of both classes and byte orders.

use similar_asserts::assert_eq;

use spelunk_debuginfo::elf::{Class, ElfErrorKind, ElfObject, Encoding};

type Error = Box<dyn std::error::Error>;

fn w16(out: &mut Vec<u8>, be: bool, value: u16) {
    out.extend_from_slice(&if be {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    });
}

fn w32(out: &mut Vec<u8>, be: bool, value: u32) {
    out.extend_from_slice(&if be {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    });
}

fn w64(out: &mut Vec<u8>, be: bool, value: u64) {
    out.extend_from_slice(&if be {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    });
}

/// A 64-bit little-endian executable with a text section, a symbol table,
/// and a relocation section.
fn build_elf64() -> Vec<u8> {
    let be = false;
    let mut out = vec![0u8; 64];

    let phoff = out.len() as u64;
    // PT_LOAD, readable and executable, covering the file start.
    w32(&mut out, be, 1);
    w32(&mut out, be, 5);
    w64(&mut out, be, 0);
    w64(&mut out, be, 0x40_0000);
    w64(&mut out, be, 0x40_0000);
    w64(&mut out, be, 0x80);
    w64(&mut out, be, 0x100);
    w64(&mut out, be, 0x1000);

    let text_off = out.len() as u64;
    let text = b"\x55\x48\x89\xe5";
    out.extend_from_slice(text);

    let strtab_off = out.len() as u64;
    let strtab = b"\0main\0";
    out.extend_from_slice(strtab);

    let symtab_off = out.len() as u64;
    out.extend_from_slice(&[0u8; 24]);
    w32(&mut out, be, 1); // name: "main"
    out.push(0x12); // GLOBAL | FUNC
    out.push(0);
    w16(&mut out, be, 1); // defined in .text
    w64(&mut out, be, 0x40_0000);
    w64(&mut out, be, 4);

    let rela_off = out.len() as u64;
    w64(&mut out, be, 0x10);
    w64(&mut out, be, (1u64 << 32) | 2);
    w64(&mut out, be, (-4i64) as u64);

    let shstrtab_off = out.len() as u64;
    let shstrtab = b"\0.text\0.symtab\0.strtab\0.shstrtab\0.rela.text\0";
    out.extend_from_slice(shstrtab);

    let shoff = out.len() as u64;
    let shdr = |out: &mut Vec<u8>,
                    name: u32,
                    shtype: u32,
                    flags: u64,
                    addr: u64,
                    offset: u64,
                    size: u64,
                    link: u32,
                    info: u32,
                    addralign: u64,
                    entsize: u64| {
        w32(out, be, name);
        w32(out, be, shtype);
        w64(out, be, flags);
        w64(out, be, addr);
        w64(out, be, offset);
        w64(out, be, size);
        w32(out, be, link);
        w32(out, be, info);
        w64(out, be, addralign);
        w64(out, be, entsize);
    };

    shdr(&mut out, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0);
    shdr(&mut out, 1, 1, 6, 0x40_0000, text_off, text.len() as u64, 0, 0, 16, 0);
    shdr(&mut out, 7, 2, 0, 0, symtab_off, 48, 3, 1, 8, 24);
    shdr(&mut out, 15, 3, 0, 0, strtab_off, strtab.len() as u64, 0, 0, 1, 0);
    shdr(&mut out, 23, 3, 0, 0, shstrtab_off, shstrtab.len() as u64, 0, 0, 1, 0);
    shdr(&mut out, 33, 4, 0, 0, rela_off, 24, 2, 1, 8, 24);

    // Patch the file header.
    let mut ehdr = Vec::new();
    ehdr.extend_from_slice(b"\x7fELF");
    ehdr.push(2); // ELFCLASS64
    ehdr.push(1); // ELFDATA2LSB
    ehdr.push(1); // EV_CURRENT
    ehdr.extend_from_slice(&[0u8; 9]);
    w16(&mut ehdr, be, 2); // ET_EXEC
    w16(&mut ehdr, be, 0x3e); // EM_X86_64
    w32(&mut ehdr, be, 1);
    w64(&mut ehdr, be, 0x40_0000);
    w64(&mut ehdr, be, phoff);
    w64(&mut ehdr, be, shoff);
    w32(&mut ehdr, be, 0);
    w16(&mut ehdr, be, 64);
    w16(&mut ehdr, be, 56);
    w16(&mut ehdr, be, 1);
    w16(&mut ehdr, be, 64);
    w16(&mut ehdr, be, 6);
    w16(&mut ehdr, be, 4);
    out[..64].copy_from_slice(&ehdr);

    out
}

/// The same logical 32-bit file in either byte order: a `.data` section and
/// the section name string table.
fn build_elf32(be: bool) -> Vec<u8> {
    let mut out = vec![0u8; 52];

    let data_off = out.len() as u64;
    out.extend_from_slice(b"abcd");

    let shstrtab_off = out.len() as u64;
    let shstrtab = b"\0.data\0.shstrtab\0";
    out.extend_from_slice(shstrtab);

    let shoff = out.len() as u64;
    let shdr = |out: &mut Vec<u8>,
                    name: u32,
                    shtype: u32,
                    flags: u32,
                    addr: u32,
                    offset: u32,
                    size: u32,
                    link: u32,
                    info: u32,
                    addralign: u32,
                    entsize: u32| {
        for value in [name, shtype, flags, addr, offset, size, link, info, addralign, entsize] {
            w32(out, be, value);
        }
    };

    shdr(&mut out, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0);
    shdr(&mut out, 1, 1, 3, 0x1000, data_off as u32, 4, 0, 0, 4, 0);
    shdr(&mut out, 7, 3, 0, 0, shstrtab_off as u32, shstrtab.len() as u32, 0, 0, 1, 0);

    let mut ehdr = Vec::new();
    ehdr.extend_from_slice(b"\x7fELF");
    ehdr.push(1); // ELFCLASS32
    ehdr.push(if be { 2 } else { 1 });
    ehdr.push(1);
    ehdr.extend_from_slice(&[0u8; 9]);
    w16(&mut ehdr, be, 2);
    w16(&mut ehdr, be, 3); // EM_386
    w32(&mut ehdr, be, 1);
    w32(&mut ehdr, be, 0x1000);
    w32(&mut ehdr, be, 0);
    w32(&mut ehdr, be, shoff as u32);
    w32(&mut ehdr, be, 0);
    w16(&mut ehdr, be, 52);
    w16(&mut ehdr, be, 32);
    w16(&mut ehdr, be, 0);
    w16(&mut ehdr, be, 40);
    w16(&mut ehdr, be, 3);
    w16(&mut ehdr, be, 2);
    out[..52].copy_from_slice(&ehdr);

    out
}

#[test]
fn test_parse_elf64() -> Result<(), Error> {
    let data = build_elf64();
    assert!(ElfObject::test(&data));

    let elf = ElfObject::parse(&data)?;
    assert_eq!(elf.class(), Class::Elf64);
    assert_eq!(elf.encoding(), Encoding::Lsb);

    let header = elf.header();
    assert_eq!(header.etype, 2);
    assert_eq!(header.machine, 0x3e);
    assert_eq!(header.entry, 0x40_0000);
    assert_eq!(header.shnum, 6);

    let names: Vec<_> = elf.sections().iter().map(|s| s.name()).collect();
    assert_eq!(
        names,
        vec!["", ".text", ".symtab", ".strtab", ".shstrtab", ".rela.text"]
    );

    let text = elf.section_by_name(".text").ok_or("no .text")?;
    assert_eq!(text.data(), Some(&b"\x55\x48\x89\xe5"[..]));
    assert_eq!(text.size(), 4);

    assert!(elf.section_by_name(".bogus").is_none());
    assert!(elf.section(100).is_none());

    Ok(())
}

#[test]
fn test_symbols() -> Result<(), Error> {
    let data = build_elf64();
    let elf = ElfObject::parse(&data)?;

    assert_eq!(elf.sym_entry_size(), 24);

    let symtab = elf
        .section_by_name(".symtab")
        .ok_or("no .symtab")?
        .as_symtab(&elf)?;
    assert_eq!(symtab.len(), 2);

    let main = symtab.get(1)?;
    assert_eq!(main.name()?, "main");
    assert_eq!(main.binding(), 1); // GLOBAL
    assert_eq!(main.symbol_type(), 2); // FUNC
    assert_eq!(main.value(), 0x40_0000);
    assert_eq!(main.size(), 4);

    let names: Vec<_> = symtab
        .iter()
        .map(|sym| sym.name().unwrap_or(""))
        .collect();
    assert_eq!(names, vec!["", "main"]);

    assert!(symtab.get(2).is_err());

    Ok(())
}

#[test]
fn test_relocations() -> Result<(), Error> {
    let data = build_elf64();
    let elf = ElfObject::parse(&data)?;

    let rela = elf.section_by_name(".rela.text").ok_or("no .rela.text")?;
    let entries: Vec<_> = rela.relas()?.collect();
    assert_eq!(entries.len(), 1);

    let entry = entries[0];
    assert_eq!(entry.offset, 0x10);
    assert_eq!(entry.sym_index(), 1);
    assert_eq!(entry.rel_type(), 2);
    assert_eq!(entry.addend, -4);

    // A RELA section does not project as REL.
    assert!(rela.rels().is_err());

    Ok(())
}

#[test]
fn test_segments() -> Result<(), Error> {
    let data = build_elf64();
    let elf = ElfObject::parse(&data)?;

    assert_eq!(elf.segments().len(), 1);
    let segment = elf.segment(0).ok_or("no segment")?;
    assert_eq!(segment.header().ptype, 1); // PT_LOAD
    assert_eq!(segment.file_size(), 0x80);
    assert_eq!(segment.mem_size(), 0x100);
    assert_eq!(segment.data().map(|d| d.len()), Some(0x80));

    assert!(elf.segment(1).is_none());

    Ok(())
}

#[test]
fn test_section_type_mismatch() -> Result<(), Error> {
    let data = build_elf64();
    let elf = ElfObject::parse(&data)?;

    let text = elf.section_by_name(".text").ok_or("no .text")?;
    let err = text.as_strtab().unwrap_err();
    assert!(matches!(
        err.kind(),
        ElfErrorKind::SectionTypeMismatch { .. }
    ));

    Ok(())
}

#[test]
fn test_strtab_bounds() -> Result<(), Error> {
    let data = build_elf64();
    let elf = ElfObject::parse(&data)?;

    let strtab = elf
        .section_by_name(".strtab")
        .ok_or("no .strtab")?
        .as_strtab()?;
    assert_eq!(strtab.get(1)?, "main");

    let err = strtab.get(1000).unwrap_err();
    assert!(matches!(
        err.kind(),
        ElfErrorKind::StringOffsetOutOfRange(1000)
    ));

    Ok(())
}

#[test]
fn test_byte_order_canonicalization() -> Result<(), Error> {
    let lsb = build_elf32(false);
    let msb = build_elf32(true);

    let elf_lsb = ElfObject::parse(&lsb)?;
    let elf_msb = ElfObject::parse(&msb)?;

    assert_eq!(elf_lsb.class(), Class::Elf32);
    assert_eq!(elf_msb.class(), Class::Elf32);
    assert_eq!(elf_lsb.encoding(), Encoding::Lsb);
    assert_eq!(elf_msb.encoding(), Encoding::Msb);

    // The canonical headers of the two twins are identical.
    assert_eq!(elf_lsb.header(), elf_msb.header());

    assert_eq!(elf_lsb.sections().len(), elf_msb.sections().len());
    for (a, b) in elf_lsb.sections().iter().zip(elf_msb.sections()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.size(), b.size());
        assert_eq!(a.header(), b.header());
    }

    let data = elf_lsb.section_by_name(".data").ok_or("no .data")?;
    assert_eq!(data.data(), Some(&b"abcd"[..]));

    Ok(())
}

#[test]
fn test_header_validation() {
    // Bad magic.
    let err = ElfObject::parse(b"NOPE").unwrap_err();
    assert!(matches!(err.kind(), ElfErrorKind::BadMagic));
    assert!(!ElfObject::test(b"NOPE"));

    // Bad class byte.
    let mut data = build_elf64();
    data[4] = 9;
    let err = ElfObject::parse(&data).unwrap_err();
    assert!(matches!(err.kind(), ElfErrorKind::BadClass(9)));

    // Bad encoding byte.
    let mut data = build_elf64();
    data[5] = 0;
    let err = ElfObject::parse(&data).unwrap_err();
    assert!(matches!(err.kind(), ElfErrorKind::BadEncoding(0)));

    // Bad identification version.
    let mut data = build_elf64();
    data[6] = 2;
    let err = ElfObject::parse(&data).unwrap_err();
    assert!(matches!(err.kind(), ElfErrorKind::UnknownIdentVersion(2)));

    // Truncated header.
    let data = build_elf64();
    let err = ElfObject::parse(&data[..32]).unwrap_err();
    assert!(matches!(err.kind(), ElfErrorKind::UnexpectedEof));

    // Section name string table index out of bounds.
    let mut data = build_elf32(false);
    let shstrndx = 50;
    data[50] = shstrndx as u8; // e_shstrndx lives at offset 50 in ELF32
    data[51] = 0;
    let err = ElfObject::parse(&data).unwrap_err();
    assert!(matches!(
        err.kind(),
        ElfErrorKind::BadSectionStringTableIndex { .. }
    ));
}
