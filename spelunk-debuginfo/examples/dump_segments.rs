//! Prints the program header table of an ELF file.

use anyhow::Context;
use clap::{Arg, Command};

use spelunk_common::ByteView;
use spelunk_debuginfo::elf::{segment_type_name, ElfObject};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("dump_segments")
        .about("Prints the program header table of an ELF file")
        .arg(Arg::new("elf-file").required(true))
        .get_matches();
    let path = matches
        .get_one::<String>("elf-file")
        .context("elf-file is required")?;

    let view = ByteView::open(path).with_context(|| format!("failed to open {path}"))?;
    let elf = ElfObject::parse(&view)?;

    println!(
        "{:<10} {:>16} {:>16} {:>10} {:>10}",
        "type", "offset", "vaddr", "filesz", "memsz"
    );
    for segment in elf.segments() {
        let header = segment.header();
        let ptype = segment_type_name(header.ptype)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{:#x}", header.ptype));
        println!(
            "{:<10} {:>16x} {:>16x} {:>10x} {:>10x}",
            ptype, header.offset, header.vaddr, header.filesz, header.memsz
        );
    }

    Ok(())
}
