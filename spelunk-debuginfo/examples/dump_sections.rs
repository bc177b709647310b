//! Prints the section table of an ELF file.

use anyhow::Context;
use clap::{Arg, Command};

use spelunk_common::ByteView;
use spelunk_debuginfo::elf::{section_type_name, ElfObject};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("dump_sections")
        .about("Prints the section table of an ELF file")
        .arg(Arg::new("elf-file").required(true))
        .get_matches();
    let path = matches
        .get_one::<String>("elf-file")
        .context("elf-file is required")?;

    let view = ByteView::open(path).with_context(|| format!("failed to open {path}"))?;
    let elf = ElfObject::parse(&view)?;

    println!(
        "{:<4} {:<20} {:<10} {:>16} {:>10}",
        "idx", "name", "type", "addr", "size"
    );
    for (index, section) in elf.sections().iter().enumerate() {
        let header = section.header();
        let shtype = section_type_name(header.shtype)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{:#x}", header.shtype));
        println!(
            "{:<4} {:<20} {:<10} {:>16x} {:>10x}",
            index,
            section.name(),
            shtype,
            header.addr,
            header.size
        );
    }

    Ok(())
}
