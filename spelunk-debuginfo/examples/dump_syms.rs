//! Prints the symbol tables of an ELF file.

use anyhow::Context;
use clap::{Arg, Command};

use spelunk_common::ByteView;
use spelunk_debuginfo::elf::{
    symbol_binding_name, symbol_type_name, ElfObject, SHT_DYNSYM, SHT_SYMTAB,
};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("dump_syms")
        .about("Prints the symbol tables of an ELF file")
        .arg(Arg::new("elf-file").required(true))
        .get_matches();
    let path = matches
        .get_one::<String>("elf-file")
        .context("elf-file is required")?;

    let view = ByteView::open(path).with_context(|| format!("failed to open {path}"))?;
    let elf = ElfObject::parse(&view)?;

    for section in elf.sections() {
        let shtype = section.header().shtype;
        if shtype != SHT_SYMTAB && shtype != SHT_DYNSYM {
            continue;
        }

        println!("Symbol table '{}':", section.name());
        println!(
            "{:>16} {:>8} {:<8} {:<8} {}",
            "value", "size", "binding", "type", "name"
        );
        for sym in section.as_symtab(&elf)?.iter() {
            let binding = symbol_binding_name(sym.binding())
                .map(str::to_owned)
                .unwrap_or_else(|| sym.binding().to_string());
            let symbol_type = symbol_type_name(sym.symbol_type())
                .map(str::to_owned)
                .unwrap_or_else(|| sym.symbol_type().to_string());
            println!(
                "{:>16x} {:>8} {:<8} {:<8} {}",
                sym.value(),
                sym.size(),
                binding,
                symbol_type,
                sym.name().unwrap_or("<bad name>")
            );
        }
    }

    Ok(())
}
