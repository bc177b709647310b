//! Prints the DIE tree of every compilation unit in an ELF file.

use anyhow::Context;
use clap::{Arg, Command};

use spelunk_common::ByteView;
use spelunk_debuginfo::dwarf::{Die, Dwarf, Value, ValueType};
use spelunk_debuginfo::elf::ElfObject;

fn format_value(value: &Value) -> String {
    let formatted = match value.value_type() {
        ValueType::Invalid => Ok("<invalid>".into()),
        ValueType::Address => value.as_address().map(|addr| format!("{addr:#x}")),
        ValueType::Block => value.as_block().map(|block| format!("<{} bytes>", block.len())),
        ValueType::Exprloc => value
            .as_exprloc()
            .map(|expr| format!("<expr, {} bytes>", expr.len())),
        ValueType::Constant | ValueType::UConstant => {
            value.as_uconstant().map(|v| format!("{v:#x}"))
        }
        ValueType::SConstant => value.as_sconstant().map(|v| v.to_string()),
        ValueType::Flag => value.as_flag().map(|flag| flag.to_string()),
        ValueType::String => value.as_string_lossy().map(|s| s.into_owned()),
        ValueType::Reference => value
            .as_reference()
            .map(|die| format!("<{:#x}>", die.section_offset())),
        ValueType::LinePtr
        | ValueType::LocListPtr
        | ValueType::MacPtr
        | ValueType::RangeListPtr => value.as_sec_offset().map(|offset| format!("<{offset:#x}>")),
    };
    formatted.unwrap_or_else(|err| format!("<error: {err}>"))
}

fn dump_die(die: &Die, depth: usize) -> anyhow::Result<()> {
    println!(
        "{:indent$}<{:#x}> {}",
        "",
        die.section_offset(),
        die.tag(),
        indent = depth
    );
    for (name, value) in die.attributes()? {
        println!(
            "{:indent$}      {} {}",
            "",
            name,
            format_value(&value),
            indent = depth
        );
    }
    for child in die.children() {
        dump_die(&child?, depth + 6)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let matches = Command::new("dump_tree")
        .about("Prints the DIE tree of every compilation unit in an ELF file")
        .arg(Arg::new("elf-file").required(true))
        .get_matches();
    let path = matches
        .get_one::<String>("elf-file")
        .context("elf-file is required")?;

    let view = ByteView::open(path).with_context(|| format!("failed to open {path}"))?;
    let elf = ElfObject::parse(&view)?;
    let dwarf = Dwarf::parse(&elf)?;

    for unit in dwarf.units() {
        println!(
            "compilation unit at {:#x} (DWARF v{})",
            unit.section_offset(),
            unit.unit().version()
        );
        dump_die(&unit.root()?, 0)?;
    }

    Ok(())
}
