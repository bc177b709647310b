//! Finds the subprograms covering a program counter.

use anyhow::Context;
use clap::{Arg, Command};

use spelunk_common::ByteView;
use spelunk_debuginfo::dwarf::constants::*;
use spelunk_debuginfo::dwarf::{Die, Dwarf, ValueType};
use spelunk_debuginfo::elf::ElfObject;

/// Tests whether the DIE's address ranges cover the given PC.
///
/// `DW_AT_ranges` wins when present; otherwise `DW_AT_low_pc` is used with
/// `DW_AT_high_pc` interpreted either as an address or, per DWARF 4, as an
/// offset from the low PC.
fn contains_pc(die: &Die, pc: u64) -> bool {
    if die.has(DW_AT_ranges) {
        return die
            .attr(DW_AT_ranges)
            .and_then(|value| value.as_rangelist())
            .and_then(|list| list.contains(pc))
            .unwrap_or(false);
    }

    let Ok(low) = die.attr(DW_AT_low_pc).and_then(|value| value.as_address()) else {
        return false;
    };
    match die.attr(DW_AT_high_pc) {
        Ok(high) => {
            let high = match high.value_type() {
                ValueType::Address => high.as_address().ok(),
                _ => high.as_uconstant().ok().map(|offset| low + offset),
            };
            high.map_or(false, |high| low <= pc && pc < high)
        }
        Err(_) => pc == low,
    }
}

/// Depth-first search for the most specific subprograms covering `pc`.
fn find_pc(die: &Die, pc: u64, stack: &mut Vec<String>) -> anyhow::Result<bool> {
    let mut found = false;
    for child in die.children() {
        if find_pc(&child?, pc, stack)? {
            found = true;
            break;
        }
    }

    if die.tag() == DW_TAG_subprogram || die.tag() == DW_TAG_inlined_subroutine {
        if found || contains_pc(die, pc) {
            found = true;
            let name = die
                .attr(DW_AT_name)
                .and_then(|value| value.as_string_lossy().map(|s| s.into_owned()))
                .unwrap_or_else(|_| "<unnamed>".into());
            stack.push(format!("{} {}", die.tag(), name));
        }
    }

    Ok(found)
}

fn main() -> anyhow::Result<()> {
    let matches = Command::new("find_pc")
        .about("Finds the subprograms covering a program counter")
        .arg(Arg::new("elf-file").required(true))
        .arg(Arg::new("pc").required(true))
        .get_matches();
    let path = matches
        .get_one::<String>("elf-file")
        .context("elf-file is required")?;
    let pc = matches.get_one::<String>("pc").context("pc is required")?;
    let pc = u64::from_str_radix(pc.trim_start_matches("0x"), 16)
        .with_context(|| format!("cannot parse PC {pc}"))?;

    let view = ByteView::open(path).with_context(|| format!("failed to open {path}"))?;
    let elf = ElfObject::parse(&view)?;
    let dwarf = Dwarf::parse(&elf)?;

    let mut stack = Vec::new();
    for unit in dwarf.units() {
        let root = unit.root()?;
        if contains_pc(&root, pc) && find_pc(&root, pc, &mut stack)? {
            println!("found {pc:#x} in");
            for frame in stack.iter().rev() {
                println!("  {frame}");
            }
            return Ok(());
        }
    }

    println!("no compilation unit contains {pc:#x}");
    Ok(())
}
