//! Reassembles `dis.dis` listings of CPython 3.6 - 3.9 into code objects.
//!
//! The pipeline for one unit is [`disasm::parse_instructions`], then
//! [`symboltable::SymbolTable::scan`] and [`encode::encode`], combined by
//! [`assemble::Assembler`]. [`split::split_units`] cuts a dump holding
//! nested code objects into units.

#[macro_use]
extern crate log;

type IndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

pub mod assemble;
pub mod disasm;
pub mod encode;
pub mod error;
pub mod split;
pub mod symboltable;

pub use assemble::{AsmOpts, AssembledUnit, AssembledUnits, Assembler, LineRegression};
pub use split::UnitKey;
