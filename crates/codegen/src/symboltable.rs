/* The four index tables of a code object are rebuilt from the operand
annotations of its listing: `LOAD_NAME 3 (print)` tells us that
`co_names[3] == "print"`, and so on.

Every instruction is classified into a `TableAction` once, and the action
records what the annotation reveals. Tables are sparse while scanning and
are made dense when the code object is built.
*/

use crate::{
    assemble::{AssembledUnits, LineRegression},
    disasm::Instruction,
    error::AsmErrorType,
    split::UnitKey,
};
use pyreasm_compiler_core::{
    bytecode::{CodeFlags, ConstantData},
    lnotab::{LineStep, LineTableEncoder},
};
use std::collections::BTreeMap;

/// What an instruction contributes to the tables of its unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TableAction {
    /// `co_consts[arg]` is a literal or a nested code object.
    LoadConst,
    /// `co_names[arg]`, also tracked as a global.
    Global,
    /// `co_names[arg]`
    Name,
    /// `co_varnames[arg]`; a load of a name not seen before is an argument.
    LoadLocal,
    /// `co_varnames[arg]`
    StoreLocal,
    /// `co_cellvars[arg]`, which must stay consistent across instructions.
    Deref,
    /// The unit is a generator.
    SetGenerator,
    None,
}

impl TableAction {
    pub fn classify(opname: &str) -> Self {
        match opname {
            "LOAD_CONST" => Self::LoadConst,
            "LOAD_GLOBAL" | "STORE_GLOBAL" | "DELETE_GLOBAL" => Self::Global,
            "LOAD_NAME" | "STORE_NAME" | "DELETE_NAME" | "LOAD_ATTR" | "STORE_ATTR"
            | "DELETE_ATTR" | "LOAD_METHOD" | "IMPORT_NAME" | "IMPORT_FROM"
            | "STORE_ANNOTATION" => Self::Name,
            "LOAD_FAST" => Self::LoadLocal,
            "STORE_FAST" | "DELETE_FAST" => Self::StoreLocal,
            "LOAD_DEREF" | "LOAD_CLOSURE" | "STORE_DEREF" | "DELETE_DEREF"
            | "LOAD_CLASSDEREF" => Self::Deref,
            "YIELD_VALUE" | "YIELD_FROM" => Self::SetGenerator,
            _ => Self::None,
        }
    }

    /// Records what `ins` reveals into `tables`.
    pub fn apply(
        self,
        tables: &mut SymbolTable,
        ins: &Instruction,
        assembled: &AssembledUnits,
    ) -> Result<(), AsmErrorType> {
        match self {
            Self::None => {}
            Self::SetGenerator => tables.flags |= CodeFlags::GENERATOR,
            Self::LoadConst => {
                let (index, text) = operand(ins)?;
                tables.constants.insert(index, load_constant(text, assembled)?);
            }
            Self::Global => {
                let (index, name) = operand(ins)?;
                tables.globals.insert(index, name.to_owned());
                tables.names.insert(index, name.to_owned());
            }
            Self::Name => {
                let (index, name) = operand(ins)?;
                tables.names.insert(index, name.to_owned());
            }
            Self::LoadLocal => {
                let (index, name) = operand(ins)?;
                if !tables.varnames.values().any(|known| known == name) {
                    tables.arg_names.push(name.to_owned());
                    tables.varnames.insert(index, name.to_owned());
                }
            }
            Self::StoreLocal => {
                let (index, name) = operand(ins)?;
                tables.varnames.insert(index, name.to_owned());
            }
            Self::Deref => {
                let (index, name) = operand(ins)?;
                match tables.cellvars.get(&index) {
                    Some(existing) if existing != name => {
                        return Err(AsmErrorType::CellVarConflict {
                            index,
                            existing: existing.clone(),
                            found: name.to_owned(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        tables.cellvars.insert(index, name.to_owned());
                    }
                }
            }
        }
        Ok(())
    }
}

fn operand(ins: &Instruction) -> Result<(u32, &str), AsmErrorType> {
    match (ins.arg, ins.argval.as_deref()) {
        (Some(arg), Some(argval)) => Ok((arg, argval)),
        _ => Err(AsmErrorType::MissingOperand(Box::new(ins.clone()))),
    }
}

fn load_constant(text: &str, assembled: &AssembledUnits) -> Result<ConstantData, AsmErrorType> {
    if text.starts_with("<code object") {
        let key = UnitKey::from_descriptor(text)
            .ok_or_else(|| AsmErrorType::MalformedCodeDescriptor(text.to_owned()))?;
        let unit = assembled
            .get(&key)
            .ok_or_else(|| AsmErrorType::MissingCodeObject(key.to_string()))?;
        return Ok(ConstantData::Code {
            code: Box::new(unit.code.clone()),
        });
    }
    pyreasm_literal::parse_literal(text)
        .map(ConstantData::from)
        .map_err(|source| AsmErrorType::Literal {
            text: text.to_owned(),
            source,
        })
}

/// The sparse tables of one unit, filled while scanning its listing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SymbolTable {
    pub constants: BTreeMap<u32, ConstantData>,
    /// Global references; a subset of `names`.
    pub globals: BTreeMap<u32, String>,
    pub names: BTreeMap<u32, String>,
    pub varnames: BTreeMap<u32, String>,
    pub cellvars: BTreeMap<u32, String>,
    /// Locals loaded before any store, in order of first appearance.
    pub arg_names: Vec<String>,
    pub flags: CodeFlags,
    pub first_line: u32,
    pub lnotab: Vec<u8>,
}

fn densify<T: Clone>(table: &BTreeMap<u32, T>, fill: T) -> Box<[T]> {
    let len = table.keys().next_back().map_or(0, |&max| max as usize + 1);
    (0..len)
        .map(|index| table.get(&(index as u32)).unwrap_or(&fill).clone())
        .collect()
}

impl SymbolTable {
    /// Scans `instructions` once, recording table entries and the line
    /// table.
    pub fn scan(
        instructions: &[Instruction],
        assembled: &AssembledUnits,
        line_regression: LineRegression,
    ) -> Result<Self, AsmErrorType> {
        let mut tables = Self {
            first_line: instructions.first().ok_or(AsmErrorType::EmptyUnit)?.line_num,
            ..Self::default()
        };
        let mut lines = LineTableEncoder::new();
        for ins in instructions {
            if let LineStep::Regressed { previous } = lines.step(ins.offset, ins.line_num) {
                match line_regression {
                    LineRegression::Error => {
                        return Err(AsmErrorType::LineRegression {
                            previous,
                            instruction: Box::new(ins.clone()),
                        });
                    }
                    LineRegression::Warn => {
                        warn!("line number went back from {previous} at `{ins}`");
                    }
                }
            }
            let action = TableAction::classify(&ins.opname);
            trace!("{action:?}: {ins}");
            action.apply(&mut tables, ins, assembled)?;
        }
        tables.lnotab = lines.finish();
        Ok(tables)
    }

    /// `co_consts`, with `None` in unused slots.
    pub fn dense_constants(&self) -> Box<[ConstantData]> {
        densify(&self.constants, ConstantData::None)
    }

    pub fn dense_names(&self) -> Box<[String]> {
        densify(&self.names, String::new())
    }

    pub fn dense_varnames(&self) -> Box<[String]> {
        densify(&self.varnames, String::new())
    }

    pub fn dense_cellvars(&self) -> Box<[String]> {
        densify(&self.cellvars, String::new())
    }
}
