use crate::disasm::Instruction;
use pyreasm_compiler_core::PyVersion;
use pyreasm_literal::LiteralError;
use std::fmt;
use thiserror::Error;

/// An assembly failure, tagged with the unit being assembled.
#[derive(Error, Debug)]
pub struct AsmError {
    pub unit: String,
    #[source]
    pub error: AsmErrorType,
}

impl AsmError {
    pub fn new(unit: impl Into<String>, error: AsmErrorType) -> Self {
        Self {
            unit: unit.into(),
            error,
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in {}: {}", self.unit, self.error)
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AsmErrorType {
    #[error("error at item {index} [{opname}, {arg:?}], opcode not valid for Python {version}")]
    UnknownOpcode {
        index: usize,
        opname: String,
        arg: Option<u32>,
        version: PyVersion,
    },
    #[error("operand {arg} of {opname} at item {index} does not fit its EXTENDED_ARG prefixes")]
    OperandOverflow {
        index: usize,
        opname: String,
        arg: u32,
    },
    #[error("EXTENDED_ARG at item {index} lists {listed}, but the operand after it needs {expected}")]
    ExtendedArgMismatch {
        index: usize,
        listed: u32,
        expected: u32,
    },
    #[error("EXTENDED_ARG at item {index} is not followed by an instruction with an operand")]
    DanglingExtendedArg { index: usize },
    #[error("{0} is referenced before it was assembled")]
    MissingCodeObject(String),
    #[error("malformed code object descriptor {0:?}")]
    MalformedCodeDescriptor(String),
    #[error("cell variable {index} is {existing:?}, but {found:?} claims the same slot")]
    CellVarConflict {
        index: u32,
        existing: String,
        found: String,
    },
    #[error("line number went back from {previous} at `{instruction}`")]
    LineRegression {
        previous: u32,
        instruction: Box<Instruction>,
    },
    #[error("invalid constant {text:?}: {source}")]
    Literal {
        text: String,
        #[source]
        source: LiteralError,
    },
    #[error("`{0}` is missing its operand")]
    MissingOperand(Box<Instruction>),
    #[error("no instructions found")]
    EmptyUnit,
    #[error("{0} is listed more than once")]
    DuplicateUnit(String),
}
