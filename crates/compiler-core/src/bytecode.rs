//! Code objects in the CPython 3.6 - 3.9 layout, and their disassembly.

use crate::{
    lnotab,
    opcode::{CMP_OP, EXTENDED_ARG, HAVE_ARGUMENT, OpKind, OpcodeTable},
};
use bitflags::bitflags;
use core::{fmt, mem, ops::Deref};
use itertools::Itertools;
use malachite_bigint::BigInt;
use num_complex::Complex64;
use pyreasm_literal::{Literal, escape, float};
use std::collections::BTreeSet;

/// A constant of a code object: a literal value, or a nested code object.
///
/// # Examples
/// ```
/// use pyreasm_compiler_core::bytecode::ConstantData;
/// let a = ConstantData::Float { value: 120f64 };
/// let b = ConstantData::Boolean { value: false };
/// assert_ne!(a, b);
/// assert_eq!(a.to_string(), "120.0");
/// ```
#[derive(Debug, Clone)]
pub enum ConstantData {
    Tuple { elements: Vec<ConstantData> },
    List { elements: Vec<ConstantData> },
    Dict { entries: Vec<(ConstantData, ConstantData)> },
    Set { elements: Vec<ConstantData> },
    FrozenSet { elements: Vec<ConstantData> },
    Integer { value: BigInt },
    Float { value: f64 },
    Complex { value: Complex64 },
    Boolean { value: bool },
    Str { value: String },
    Bytes { value: Vec<u8> },
    Code { code: Box<CodeObject> },
    None,
    Ellipsis,
}

impl PartialEq for ConstantData {
    fn eq(&self, other: &Self) -> bool {
        use ConstantData::*;

        match (self, other) {
            (Integer { value: a }, Integer { value: b }) => a == b,
            // floats compare by bit pattern, so -0.0 != 0.0 and nan == nan
            (Float { value: a }, Float { value: b }) => a.to_bits() == b.to_bits(),
            (Complex { value: a }, Complex { value: b }) => {
                a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits()
            }
            (Boolean { value: a }, Boolean { value: b }) => a == b,
            (Str { value: a }, Str { value: b }) => a == b,
            (Bytes { value: a }, Bytes { value: b }) => a == b,
            (Code { code: a }, Code { code: b }) => a == b,
            (Tuple { elements: a }, Tuple { elements: b })
            | (List { elements: a }, List { elements: b })
            | (Set { elements: a }, Set { elements: b })
            | (FrozenSet { elements: a }, FrozenSet { elements: b }) => a == b,
            (Dict { entries: a }, Dict { entries: b }) => a == b,
            (None, None) => true,
            (Ellipsis, Ellipsis) => true,
            _ => false,
        }
    }
}

impl Eq for ConstantData {}

impl From<Literal> for ConstantData {
    fn from(literal: Literal) -> Self {
        fn all(items: Vec<Literal>) -> Vec<ConstantData> {
            items.into_iter().map(ConstantData::from).collect()
        }

        match literal {
            Literal::None => Self::None,
            Literal::Ellipsis => Self::Ellipsis,
            Literal::Bool(value) => Self::Boolean { value },
            Literal::Int(value) => Self::Integer { value },
            Literal::Float(value) => Self::Float { value },
            Literal::Complex(value) => Self::Complex { value },
            Literal::Str(value) => Self::Str { value },
            Literal::Bytes(value) => Self::Bytes { value },
            Literal::Tuple(items) => Self::Tuple {
                elements: all(items),
            },
            Literal::List(items) => Self::List {
                elements: all(items),
            },
            Literal::Set(items) => Self::Set {
                elements: all(items),
            },
            Literal::FrozenSet(items) => Self::FrozenSet {
                elements: all(items),
            },
            Literal::Dict(entries) => Self::Dict {
                entries: entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            },
        }
    }
}

/// Renders the constant the way `repr` does in `dis` output.
impl fmt::Display for ConstantData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConstantData::*;

        let seq = |f: &mut fmt::Formatter<'_>, elements: &[ConstantData]| {
            write!(f, "{}", elements.iter().format(", "))
        };
        match self {
            Integer { value } => write!(f, "{value}"),
            Float { value } => f.write_str(&float::to_repr(*value)),
            Complex { value } => f.write_str(&float::complex_repr(*value)),
            Boolean { value } => f.write_str(if *value { "True" } else { "False" }),
            Str { value } => escape::write_str_repr(value, f),
            Bytes { value } => escape::write_bytes_repr(value, f),
            Code { code } => write!(f, "{code}"),
            Tuple { elements } => {
                f.write_str("(")?;
                seq(f, elements)?;
                if elements.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            List { elements } => {
                f.write_str("[")?;
                seq(f, elements)?;
                f.write_str("]")
            }
            Set { elements } if elements.is_empty() => f.write_str("set()"),
            Set { elements } => {
                f.write_str("{")?;
                seq(f, elements)?;
                f.write_str("}")
            }
            FrozenSet { elements } if elements.is_empty() => f.write_str("frozenset()"),
            FrozenSet { elements } => {
                f.write_str("frozenset({")?;
                seq(f, elements)?;
                f.write_str("})")
            }
            Dict { entries } => write!(
                f,
                "{{{}}}",
                entries
                    .iter()
                    .format_with(", ", |(k, v), f| f(&format_args!("{k}: {v}")))
            ),
            None => f.write_str("None"),
            Ellipsis => f.write_str("Ellipsis"),
        }
    }
}

bitflags! {
    /// `co_flags`
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct CodeFlags: u32 {
        const OPTIMIZED = 0x0001;
        const NEWLOCALS = 0x0002;
        const VARARGS = 0x0004;
        const VARKEYWORDS = 0x0008;
        const NESTED = 0x0010;
        const GENERATOR = 0x0020;
        const NOFREE = 0x0040;
        const COROUTINE = 0x0080;
        const ITERABLE_COROUTINE = 0x0100;
        const ASYNC_GENERATOR = 0x0200;
    }
}

/// an opcode argument that may be extended by a prior EXTENDED_ARG
#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(transparent)]
pub struct OpArgByte(pub u8);

impl From<u8> for OpArgByte {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for OpArgByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// a full oparg, including any EXTENDED_ARG prefixes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct OpArg(pub u32);

#[derive(Default, Copy, Clone)]
#[repr(transparent)]
pub struct OpArgState {
    state: u32,
}

impl OpArgState {
    #[inline(always)]
    pub fn get(&mut self, unit: CodeUnit) -> (u8, OpArg) {
        let arg = self.extend(unit.arg);
        if unit.op != EXTENDED_ARG {
            self.reset();
        }
        (unit.op, arg)
    }

    #[inline(always)]
    pub fn extend(&mut self, arg: OpArgByte) -> OpArg {
        self.state = (self.state << 8) | u32::from(arg.0);
        OpArg(self.state)
    }

    #[inline(always)]
    pub const fn reset(&mut self) {
        self.state = 0
    }
}

/// One 2-byte wordcode instruction: opcode followed by its argument byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct CodeUnit {
    pub op: u8,
    pub arg: OpArgByte,
}

const _: () = assert!(mem::size_of::<CodeUnit>() == 2);

impl CodeUnit {
    pub const fn new(op: u8, arg: u8) -> Self {
        Self {
            op,
            arg: OpArgByte(arg),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct CodeUnits(Box<[CodeUnit]>);

impl CodeUnits {
    /// The raw `co_code` byte string.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|unit| [unit.op, unit.arg.0]).collect()
    }
}

impl fmt::Debug for CodeUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodeUnits({:?})", self.to_bytes())
    }
}

impl From<Vec<CodeUnit>> for CodeUnits {
    fn from(value: Vec<CodeUnit>) -> Self {
        Self(value.into_boxed_slice())
    }
}

impl FromIterator<CodeUnit> for CodeUnits {
    fn from_iter<T: IntoIterator<Item = CodeUnit>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Deref for CodeUnits {
    type Target = [CodeUnit];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Primary container of a single code object. Each python function has
/// a code object. Also a module has a code object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeObject {
    pub instructions: CodeUnits,
    pub flags: CodeFlags,
    /// Number of positional-only arguments
    pub posonlyarg_count: u32,
    pub arg_count: u32,
    pub kwonlyarg_count: u32,
    /// `co_nlocals`
    pub local_count: u32,
    pub max_stackdepth: u32,
    pub source_path: String,
    pub first_line_number: u32,
    /// Name of the object that created this code object
    pub obj_name: String,
    pub constants: Box<[ConstantData]>,
    pub names: Box<[String]>,
    pub varnames: Box<[String]>,
    pub cellvars: Box<[String]>,
    pub freevars: Box<[String]>,
    /// `co_lnotab`
    pub lnotab: Box<[u8]>,
}

/// The `repr` of a code object.
impl fmt::Display for CodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<code object {} at {:p}, file \"{}\", line {}>",
            self.obj_name, self, self.source_path, self.first_line_number
        )
    }
}

impl CodeObject {
    /// Offsets targeted by the jump instructions of this code object.
    pub fn label_targets(&self, table: &OpcodeTable) -> BTreeSet<u32> {
        let mut targets = BTreeSet::new();
        let mut arg_state = OpArgState::default();
        for (index, unit) in self.instructions.iter().enumerate() {
            let (op, OpArg(arg)) = arg_state.get(*unit);
            match table.def(op).map(|def| def.kind) {
                Some(OpKind::JumpRel) => {
                    targets.insert(index as u32 * 2 + 2 + arg);
                }
                Some(OpKind::JumpAbs) => {
                    targets.insert(arg);
                }
                _ => {}
            }
        }
        targets
    }

    /// The `(argval annotation)` `dis` prints after an operand.
    fn arg_repr(&self, kind: OpKind, name: &str, offset: u32, arg: u32) -> Option<String> {
        let index = arg as usize;
        let pick = |names: &[String]| names.get(index).cloned();
        match kind {
            OpKind::Const => self.constants.get(index).map(|c| c.to_string()),
            OpKind::Name => pick(&self.names),
            OpKind::Local => pick(&self.varnames),
            OpKind::Free => self
                .cellvars
                .iter()
                .chain(self.freevars.iter())
                .nth(index)
                .cloned(),
            OpKind::JumpRel => Some(format!("to {}", offset + 2 + arg)),
            OpKind::Compare => CMP_OP.get(index).map(|&op| op.to_owned()),
            OpKind::Arg if name == "FORMAT_VALUE" => {
                let mut repr = ["", "str", "repr", "ascii"][index & 0x3].to_owned();
                if arg & 0x4 != 0 {
                    if !repr.is_empty() {
                        repr.push_str(", ");
                    }
                    repr.push_str("with format");
                }
                Some(repr)
            }
            OpKind::Arg | OpKind::NoArg | OpKind::JumpAbs => None,
        }
        .filter(|repr| !repr.is_empty())
    }

    fn display_inner(
        &self,
        f: &mut fmt::Formatter<'_>,
        table: &OpcodeTable,
        expand_code_objects: bool,
    ) -> fmt::Result {
        let label_targets = self.label_targets(table);
        let line_starts = lnotab::line_starts(&self.lnotab, self.first_line_number);
        let mut starts = line_starts.iter().peekable();
        let mut arg_state = OpArgState::default();
        for (index, unit) in self.instructions.iter().enumerate() {
            let offset = index as u32 * 2;
            let (op, OpArg(arg)) = arg_state.get(*unit);

            let mut line = None;
            while let Some(&&(start, start_line)) = starts.peek() {
                if start > offset {
                    break;
                }
                if start == offset {
                    line = Some(start_line);
                }
                starts.next();
            }

            let mut text = String::new();
            if line.is_some() && offset > 0 {
                writeln!(f)?;
            }
            match line {
                Some(line) => text.push_str(&format!("{line:3}")),
                None => text.push_str("   "),
            }
            let arrow = if label_targets.contains(&offset) {
                ">>"
            } else {
                "  "
            };
            text.push_str(&format!("     {arrow} {offset:4} "));

            let def = table.def(op);
            let name = def.map_or("<unknown>", |def| def.name);
            text.push_str(&format!("{name:20}"));
            if op >= HAVE_ARGUMENT {
                text.push_str(&format!(" {arg:5}"));
                let kind = def.map_or(OpKind::Arg, |def| def.kind);
                if let Some(repr) = self.arg_repr(kind, name, offset, arg) {
                    text.push_str(&format!(" ({repr})"));
                }
            }
            writeln!(f, "{}", text.trim_end())?;
        }

        if expand_code_objects {
            for constant in &*self.constants {
                if let ConstantData::Code { code } = constant {
                    writeln!(f, "\nDisassembly of {code}:")?;
                    code.display_inner(f, table, true)?;
                }
            }
        }
        Ok(())
    }

    /// Disassembles this code object alone, like `dis.disassemble`.
    pub fn display<'a>(&'a self, table: &'a OpcodeTable) -> impl fmt::Display + 'a {
        struct Display<'a>(&'a CodeObject, &'a OpcodeTable);
        impl fmt::Display for Display<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.display_inner(f, self.1, false)
            }
        }
        Display(self, table)
    }

    /// Recursively disassembles this code object and every nested one,
    /// like `dis.dis`.
    pub fn display_expand_code_objects<'a>(
        &'a self,
        table: &'a OpcodeTable,
    ) -> impl fmt::Display + 'a {
        struct Display<'a>(&'a CodeObject, &'a OpcodeTable);
        impl fmt::Display for Display<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.display_inner(f, self.1, true)
            }
        }
        Display(self, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PyVersion;

    fn table() -> &'static OpcodeTable {
        OpcodeTable::for_version(PyVersion::new(3, 8)).unwrap()
    }

    fn code(units: &[(u8, u8)], lnotab: &[u8]) -> CodeObject {
        CodeObject {
            instructions: units.iter().map(|&(op, arg)| CodeUnit::new(op, arg)).collect(),
            flags: CodeFlags::empty(),
            posonlyarg_count: 0,
            arg_count: 1,
            kwonlyarg_count: 0,
            local_count: 1,
            max_stackdepth: 100,
            source_path: "out.py".to_owned(),
            first_line_number: 1,
            obj_name: "f".to_owned(),
            constants: Box::new([
                ConstantData::None,
                ConstantData::Str {
                    value: "it's".to_owned(),
                },
            ]),
            names: Box::new(["print".to_owned()]),
            varnames: Box::new(["x".to_owned()]),
            cellvars: Box::new([]),
            freevars: Box::new([]),
            lnotab: lnotab.into(),
        }
    }

    #[test]
    fn test_constant_repr() {
        let tuple = ConstantData::Tuple {
            elements: vec![
                ConstantData::Integer { value: 1.into() },
                ConstantData::Str {
                    value: "a".to_owned(),
                },
            ],
        };
        assert_eq!(tuple.to_string(), "(1, 'a')");
        let single = ConstantData::Tuple {
            elements: vec![ConstantData::None],
        };
        assert_eq!(single.to_string(), "(None,)");
        let dict = ConstantData::Dict {
            entries: vec![(
                ConstantData::Bytes { value: b"k".to_vec() },
                ConstantData::Float { value: 2.5 },
            )],
        };
        assert_eq!(dict.to_string(), "{b'k': 2.5}");
    }

    #[test]
    fn test_float_constants_compare_by_bits() {
        let zero = ConstantData::Float { value: 0.0 };
        let neg_zero = ConstantData::Float { value: -0.0 };
        assert_ne!(zero, neg_zero);
        let nan = ConstantData::Float { value: f64::NAN };
        assert_eq!(nan, nan.clone());
    }

    #[test]
    fn test_from_literal() {
        let literal = pyreasm_literal::parse_literal("(1, [None], frozenset({True}))").unwrap();
        assert_eq!(
            ConstantData::from(literal),
            ConstantData::Tuple {
                elements: vec![
                    ConstantData::Integer { value: 1.into() },
                    ConstantData::List {
                        elements: vec![ConstantData::None]
                    },
                    ConstantData::FrozenSet {
                        elements: vec![ConstantData::Boolean { value: true }]
                    },
                ]
            }
        );
    }

    #[test]
    fn test_code_units_bytes() {
        let units = CodeUnits::from(vec![CodeUnit::new(100, 0), CodeUnit::new(83, 0)]);
        assert_eq!(units.len(), 2);
        assert_eq!(units.to_bytes(), [100, 0, 83, 0]);
        assert_eq!(format!("{units:?}"), "CodeUnits([100, 0, 83, 0])");
    }

    #[test]
    fn test_oparg_state_extends() {
        let mut state = OpArgState::default();
        assert_eq!(state.get(CodeUnit::new(EXTENDED_ARG, 1)), (EXTENDED_ARG, OpArg(1)));
        assert_eq!(state.get(CodeUnit::new(100, 0x2c)), (100, OpArg(300)));
        assert_eq!(state.get(CodeUnit::new(100, 2)), (100, OpArg(2)));
    }

    #[test]
    fn test_display() {
        // def f(x):
        //     print(x, "it's")
        //     return None
        let code = code(
            &[
                (116, 0),
                (124, 0),
                (100, 1),
                (131, 2),
                (1, 0),
                (100, 0),
                (83, 0),
            ],
            &[10, 1],
        );
        insta::assert_snapshot!(code.display(table()).to_string(), @r#"
          1           0 LOAD_GLOBAL              0 (print)
                      2 LOAD_FAST                0 (x)
                      4 LOAD_CONST               1 ("it's")
                      6 CALL_FUNCTION            2
                      8 POP_TOP

          2          10 LOAD_CONST               0 (None)
                     12 RETURN_VALUE
        "#);
    }

    #[test]
    fn test_display_jumps() {
        // while x: pass
        let code = code(
            &[(124, 0), (114, 6), (113, 0), (100, 0), (83, 0), (110, 2), (107, 2)],
            &[],
        );
        insta::assert_snapshot!(code.display(table()).to_string(), @r"
          1     >>    0 LOAD_FAST                0 (x)
                      2 POP_JUMP_IF_FALSE        6
                      4 JUMP_ABSOLUTE            0
                >>    6 LOAD_CONST               0 (None)
                      8 RETURN_VALUE
                     10 JUMP_FORWARD             2 (to 14)
                     12 COMPARE_OP               2 (==)
        ");
    }
}
