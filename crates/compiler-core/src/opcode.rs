//! Per-version CPython opcode numbering.
//!
//! All supported versions (3.6 - 3.9) use 2-byte wordcode, so a single
//! master list with per-opcode version ranges covers them; a table for one
//! version is the filtered view of that list.

use crate::{PyVersion, VersionError};
use std::{collections::HashMap, sync::OnceLock};

/// `opcode.HAVE_ARGUMENT`: opcodes at or above this take a meaningful oparg.
pub const HAVE_ARGUMENT: u8 = 90;

/// `EXTENDED_ARG` keeps its number across every supported version.
pub const EXTENDED_ARG: u8 = 144;

/// `opcode.cmp_op`, indexed by the `COMPARE_OP` oparg.
pub const CMP_OP: &[&str] = &[
    "<",
    "<=",
    "==",
    "!=",
    ">",
    ">=",
    "in",
    "not in",
    "is",
    "is not",
    "exception match",
    "BAD",
];

/// What an opcode's argument refers to; mirrors the `has*` lists of the
/// `opcode` module.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// No meaningful argument.
    NoArg,
    /// A plain integer argument (counts, flags).
    Arg,
    /// Index into `co_consts`.
    Const,
    /// Index into `co_names`.
    Name,
    /// Index into `co_varnames`.
    Local,
    /// Index into cellvars followed by freevars.
    Free,
    /// Jump relative to the next instruction.
    JumpRel,
    /// Jump to an absolute offset.
    JumpAbs,
    /// Index into [`CMP_OP`].
    Compare,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OpDef {
    pub name: &'static str,
    pub code: u8,
    pub kind: OpKind,
    /// First minor version of 3.x defining the opcode.
    since: u8,
    /// First minor version of 3.x no longer defining it.
    until: u8,
}

const ALL: (u8, u8) = (6, 10);

macro_rules! opcodes {
    ($($name:ident = $code:literal $kind:ident $(@ $range:expr)?,)*) => {
        &[$(
            {
                #[allow(unused_variables)]
                let (since, until) = ALL;
                $(let (since, until) = $range;)?
                OpDef {
                    name: stringify!($name),
                    code: $code,
                    kind: OpKind::$kind,
                    since,
                    until,
                }
            },
        )*]
    };
}

static OPCODES: &[OpDef] = opcodes! {
    POP_TOP = 1 NoArg,
    ROT_TWO = 2 NoArg,
    ROT_THREE = 3 NoArg,
    DUP_TOP = 4 NoArg,
    DUP_TOP_TWO = 5 NoArg,
    ROT_FOUR = 6 NoArg @ (8, 10),
    NOP = 9 NoArg,
    UNARY_POSITIVE = 10 NoArg,
    UNARY_NEGATIVE = 11 NoArg,
    UNARY_NOT = 12 NoArg,
    UNARY_INVERT = 15 NoArg,
    BINARY_MATRIX_MULTIPLY = 16 NoArg,
    INPLACE_MATRIX_MULTIPLY = 17 NoArg,
    BINARY_POWER = 19 NoArg,
    BINARY_MULTIPLY = 20 NoArg,
    BINARY_MODULO = 22 NoArg,
    BINARY_ADD = 23 NoArg,
    BINARY_SUBTRACT = 24 NoArg,
    BINARY_SUBSCR = 25 NoArg,
    BINARY_FLOOR_DIVIDE = 26 NoArg,
    BINARY_TRUE_DIVIDE = 27 NoArg,
    INPLACE_FLOOR_DIVIDE = 28 NoArg,
    INPLACE_TRUE_DIVIDE = 29 NoArg,
    RERAISE = 48 NoArg @ (9, 10),
    WITH_EXCEPT_START = 49 NoArg @ (9, 10),
    GET_AITER = 50 NoArg,
    GET_ANEXT = 51 NoArg,
    BEFORE_ASYNC_WITH = 52 NoArg,
    BEGIN_FINALLY = 53 NoArg @ (8, 9),
    END_ASYNC_FOR = 54 NoArg @ (8, 10),
    INPLACE_ADD = 55 NoArg,
    INPLACE_SUBTRACT = 56 NoArg,
    INPLACE_MULTIPLY = 57 NoArg,
    INPLACE_MODULO = 59 NoArg,
    STORE_SUBSCR = 60 NoArg,
    DELETE_SUBSCR = 61 NoArg,
    BINARY_LSHIFT = 62 NoArg,
    BINARY_RSHIFT = 63 NoArg,
    BINARY_AND = 64 NoArg,
    BINARY_XOR = 65 NoArg,
    BINARY_OR = 66 NoArg,
    INPLACE_POWER = 67 NoArg,
    GET_ITER = 68 NoArg,
    GET_YIELD_FROM_ITER = 69 NoArg,
    PRINT_EXPR = 70 NoArg,
    LOAD_BUILD_CLASS = 71 NoArg,
    YIELD_FROM = 72 NoArg,
    GET_AWAITABLE = 73 NoArg,
    LOAD_ASSERTION_ERROR = 74 NoArg @ (9, 10),
    INPLACE_LSHIFT = 75 NoArg,
    INPLACE_RSHIFT = 76 NoArg,
    INPLACE_AND = 77 NoArg,
    INPLACE_XOR = 78 NoArg,
    INPLACE_OR = 79 NoArg,
    BREAK_LOOP = 80 NoArg @ (6, 8),
    WITH_CLEANUP_START = 81 NoArg @ (6, 9),
    WITH_CLEANUP_FINISH = 82 NoArg @ (6, 9),
    LIST_TO_TUPLE = 82 NoArg @ (9, 10),
    RETURN_VALUE = 83 NoArg,
    IMPORT_STAR = 84 NoArg,
    SETUP_ANNOTATIONS = 85 NoArg,
    YIELD_VALUE = 86 NoArg,
    POP_BLOCK = 87 NoArg,
    END_FINALLY = 88 NoArg @ (6, 9),
    POP_EXCEPT = 89 NoArg,
    STORE_NAME = 90 Name,
    DELETE_NAME = 91 Name,
    UNPACK_SEQUENCE = 92 Arg,
    FOR_ITER = 93 JumpRel,
    UNPACK_EX = 94 Arg,
    STORE_ATTR = 95 Name,
    DELETE_ATTR = 96 Name,
    STORE_GLOBAL = 97 Name,
    DELETE_GLOBAL = 98 Name,
    LOAD_CONST = 100 Const,
    LOAD_NAME = 101 Name,
    BUILD_TUPLE = 102 Arg,
    BUILD_LIST = 103 Arg,
    BUILD_SET = 104 Arg,
    BUILD_MAP = 105 Arg,
    LOAD_ATTR = 106 Name,
    COMPARE_OP = 107 Compare,
    IMPORT_NAME = 108 Name,
    IMPORT_FROM = 109 Name,
    JUMP_FORWARD = 110 JumpRel,
    JUMP_IF_FALSE_OR_POP = 111 JumpAbs,
    JUMP_IF_TRUE_OR_POP = 112 JumpAbs,
    JUMP_ABSOLUTE = 113 JumpAbs,
    POP_JUMP_IF_FALSE = 114 JumpAbs,
    POP_JUMP_IF_TRUE = 115 JumpAbs,
    LOAD_GLOBAL = 116 Name,
    IS_OP = 117 Arg @ (9, 10),
    CONTAINS_OP = 118 Arg @ (9, 10),
    CONTINUE_LOOP = 119 JumpAbs @ (6, 8),
    SETUP_LOOP = 120 JumpRel @ (6, 8),
    SETUP_EXCEPT = 121 JumpRel @ (6, 8),
    JUMP_IF_NOT_EXC_MATCH = 121 JumpAbs @ (9, 10),
    SETUP_FINALLY = 122 JumpRel,
    LOAD_FAST = 124 Local,
    STORE_FAST = 125 Local,
    DELETE_FAST = 126 Local,
    STORE_ANNOTATION = 127 Name @ (6, 7),
    RAISE_VARARGS = 130 Arg,
    CALL_FUNCTION = 131 Arg,
    MAKE_FUNCTION = 132 Arg,
    BUILD_SLICE = 133 Arg,
    LOAD_CLOSURE = 135 Free,
    LOAD_DEREF = 136 Free,
    STORE_DEREF = 137 Free,
    DELETE_DEREF = 138 Free,
    CALL_FUNCTION_KW = 141 Arg,
    CALL_FUNCTION_EX = 142 Arg,
    SETUP_WITH = 143 JumpRel,
    EXTENDED_ARG = 144 Arg,
    LIST_APPEND = 145 Arg,
    SET_ADD = 146 Arg,
    MAP_ADD = 147 Arg,
    LOAD_CLASSDEREF = 148 Free,
    BUILD_LIST_UNPACK = 149 Arg @ (6, 9),
    BUILD_MAP_UNPACK = 150 Arg @ (6, 9),
    BUILD_MAP_UNPACK_WITH_CALL = 151 Arg @ (6, 9),
    BUILD_TUPLE_UNPACK = 152 Arg @ (6, 9),
    BUILD_SET_UNPACK = 153 Arg @ (6, 9),
    SETUP_ASYNC_WITH = 154 JumpRel,
    FORMAT_VALUE = 155 Arg,
    BUILD_CONST_KEY_MAP = 156 Arg,
    BUILD_STRING = 157 Arg,
    BUILD_TUPLE_UNPACK_WITH_CALL = 158 Arg @ (6, 9),
    LOAD_METHOD = 160 Name @ (7, 10),
    CALL_METHOD = 161 Arg @ (7, 10),
    CALL_FINALLY = 162 JumpRel @ (8, 9),
    POP_FINALLY = 163 Arg @ (8, 9),
    LIST_EXTEND = 162 Arg @ (9, 10),
    SET_UPDATE = 163 Arg @ (9, 10),
    DICT_MERGE = 164 Arg @ (9, 10),
    DICT_UPDATE = 165 Arg @ (9, 10),
};

/// The mnemonic <-> opcode mapping of one interpreter version.
#[derive(Debug)]
pub struct OpcodeTable {
    version: PyVersion,
    by_name: HashMap<&'static str, &'static OpDef>,
    by_code: [Option<&'static OpDef>; 256],
}

impl OpcodeTable {
    fn build(version: PyVersion) -> Self {
        let mut by_name = HashMap::new();
        let mut by_code = [None; 256];
        for def in OPCODES
            .iter()
            .filter(|def| (def.since..def.until).contains(&version.minor))
        {
            by_name.insert(def.name, def);
            by_code[def.code as usize] = Some(def);
        }
        Self {
            version,
            by_name,
            by_code,
        }
    }

    /// Returns the shared table for `version`.
    pub fn for_version(version: PyVersion) -> Result<&'static Self, VersionError> {
        static TABLES: [OnceLock<OpcodeTable>; 4] = [const { OnceLock::new() }; 4];
        let version = version.check_supported()?;
        let slot = usize::from(version.minor - PyVersion::MIN_SUPPORTED.minor);
        Ok(TABLES[slot].get_or_init(|| Self::build(version)))
    }

    pub fn version(&self) -> PyVersion {
        self.version
    }

    pub fn get(&self, name: &str) -> Option<&'static OpDef> {
        self.by_name.get(name).copied()
    }

    /// `opcode.opmap[name]`
    pub fn opcode(&self, name: &str) -> Option<u8> {
        self.get(name).map(|def| def.code)
    }

    /// `opcode.opname[code]`, for defined opcodes only.
    pub fn name(&self, code: u8) -> Option<&'static str> {
        self.def(code).map(|def| def.name)
    }

    pub fn def(&self, code: u8) -> Option<&'static OpDef> {
        self.by_code[code as usize]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    fn kind_of(&self, name: &str) -> Option<OpKind> {
        self.get(name).map(|def| def.kind)
    }

    pub fn has_arg(&self, name: &str) -> bool {
        self.opcode(name).is_some_and(|code| code >= HAVE_ARGUMENT)
    }

    pub fn has_const(&self, name: &str) -> bool {
        self.kind_of(name) == Some(OpKind::Const)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.kind_of(name) == Some(OpKind::Name)
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.kind_of(name) == Some(OpKind::Local)
    }

    pub fn has_free(&self, name: &str) -> bool {
        self.kind_of(name) == Some(OpKind::Free)
    }

    pub fn has_jrel(&self, name: &str) -> bool {
        self.kind_of(name) == Some(OpKind::JumpRel)
    }

    pub fn has_jabs(&self, name: &str) -> bool {
        self.kind_of(name) == Some(OpKind::JumpAbs)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(minor: u8) -> &'static OpcodeTable {
        OpcodeTable::for_version(PyVersion::new(3, minor)).unwrap()
    }

    #[test]
    fn test_common_opcodes() {
        for minor in 6..=9 {
            let t = table(minor);
            assert_eq!(t.opcode("LOAD_CONST"), Some(100));
            assert_eq!(t.opcode("RETURN_VALUE"), Some(83));
            assert_eq!(t.opcode("EXTENDED_ARG"), Some(EXTENDED_ARG));
            assert_eq!(t.name(23), Some("BINARY_ADD"));
        }
    }

    #[test]
    fn test_version_specific_opcodes() {
        assert!(table(6).contains("STORE_ANNOTATION"));
        assert!(!table(7).contains("STORE_ANNOTATION"));
        assert!(!table(6).contains("LOAD_METHOD"));
        assert!(table(7).contains("LOAD_METHOD"));
        assert!(table(7).contains("SETUP_LOOP"));
        assert!(!table(8).contains("SETUP_LOOP"));
        assert_eq!(table(8).name(162), Some("CALL_FINALLY"));
        assert_eq!(table(9).name(162), Some("LIST_EXTEND"));
        assert_eq!(table(8).name(82), Some("WITH_CLEANUP_FINISH"));
        assert_eq!(table(9).name(82), Some("LIST_TO_TUPLE"));
    }

    #[test]
    fn test_codes_unique_per_version() {
        for minor in 6..=9 {
            let t = table(minor);
            let defined = (0..=255u8).filter(|&c| t.def(c).is_some()).count();
            assert_eq!(defined, t.len(), "3.{minor}");
        }
    }

    #[test]
    fn test_membership() {
        let t = table(8);
        assert!(t.has_const("LOAD_CONST"));
        assert!(t.has_name("LOAD_METHOD"));
        assert!(t.has_name("IMPORT_FROM"));
        assert!(t.has_local("DELETE_FAST"));
        assert!(t.has_free("LOAD_CLASSDEREF"));
        assert!(t.has_jrel("FOR_ITER"));
        assert!(t.has_jabs("POP_JUMP_IF_FALSE"));
        assert!(t.has_arg("CALL_FUNCTION"));
        assert!(!t.has_arg("BINARY_ADD"));
        assert!(!t.has_name("NOT_AN_OPCODE"));
    }

    #[test]
    fn test_unsupported_version() {
        assert!(OpcodeTable::for_version(PyVersion::new(3, 11)).is_err());
    }
}
