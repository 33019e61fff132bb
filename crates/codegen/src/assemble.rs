use crate::{
    IndexMap,
    disasm::Instruction,
    encode::encode,
    error::{AsmError, AsmErrorType},
    split::UnitKey,
    symboltable::SymbolTable,
};
use pyreasm_compiler_core::{
    PyVersion, VersionError,
    bytecode::{CodeFlags, CodeObject},
    opcode::OpcodeTable,
};

/// What to do when a listing's line numbers go backwards.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LineRegression {
    #[default]
    Error,
    /// Log a warning and leave the line table untouched.
    Warn,
}

#[derive(Debug, Clone)]
pub struct AsmOpts {
    /// Selects the opcode numbering and code object layout.
    pub version: PyVersion,
    /// `co_filename` of every assembled unit
    pub filename: String,
    /// OR'd into the flags derived from the listing
    pub flags: CodeFlags,
    /// `co_stacksize`; the listing does not reveal the real depth
    pub stack_size: u32,
    pub line_regression: LineRegression,
}

impl Default for AsmOpts {
    fn default() -> Self {
        Self {
            version: PyVersion::default(),
            filename: "out.py".to_owned(),
            flags: CodeFlags::empty(),
            stack_size: 100,
            line_regression: LineRegression::Error,
        }
    }
}

/// A finished code object and the argument names inferred for it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledUnit {
    pub key: UnitKey,
    pub code: CodeObject,
    pub arg_names: Vec<String>,
}

pub type AssembledUnits = IndexMap<UnitKey, AssembledUnit>;

/// Builds code objects one unit at a time. A unit may only reference code
/// objects assembled before it.
#[derive(Debug)]
pub struct Assembler {
    opts: AsmOpts,
    table: &'static OpcodeTable,
    units: AssembledUnits,
}

impl Assembler {
    pub fn new(opts: AsmOpts) -> Result<Self, VersionError> {
        let table = OpcodeTable::for_version(opts.version)?;
        Ok(Self {
            opts,
            table,
            units: AssembledUnits::default(),
        })
    }

    /// Assembles `instructions` as the unit `key` and keeps the result for
    /// units referencing it later.
    pub fn assemble(
        &mut self,
        key: UnitKey,
        instructions: &[Instruction],
    ) -> Result<&AssembledUnit, AsmError> {
        let unit = self
            .build(&key, instructions)
            .map_err(|error| AsmError::new(key.to_string(), error))?;
        debug!(
            "assembled {key}: {} instructions, {} constants, args {:?}",
            instructions.len(),
            unit.code.constants.len(),
            unit.arg_names
        );
        let (index, _) = self.units.insert_full(key, unit);
        Ok(&self.units[index])
    }

    fn build(
        &self,
        key: &UnitKey,
        instructions: &[Instruction],
    ) -> Result<AssembledUnit, AsmErrorType> {
        let tables = SymbolTable::scan(instructions, &self.units, self.opts.line_regression)?;
        let code = encode(instructions, self.table)?;
        let varnames = tables.dense_varnames();
        let code = CodeObject {
            instructions: code,
            flags: self.opts.flags | tables.flags,
            posonlyarg_count: 0,
            arg_count: tables.arg_names.len() as u32,
            kwonlyarg_count: 0,
            local_count: varnames.len() as u32,
            max_stackdepth: self.opts.stack_size,
            source_path: self.opts.filename.clone(),
            first_line_number: tables.first_line,
            obj_name: key.code_name().to_owned(),
            constants: tables.dense_constants(),
            names: tables.dense_names(),
            varnames,
            cellvars: tables.dense_cellvars(),
            freevars: Box::new([]),
            lnotab: tables.lnotab.into_boxed_slice(),
        };
        Ok(AssembledUnit {
            key: key.clone(),
            code,
            arg_names: tables.arg_names,
        })
    }

    pub fn into_units(self) -> AssembledUnits {
        self.units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::parse_instructions;
    use pyreasm_compiler_core::bytecode::ConstantData;

    #[test]
    fn test_assemble_add() {
        let mut asm = Assembler::new(AsmOpts::default()).unwrap();
        let text = "\
  1           0 LOAD_CONST               0 (1)
              2 LOAD_CONST               1 (2)
              4 BINARY_ADD
              6 RETURN_VALUE";
        let unit = asm.assemble(UnitKey::Main, &parse_instructions(text)).unwrap();
        let code = &unit.code;
        assert_eq!(code.instructions.to_bytes(), [100, 0, 100, 1, 23, 0, 83, 0]);
        assert_eq!(
            &*code.constants,
            [
                ConstantData::Integer { value: 1.into() },
                ConstantData::Integer { value: 2.into() }
            ]
        );
        assert_eq!(code.arg_count, 0);
        assert_eq!(code.max_stackdepth, 100);
        assert_eq!(code.obj_name, "main");
        assert_eq!(code.source_path, "out.py");
        assert!(code.lnotab.is_empty());
    }

    #[test]
    fn test_nested_reference() {
        let inner = "  1           0 LOAD_FAST                0 (.0)\n              2 RETURN_VALUE";
        let outer = r#"  1           0 LOAD_CONST               0 (<code object <listcomp> at 0xab, file "out.py", line 1>)
              2 RETURN_VALUE"#;
        let key = UnitKey::from_descriptor("<code object <listcomp> at 0xab").unwrap();

        let mut asm = Assembler::new(AsmOpts::default()).unwrap();
        let err = asm
            .assemble(UnitKey::Main, &parse_instructions(outer))
            .unwrap_err();
        assert!(matches!(err.error, AsmErrorType::MissingCodeObject(_)));

        let listcomp = asm.assemble(key, &parse_instructions(inner)).unwrap().clone();
        assert_eq!(listcomp.arg_names, [".0"]);
        let main = asm.assemble(UnitKey::Main, &parse_instructions(outer)).unwrap();
        assert_eq!(
            main.code.constants[0],
            ConstantData::Code {
                code: Box::new(listcomp.code)
            }
        );
    }

    #[test]
    fn test_flags_seed() {
        let opts = AsmOpts {
            flags: CodeFlags::NOFREE,
            ..AsmOpts::default()
        };
        let mut asm = Assembler::new(opts).unwrap();
        let text = "  1           0 LOAD_CONST               0 (None)\n              2 YIELD_VALUE";
        let unit = asm.assemble(UnitKey::Main, &parse_instructions(text)).unwrap();
        assert_eq!(unit.code.flags, CodeFlags::NOFREE | CodeFlags::GENERATOR);
    }

    #[test]
    fn test_unsupported_version() {
        let opts = AsmOpts {
            version: PyVersion::new(2, 7),
            ..AsmOpts::default()
        };
        assert!(Assembler::new(opts).is_err());
    }
}
