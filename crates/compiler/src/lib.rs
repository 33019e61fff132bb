use log::{debug, info};
use pyreasm_codegen::{disasm, split};

pub use pyreasm_codegen::{AsmOpts, AssembledUnit, LineRegression, UnitKey};
pub use pyreasm_compiler_core::{PyVersion, bytecode::CodeObject};

// re-exported for convenience
pub use pyreasm_codegen as codegen;
pub use pyreasm_compiler_core as core;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecompileError {
    #[error("could not run decompiler: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Marshal(#[from] pyreasm_compiler_core::marshal::MarshalError),
    #[error("decompiler failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ReassembleError {
    #[error(transparent)]
    Asm(#[from] pyreasm_codegen::error::AsmError),
    #[error(transparent)]
    Decompile(#[from] DecompileError),
    #[error(transparent)]
    Version(#[from] pyreasm_compiler_core::VersionError),
}

/// Turns a code object back into source text.
pub trait Decompile {
    fn decompile(&self, code: &CodeObject, version: PyVersion) -> Result<String, DecompileError>;
}

impl<F> Decompile for F
where
    F: Fn(&CodeObject, PyVersion) -> Result<String, DecompileError>,
{
    fn decompile(&self, code: &CodeObject, version: PyVersion) -> Result<String, DecompileError> {
        self(code, version)
    }
}

/// Assembles every unit of a `dis.dis` dump.
///
/// Nested code objects are listed after the units using them, so units are
/// built last to first; the result is in listing order.
pub fn assemble_all(text: &str, opts: &AsmOpts) -> Result<Vec<AssembledUnit>, ReassembleError> {
    let text = split::strip_comments(text);
    let sources = split::split_units(&text)?;
    let mut assembler = pyreasm_codegen::Assembler::new(opts.clone())?;
    for source in sources.iter().rev() {
        let instructions = disasm::parse_instructions(source.text);
        assembler.assemble(source.key.clone(), &instructions)?;
    }
    let mut units = assembler.into_units();
    info!("assembled {} code objects", units.len());
    Ok(sources
        .iter()
        .filter_map(|source| units.shift_remove(&source.key))
        .collect())
}

/// The decompiled source of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompiledUnit {
    pub key: UnitKey,
    pub source: String,
    pub arg_names: Vec<String>,
}

/// Assembles and decompiles every unit of `text`, dropping the `# `
/// comment lines decompilers print.
pub fn decompile_all(
    text: &str,
    opts: &AsmOpts,
    decompiler: &impl Decompile,
) -> Result<Vec<DecompiledUnit>, ReassembleError> {
    assemble_all(text, opts)?
        .into_iter()
        .map(|unit| -> Result<_, ReassembleError> {
            debug!("decompiling {}", unit.key);
            let output = decompiler.decompile(&unit.code, opts.version)?;
            let source = output
                .split('\n')
                .filter(|line| !line.starts_with("# "))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(DecompiledUnit {
                key: unit.key,
                source,
                arg_names: unit.arg_names,
            })
        })
        .collect()
}

/// Decompiles `text` into one `def` per named unit, indenting bodies with
/// `tab`. Comprehensions and lambdas only appear inlined in their parents.
pub fn pretty_decompile(
    text: &str,
    opts: &AsmOpts,
    decompiler: &impl Decompile,
    tab: &str,
) -> Result<String, ReassembleError> {
    let defs: Vec<String> = decompile_all(text, opts, decompiler)?
        .into_iter()
        .filter(|unit| !unit.key.is_anonymous())
        .map(|unit| {
            let body: Vec<String> = unit
                .source
                .split('\n')
                .map(|line| format!("{tab}{line}"))
                .collect();
            format!(
                "def {}({}):\n{}",
                unit.key.code_name(),
                unit.arg_names.join(","),
                body.join("\n")
            )
        })
        .collect();
    Ok(defs.join("\n"))
}
