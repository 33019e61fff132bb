//! This is the `pyreasm` binary. It reads the output of Python's `dis.dis`,
//! rebuilds the code objects it describes and hands them to a decompiler
//! such as `uncompyle6`.
//!
//! If you want the reassembler as a library, you're likely looking for the
//! `pyreasm-compiler` crate.

#[macro_use]
extern crate log;

use pyreasm_compiler::{
    ReassembleError, UnitKey, assemble_all,
    core::{
        VersionError,
        marshal::{self, MarshalError},
        opcode::OpcodeTable,
    },
    pretty_decompile,
};
use std::{
    fmt::Write as _,
    fs,
    io::{self, Read, Write},
    path::Path,
    process::ExitCode,
};
use thiserror::Error;

pub mod decompiler;
pub mod settings;

pub use decompiler::ExternalDecompiler;
pub use settings::{RunMode, Settings};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("{path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("decompiler `{name}` not found: {source}")]
    DecompilerNotFound { name: String, source: which::Error },
    #[error(transparent)]
    Reassemble(#[from] ReassembleError),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error("the listing holds no code objects")]
    NoCodeObjects,
}

fn io_error(path: Option<&Path>) -> impl FnOnce(io::Error) -> RunError {
    let path = path.map_or_else(|| "<stdin>".to_owned(), |p| p.display().to_string());
    move |source| RunError::Io { path, source }
}

/// The main cli of `pyreasm`. Returns a failing exit code after logging the
/// error when reassembly or decompilation fails.
pub fn run() -> ExitCode {
    let (settings, mode) = match settings::parse_opts() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("pyreasm: {e}\n\n{}", settings::usage());
            return ExitCode::from(2);
        }
    };
    init_logger(settings.verbose);

    match run_mode(&settings, &mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

pub fn run_mode(settings: &Settings, mode: &RunMode) -> Result<(), RunError> {
    match mode {
        RunMode::Help => print!("{}", settings::usage()),
        RunMode::Version => println!("pyreasm {}", env!("CARGO_PKG_VERSION")),
        RunMode::Decompile => {
            let text = read_input(settings.input.as_deref())?;
            let decompiler = ExternalDecompiler::locate(&settings.decompiler).map_err(|source| {
                RunError::DecompilerNotFound {
                    name: settings.decompiler.clone(),
                    source,
                }
            })?;
            let mut source = pretty_decompile(&text, &settings.opts, &decompiler, &settings.tab)?;
            source.push('\n');
            write_output(settings.output.as_deref(), source.as_bytes())?;
        }
        RunMode::Disassemble => {
            let text = read_input(settings.input.as_deref())?;
            let listing = disassemble(&text, settings)?;
            write_output(settings.output.as_deref(), listing.as_bytes())?;
        }
        RunMode::EmitPyc(path) => {
            let text = read_input(settings.input.as_deref())?;
            let pyc = emit_pyc(&text, settings)?;
            fs::write(path, pyc).map_err(io_error(Some(path.as_path())))?;
            info!("wrote {}", path.display());
        }
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String, RunError> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(io_error(Some(path))),
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(io_error(None))?;
            Ok(text)
        }
    }
}

fn write_output(path: Option<&Path>, data: &[u8]) -> Result<(), RunError> {
    match path {
        Some(path) => fs::write(path, data).map_err(io_error(Some(path))),
        None => io::stdout()
            .write_all(data)
            .map_err(|source| RunError::Io {
                path: "<stdout>".to_owned(),
                source,
            }),
    }
}

/// Reassembles `text` and lists the result again in `dis` format. Nested
/// code objects follow the unit holding them, as `dis.dis` prints them.
pub fn disassemble(text: &str, settings: &Settings) -> Result<String, RunError> {
    let table = OpcodeTable::for_version(settings.opts.version)?;
    let mut listing = String::new();
    for unit in assemble_all(text, &settings.opts)? {
        match unit.key {
            UnitKey::Main => {}
            UnitKey::Named(ref name) => {
                if !listing.is_empty() {
                    listing.push('\n');
                }
                let _ = writeln!(listing, "Disassembly of {name}:");
            }
            UnitKey::CodeObject { .. } => continue,
        }
        let _ = write!(listing, "{}", unit.code.display_expand_code_objects(table));
    }
    Ok(listing)
}

/// Reassembles `text` and marshals its first unit into a `.pyc` file image.
pub fn emit_pyc(text: &str, settings: &Settings) -> Result<Vec<u8>, RunError> {
    let units = assemble_all(text, &settings.opts)?;
    let unit = units.first().ok_or(RunError::NoCodeObjects)?;
    Ok(marshal::write_pyc(&unit.code, settings.opts.version, 0)?)
}
