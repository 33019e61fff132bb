use pyreasm_compiler::{AsmOpts, LineRegression, PyVersion};
use std::{env, ffi::OsString, path::PathBuf};

const USAGE: &str = "\
usage: pyreasm [OPTIONS] [FILE]

Reassembles the output of Python's `dis.dis` and decompiles it.
FILE defaults to `-`, standard input.

options:
  -f, --filename NAME        filename stamped into the code objects [default: out.py]
  -o, --output PATH          write the result to PATH instead of standard output
  -t, --target VERSION       Python version of the listing, 3.6 - 3.9 [default: 3.8]
      --decompiler PROGRAM   decompiler to run on each code object [default: uncompyle6]
      --tab STRING           indentation of decompiled function bodies [default: a tab]
      --allow-line-regression
                             warn instead of failing when line numbers go back
      --emit-pyc PATH        write the first code object as a .pyc file and exit
      --dis                  print the reassembled code objects as `dis` would
  -E                         ignore PYREASM_* environment variables
  -v                         verbose logging, repeat for more
  -h, --help                 print this help
  -V, --version              print the version

environment:
  PYREASM_TARGET             default for --target
  PYREASM_DECOMPILER         default for --decompiler
";

pub const DEFAULT_DECOMPILER: &str = "uncompyle6";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Decompile every named unit and print them as functions.
    Decompile,
    EmitPyc(PathBuf),
    Disassemble,
    Help,
    Version,
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// `None` reads standard input.
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub opts: AsmOpts,
    pub decompiler: String,
    pub tab: String,
    pub verbose: u8,
    pub ignore_environment: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            opts: AsmOpts::default(),
            decompiler: DEFAULT_DECOMPILER.to_owned(),
            tab: "\t".to_owned(),
            verbose: 0,
            ignore_environment: false,
        }
    }
}

pub fn usage() -> &'static str {
    USAGE
}

/// Create settings by examining command line arguments and environment
/// variables.
pub fn parse_opts() -> Result<(Settings, RunMode), lexopt::Error> {
    parse_args(env::args_os().skip(1), |name| env::var(name).ok())
}

/// Parses `args` (without the program name), taking defaults from `getenv`
/// unless `-E` is given.
pub fn parse_args<I, F>(args: I, getenv: F) -> Result<(Settings, RunMode), lexopt::Error>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
    F: Fn(&str) -> Option<String>,
{
    use lexopt::prelude::*;

    let mut settings = Settings::default();
    let mut mode = RunMode::Decompile;
    let mut target = None;
    let mut decompiler = None;

    let mut parser = lexopt::Parser::from_args(args);
    while let Some(arg) = parser.next()? {
        match arg {
            Short('f') | Long("filename") => settings.opts.filename = parser.value()?.string()?,
            Short('o') | Long("output") => settings.output = Some(parser.value()?.into()),
            Short('t') | Long("target") => target = Some(parser.value()?.parse::<PyVersion>()?),
            Long("decompiler") => decompiler = Some(parser.value()?.string()?),
            Long("tab") => settings.tab = parser.value()?.string()?,
            Long("allow-line-regression") => {
                settings.opts.line_regression = LineRegression::Warn;
            }
            Long("emit-pyc") => mode = RunMode::EmitPyc(parser.value()?.into()),
            Long("dis") => mode = RunMode::Disassemble,
            Short('E') => settings.ignore_environment = true,
            Short('v') => settings.verbose = settings.verbose.saturating_add(1),
            Short('h') | Long("help") => return Ok((settings, RunMode::Help)),
            Short('V') | Long("version") => return Ok((settings, RunMode::Version)),
            Value(value) if settings.input.is_none() => {
                if value != "-" {
                    settings.input = Some(value.into());
                }
            }
            _ => return Err(arg.unexpected()),
        }
    }

    if !settings.ignore_environment {
        if target.is_none() {
            target = getenv("PYREASM_TARGET")
                .map(|value| {
                    value.parse::<PyVersion>().map_err(|e| lexopt::Error::ParsingFailed {
                        value,
                        error: Box::new(e),
                    })
                })
                .transpose()?;
        }
        if decompiler.is_none() {
            decompiler = getenv("PYREASM_DECOMPILER");
        }
    }
    if let Some(target) = target {
        settings.opts.version = target;
    }
    if let Some(decompiler) = decompiler {
        settings.decompiler = decompiler;
    }
    Ok((settings, mode))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(args: &[&str]) -> (Settings, RunMode) {
        parse_args(args.iter().copied(), no_env).unwrap()
    }

    #[test]
    fn test_defaults() {
        let (settings, mode) = parse(&[]);
        assert_eq!(mode, RunMode::Decompile);
        assert_eq!(settings.input, None);
        assert_eq!(settings.decompiler, "uncompyle6");
        assert_eq!(settings.opts.version, PyVersion::new(3, 8));
        assert_eq!(settings.opts.filename, "out.py");
        assert_eq!(settings.opts.line_regression, LineRegression::Error);
        assert_eq!(settings.tab, "\t");
    }

    #[test]
    fn test_options() {
        let (settings, mode) = parse(&[
            "-t",
            "3.7",
            "--filename=m.py",
            "--tab",
            "  ",
            "--allow-line-regression",
            "-vv",
            "--dis",
            "dump.txt",
        ]);
        assert_eq!(mode, RunMode::Disassemble);
        assert_eq!(settings.input, Some(PathBuf::from("dump.txt")));
        assert_eq!(settings.opts.version, PyVersion::new(3, 7));
        assert_eq!(settings.opts.filename, "m.py");
        assert_eq!(settings.tab, "  ");
        assert_eq!(settings.opts.line_regression, LineRegression::Warn);
        assert_eq!(settings.verbose, 2);
    }

    #[test]
    fn test_stdin_and_emit_pyc() {
        let (settings, mode) = parse(&["--emit-pyc", "out.pyc", "-"]);
        assert_eq!(settings.input, None);
        assert_eq!(mode, RunMode::EmitPyc(PathBuf::from("out.pyc")));
    }

    #[test]
    fn test_environment() {
        let env = |name: &str| match name {
            "PYREASM_TARGET" => Some("3.6".to_owned()),
            "PYREASM_DECOMPILER" => Some("decompyle3".to_owned()),
            _ => None,
        };
        let (settings, _) = parse_args(Vec::<&str>::new(), env).unwrap();
        assert_eq!(settings.opts.version, PyVersion::new(3, 6));
        assert_eq!(settings.decompiler, "decompyle3");

        let (settings, _) = parse_args(["-t", "3.9"], env).unwrap();
        assert_eq!(settings.opts.version, PyVersion::new(3, 9));

        let (settings, _) = parse_args(["-E"], env).unwrap();
        assert_eq!(settings.opts.version, PyVersion::new(3, 8));
        assert_eq!(settings.decompiler, "uncompyle6");
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse_args(["-t", "three"], no_env).is_err());
        assert!(parse_args(["a.txt", "b.txt"], no_env).is_err());
        assert!(parse_args(["--frobnicate"], no_env).is_err());
        assert_eq!(parse(&["-h", "--dis"]).1, RunMode::Help);
    }
}
