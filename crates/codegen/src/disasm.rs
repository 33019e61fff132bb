//! Parsing of `dis` instruction lines.
//!
//! A listing line looks like
//!
//! ```text
//!   3     >>   12 LOAD_CONST               1 ('x')
//! ```
//!
//! with the line number present only on the first instruction of each
//! source line. Anything that does not contain an offset followed by a
//! mnemonic (headers, blank lines) is skipped.

use regex::Regex;
use std::{fmt, sync::LazyLock};

static INSTRUCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"( ?(?P<line_num>\d+)[ >]+)?(?P<offset>\d+) (?P<opname>[A-Z_]+)(?:\s+(?P<arg>\d+)(?: \((?P<argval>.+)\))?)?",
    )
    .expect("instruction pattern is valid")
});

/// Line number assumed until the listing shows one.
pub const DEFAULT_LINE: u32 = 1;

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub line_num: u32,
    pub offset: u32,
    pub opname: String,
    pub arg: Option<u32>,
    /// The parenthesised annotation: a constant's repr, a name, or a code
    /// object descriptor.
    pub argval: Option<String>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.offset, self.opname)?;
        if let Some(arg) = self.arg {
            write!(f, " {arg}")?;
        }
        if let Some(argval) = &self.argval {
            write!(f, " ({argval})")?;
        }
        write!(f, " on line {}", self.line_num)
    }
}

/// Turns listing lines into instructions, carrying the last seen line
/// number over to lines that omit it.
#[derive(Debug, Default)]
pub struct InstructionParser {
    line_num: Option<u32>,
}

impl InstructionParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) -> Option<Instruction> {
        let caps = INSTRUCTION_RE.captures(line)?;
        if let Some(line_num) = caps.name("line_num") {
            match line_num.as_str().parse() {
                Ok(line_num) => self.line_num = Some(line_num),
                Err(_) => {
                    debug!("ignoring out of range line number in {line:?}");
                }
            }
        }
        let Ok(offset) = caps["offset"].parse() else {
            debug!("skipping line with out of range offset: {line:?}");
            return None;
        };
        let arg = match caps.name("arg").map(|arg| arg.as_str().parse()) {
            Some(Ok(arg)) => Some(arg),
            Some(Err(_)) => {
                debug!("skipping line with out of range operand: {line:?}");
                return None;
            }
            None => None,
        };
        Some(Instruction {
            line_num: self.line_num.unwrap_or(DEFAULT_LINE),
            offset,
            opname: caps["opname"].to_owned(),
            arg,
            argval: caps.name("argval").map(|m| m.as_str().to_owned()),
        })
    }
}

/// Parses every instruction line of one unit's listing.
pub fn parse_instructions(text: &str) -> Vec<Instruction> {
    let mut parser = InstructionParser::new();
    text.lines()
        .filter_map(|line| parser.parse_line(line))
        .collect()
}
