//! Splitting a full `dis.dis` dump into per-code-object listings.

use crate::error::{AsmError, AsmErrorType};
use regex::Regex;
use std::{fmt, sync::LazyLock};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Disassembly of (.+):").expect("header pattern is valid"));

static CODE_OBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<code object (<[^>]*>|[^\s<>]+) at (0x[0-9a-fA-F]+)")
        .expect("code object pattern is valid")
});

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#.*\n?").expect("comment pattern is valid"));

/// Identifies one code object within a dump.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitKey {
    /// The listing before the first `Disassembly of` header.
    Main,
    /// A header naming an object directly, as `dis.dis(module)` prints for
    /// module level functions.
    Named(String),
    /// A `<code object NAME at 0x...>` descriptor. Several comprehensions
    /// share a name, so the address is part of the key.
    CodeObject { name: String, address: String },
}

impl UnitKey {
    /// Parses the first `<code object NAME at ADDRESS` descriptor in `text`.
    pub fn from_descriptor(text: &str) -> Option<Self> {
        let caps = CODE_OBJECT_RE.captures(text)?;
        Some(Self::CodeObject {
            name: caps[1].to_owned(),
            address: caps[2].to_ascii_lowercase(),
        })
    }

    /// The `co_name` of the unit.
    pub fn code_name(&self) -> &str {
        match self {
            Self::Main => "main",
            Self::Named(name) | Self::CodeObject { name, .. } => name,
        }
    }

    /// Comprehensions, lambdas and other units only reachable as constants.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::CodeObject { .. })
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Named(name) => f.write_str(name),
            Self::CodeObject { name, address } => write!(f, "<code object {name} at {address}>"),
        }
    }
}

/// The listing of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSource<'a> {
    pub key: UnitKey,
    pub text: &'a str,
}

/// Drops every line starting with `#` and trims the remainder.
pub fn strip_comments(text: &str) -> String {
    COMMENT_RE.replace_all(text, "").trim().to_owned()
}

fn push_unit<'a>(
    units: &mut Vec<UnitSource<'a>>,
    key: UnitKey,
    text: &'a str,
) -> Result<(), AsmError> {
    // `dis.dis(module)` prints a bare header for each class before its methods
    if matches!(key, UnitKey::Named(_)) && text.trim().is_empty() {
        debug!("skipping {key}, which lists no instructions");
        return Ok(());
    }
    if units.iter().any(|unit| unit.key == key) {
        let name = key.to_string();
        return Err(AsmError::new(name.clone(), AsmErrorType::DuplicateUnit(name)));
    }
    units.push(UnitSource { key, text });
    Ok(())
}

/// Splits `text` at its `Disassembly of ...:` headers, keeping textual
/// order. Text before the first header forms the [`UnitKey::Main`] unit.
///
/// Named headers without instructions are dropped. Two units with the same
/// key are an error, since later stages look units up by key.
pub fn split_units(text: &str) -> Result<Vec<UnitSource<'_>>, AsmError> {
    let mut units = Vec::new();
    let mut key = (!text.starts_with("Disassembly")).then_some(UnitKey::Main);
    let mut start = 0;
    for caps in HEADER_RE.captures_iter(text) {
        let (Some(header), Some(descriptor)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(key) = key.take() {
            push_unit(&mut units, key, &text[start..header.start()])?;
        }
        let descriptor = descriptor.as_str();
        key = Some(if descriptor.starts_with('<') {
            UnitKey::from_descriptor(descriptor).ok_or_else(|| {
                AsmError::new(
                    descriptor,
                    AsmErrorType::MalformedCodeDescriptor(descriptor.to_owned()),
                )
            })?
        } else {
            UnitKey::Named(descriptor.to_owned())
        });
        start = header.end();
    }
    if let Some(key) = key {
        push_unit(&mut units, key, &text[start..])?;
    }
    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"  1           0 LOAD_CONST               0 (<code object <listcomp> at 0x7f0a, file "x.py", line 1>)
              2 LOAD_CONST               1 ('<listcomp>')
              4 MAKE_FUNCTION            0

Disassembly of <code object <listcomp> at 0x7f0a, file "x.py", line 1>:
  1           0 BUILD_LIST               0
              2 LOAD_FAST                0 (.0)

Disassembly of <code object <listcomp> at 0x7f0b, file "x.py", line 2>:
  2           0 BUILD_LIST               0"#;

    #[test]
    fn test_split_keeps_order() {
        let units = split_units(DUMP).unwrap();
        let keys: Vec<_> = units.iter().map(|unit| unit.key.to_string()).collect();
        assert_eq!(
            keys,
            [
                "main",
                "<code object <listcomp> at 0x7f0a>",
                "<code object <listcomp> at 0x7f0b>",
            ]
        );
        assert!(units[0].text.ends_with("MAKE_FUNCTION            0\n\n"));
        assert!(units[1].text.contains("LOAD_FAST"));
        assert_eq!(units[1].key.code_name(), "<listcomp>");
    }

    #[test]
    fn test_split_concatenation_keeps_instructions() {
        let units = split_units(DUMP).unwrap();
        let joined: String = units.iter().map(|unit| unit.text).collect();
        let lines = |text: &str| crate::disasm::parse_instructions(text).len();
        assert_eq!(lines(&joined), lines(DUMP));
    }

    #[test]
    fn test_split_without_main() {
        let text = "Disassembly of f:\n  2           0 LOAD_CONST               0 (None)\n";
        let units = split_units(text).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].key, UnitKey::Named("f".to_owned()));
        assert!(!units[0].key.is_anonymous());
    }

    #[test]
    fn test_split_single_unit() {
        let units = split_units("  1           0 LOAD_CONST               0 (None)").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].key, UnitKey::Main);
    }

    #[test]
    fn test_split_skips_class_headers() {
        let text = "\
Disassembly of C:
Disassembly of __init__:
  3           0 LOAD_CONST               0 (None)
              2 RETURN_VALUE

Disassembly of D:
";
        let units = split_units(text).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].key, UnitKey::Named("__init__".to_owned()));
    }

    #[test]
    fn test_duplicate_unit() {
        let text = "\
Disassembly of __init__:
  3           0 LOAD_CONST               0 (None)
              2 RETURN_VALUE

Disassembly of __init__:
  7           0 LOAD_CONST               0 (None)
              2 RETURN_VALUE
";
        let err = split_units(text).unwrap_err();
        assert!(matches!(err.error, AsmErrorType::DuplicateUnit(ref name) if name == "__init__"));
        assert_eq!(err.to_string(), "in __init__: __init__ is listed more than once");
    }

    #[test]
    fn test_malformed_descriptor() {
        let err = split_units("Disassembly of <lambda>:\n").unwrap_err();
        assert!(matches!(err.error, AsmErrorType::MalformedCodeDescriptor(_)));
    }

    #[test]
    fn test_descriptor_key() {
        assert_eq!(
            UnitKey::from_descriptor(r#"<code object foo at 0x7F00AB, file "a.py", line 3>"#),
            Some(UnitKey::CodeObject {
                name: "foo".to_owned(),
                address: "0x7f00ab".to_owned(),
            })
        );
        assert_eq!(UnitKey::from_descriptor("<lambda>"), None);
    }

    #[test]
    fn test_strip_comments() {
        let text = "# Python 3.8\n# generated\n  1           0 NOP\n#trailing\n";
        assert_eq!(strip_comments(text), "1           0 NOP");
    }
}
