//! Literal values as they appear in the operand annotations of `dis` output.
//!
//! `LOAD_CONST 3 ('a', (1, 2.5))` carries the `repr` of the constant; this
//! crate turns that text back into a value ([`parse_literal`]) and renders
//! values the way Python's `repr` does ([`Literal`]'s `Display`).

pub mod escape;
pub mod float;
mod parse;

pub use parse::{LiteralError, LiteralErrorKind, parse_literal};

use core::fmt;
use malachite_bigint::BigInt;
use num_complex::Complex64;

/// A value produced by the literal grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Ellipsis,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Complex(Complex64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Literal>),
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
    Set(Vec<Literal>),
    FrozenSet(Vec<Literal>),
}

impl Literal {
    /// Whether the value can be negated by a unary minus in source text.
    fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_) | Self::Complex(_))
    }
}

fn fmt_items<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = &'a Literal>,
) -> fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt::Display::fmt(item, f)?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Ellipsis => f.write_str("Ellipsis"),
            Self::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => f.write_str(&float::to_repr(*value)),
            Self::Complex(value) => f.write_str(&float::complex_repr(*value)),
            Self::Str(value) => escape::write_str_repr(value, f),
            Self::Bytes(value) => escape::write_bytes_repr(value, f),
            Self::Tuple(elements) => {
                f.write_str("(")?;
                fmt_items(f, elements)?;
                if elements.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::List(elements) => {
                f.write_str("[")?;
                fmt_items(f, elements)?;
                f.write_str("]")
            }
            Self::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Set(elements) if elements.is_empty() => f.write_str("set()"),
            Self::Set(elements) => {
                f.write_str("{")?;
                fmt_items(f, elements)?;
                f.write_str("}")
            }
            Self::FrozenSet(elements) if elements.is_empty() => f.write_str("frozenset()"),
            Self::FrozenSet(elements) => {
                f.write_str("frozenset({")?;
                fmt_items(f, elements)?;
                f.write_str("})")
            }
        }
    }
}
