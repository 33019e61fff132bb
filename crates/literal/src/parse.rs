//! A recursive-descent parser for the subset of Python expression syntax
//! that `repr` produces for constants.

use crate::Literal;
use malachite_bigint::BigInt;
use num_complex::Complex64;
use num_traits::{Num, Zero};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    #[source]
    pub kind: LiteralErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LiteralErrorKind {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid escape sequence: {0}")]
    InvalidEscape(String),
    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),
    #[error("unknown name {0:?}")]
    UnknownName(String),
    #[error("bytes can only contain ASCII literal characters")]
    NonAsciiBytes,
    #[error("cannot mix bytes and nonbytes literals")]
    MixedConcatenation,
    #[error("unsupported operand for {0}")]
    UnsupportedOperand(&'static str),
    #[error("trailing input after literal")]
    TrailingInput,
}

type ParseResult<T> = Result<T, LiteralError>;

/// Parses the `repr` text of a constant back into a [`Literal`].
///
/// ```
/// use pyreasm_literal::{Literal, parse_literal};
/// assert_eq!(parse_literal("(1, 'a')").unwrap(), Literal::Tuple(vec![
///     Literal::Int(1.into()),
///     Literal::Str("a".to_owned()),
/// ]));
/// ```
pub fn parse_literal(source: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser { src: source, pos: 0 };
    let value = parser.parse_expr()?;
    parser.skip_ws();
    if parser.pos != source.len() {
        return Err(parser.error(LiteralErrorKind::TrailingInput));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, kind: LiteralErrorKind) -> LiteralError {
        LiteralError {
            offset: self.pos,
            kind,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> ParseResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> LiteralError {
        match self.peek() {
            Some(c) => self.error(LiteralErrorKind::UnexpectedChar(c)),
            None => self.error(LiteralErrorKind::UnexpectedEof),
        }
    }

    /// `sum := unary (('+' | '-') unary)?`, only valid as `real ± imag`.
    fn parse_expr(&mut self) -> ParseResult<Literal> {
        let left = self.parse_unary()?;
        self.skip_ws();
        let negate = match self.peek() {
            Some('+') => false,
            Some('-') => true,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_unary()?;
        let real = match left {
            Literal::Int(ref value) => bigint_to_f64(value),
            Literal::Float(value) => value,
            _ => return Err(self.error(LiteralErrorKind::UnsupportedOperand("+/-"))),
        };
        match right {
            Literal::Complex(c) if c.re.is_zero() => {
                let im = if negate { -c.im } else { c.im };
                Ok(Literal::Complex(Complex64::new(real, im)))
            }
            _ => Err(self.error(LiteralErrorKind::UnsupportedOperand("+/-"))),
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Literal> {
        self.skip_ws();
        match self.peek() {
            Some(op @ ('-' | '+')) => {
                self.pos += 1;
                let operand = self.parse_unary()?;
                if !operand.is_numeric() {
                    return Err(self.error(LiteralErrorKind::UnsupportedOperand("unary")));
                }
                Ok(if op == '-' { negate(operand) } else { operand })
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> ParseResult<Literal> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(self.error(LiteralErrorKind::UnexpectedEof));
        };
        match c {
            '(' => self.parse_paren(),
            '[' => {
                self.pos += 1;
                Ok(Literal::List(self.parse_sequence(']')?.0))
            }
            '{' => self.parse_brace(),
            '\'' | '"' => self.parse_strings(),
            '.' if self.rest().starts_with("...") => {
                self.pos += 3;
                Ok(Literal::Ellipsis)
            }
            '0'..='9' | '.' => self.parse_number(),
            c if c.is_alphabetic() || c == '_' => self.parse_name(),
            _ => Err(self.unexpected()),
        }
    }

    /// Parses comma separated items up to `close`, returning the items and
    /// whether a comma was seen.
    fn parse_sequence(&mut self, close: char) -> ParseResult<(Vec<Literal>, bool)> {
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            if self.eat(close) {
                return Ok((items, saw_comma));
            }
            items.push(self.parse_expr()?);
            if self.eat(',') {
                saw_comma = true;
            } else {
                self.expect(close)?;
                return Ok((items, saw_comma));
            }
        }
    }

    fn parse_paren(&mut self) -> ParseResult<Literal> {
        self.pos += 1;
        let (mut items, saw_comma) = self.parse_sequence(')')?;
        if items.len() == 1 && !saw_comma {
            return Ok(items.remove(0));
        }
        Ok(Literal::Tuple(items))
    }

    fn parse_brace(&mut self) -> ParseResult<Literal> {
        self.pos += 1;
        if self.eat('}') {
            return Ok(Literal::Dict(Vec::new()));
        }
        let first = self.parse_expr()?;
        if self.eat(':') {
            let value = self.parse_expr()?;
            let mut entries = vec![(first, value)];
            while self.eat(',') {
                if self.eat('}') {
                    return Ok(Literal::Dict(entries));
                }
                let key = self.parse_expr()?;
                self.expect(':')?;
                entries.push((key, self.parse_expr()?));
            }
            self.expect('}')?;
            Ok(Literal::Dict(entries))
        } else {
            let mut items = vec![first];
            if self.eat(',') {
                items.extend(self.parse_sequence('}')?.0);
            } else {
                self.expect('}')?;
            }
            Ok(Literal::Set(items))
        }
    }

    fn parse_name(&mut self) -> ParseResult<Literal> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let name = &self.src[start..self.pos];
        if matches!(self.peek(), Some('\'' | '"')) && is_string_prefix(name) {
            self.pos = start;
            return self.parse_strings();
        }
        match name {
            "None" => Ok(Literal::None),
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "Ellipsis" => Ok(Literal::Ellipsis),
            "inf" => Ok(Literal::Float(f64::INFINITY)),
            "nan" => Ok(Literal::Float(f64::NAN)),
            "frozenset" | "set" => {
                self.expect('(')?;
                let items = if self.eat(')') {
                    Vec::new()
                } else {
                    let inner = self.parse_expr()?;
                    self.expect(')')?;
                    match inner {
                        Literal::Set(items)
                        | Literal::List(items)
                        | Literal::Tuple(items)
                        | Literal::FrozenSet(items) => items,
                        Literal::Dict(entries) if entries.is_empty() => Vec::new(),
                        _ => return Err(self.error(LiteralErrorKind::UnsupportedOperand(
                            "set constructor",
                        ))),
                    }
                };
                Ok(if name == "set" {
                    Literal::Set(items)
                } else {
                    Literal::FrozenSet(items)
                })
            }
            _ => Err(LiteralError {
                offset: start,
                kind: LiteralErrorKind::UnknownName(name.to_owned()),
            }),
        }
    }

    fn parse_number(&mut self) -> ParseResult<Literal> {
        let start = self.pos;
        let rest = self.rest();
        let radix = match rest.get(..2).map(str::to_ascii_lowercase).as_deref() {
            Some("0x") => 16,
            Some("0o") => 8,
            Some("0b") => 2,
            _ => 10,
        };
        if radix != 10 {
            self.pos += 2;
            let digits_start = self.pos;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit() || c == '_')
            {
                self.pos += 1;
            }
            let digits: String = self.src[digits_start..self.pos]
                .chars()
                .filter(|&c| c != '_')
                .collect();
            return BigInt::from_str_radix(&digits, radix)
                .map(Literal::Int)
                .map_err(|_| self.invalid_number(start));
        }

        let mut is_float = false;
        self.eat_digits();
        if self.peek() == Some('.') {
            is_float = true;
            self.pos += 1;
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            self.eat_digits();
        }
        let text: String = self.src[start..self.pos]
            .chars()
            .filter(|&c| c != '_')
            .collect();
        if matches!(self.peek(), Some('j' | 'J')) {
            self.pos += 1;
            let im: f64 = text.parse().map_err(|_| self.invalid_number(start))?;
            return Ok(Literal::Complex(Complex64::new(0.0, im)));
        }
        if is_float {
            text.parse()
                .map(Literal::Float)
                .map_err(|_| self.invalid_number(start))
        } else {
            BigInt::from_str_radix(&text, 10)
                .map(Literal::Int)
                .map_err(|_| self.invalid_number(start))
        }
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
    }

    fn invalid_number(&self, start: usize) -> LiteralError {
        LiteralError {
            offset: start,
            kind: LiteralErrorKind::InvalidNumber(self.src[start..self.pos].to_owned()),
        }
    }

    /// Adjacent string literals concatenate, as in Python source.
    fn parse_strings(&mut self) -> ParseResult<Literal> {
        let mut value = self.parse_string()?;
        loop {
            self.skip_ws();
            let save = self.pos;
            let next_is_string = match self.peek() {
                Some('\'' | '"') => true,
                Some(c) if c.is_alphabetic() => {
                    let word: String = self
                        .rest()
                        .chars()
                        .take_while(|c| c.is_alphanumeric())
                        .collect();
                    is_string_prefix(&word)
                        && matches!(self.rest()[word.len()..].chars().next(), Some('\'' | '"'))
                }
                _ => false,
            };
            if !next_is_string {
                return Ok(value);
            }
            let next = self.parse_string()?;
            value = match (value, next) {
                (Literal::Str(mut a), Literal::Str(b)) => {
                    a.push_str(&b);
                    Literal::Str(a)
                }
                (Literal::Bytes(mut a), Literal::Bytes(b)) => {
                    a.extend(b);
                    Literal::Bytes(a)
                }
                _ => {
                    self.pos = save;
                    return Err(self.error(LiteralErrorKind::MixedConcatenation));
                }
            };
        }
    }

    fn parse_string(&mut self) -> ParseResult<Literal> {
        let mut raw = false;
        let mut bytes = false;
        while let Some(c) = self.peek() {
            match c {
                'r' | 'R' => raw = true,
                'b' | 'B' => bytes = true,
                'u' | 'U' => {}
                _ => break,
            }
            self.pos += 1;
        }
        let Some(quote) = self.bump() else {
            return Err(self.error(LiteralErrorKind::UnexpectedEof));
        };
        let triple: String = core::iter::repeat_n(quote, 3).collect();
        let is_triple = self.src[self.pos - 1..].starts_with(&triple);
        if is_triple {
            self.pos += 2;
        }

        let mut out = StringBuilder::new(bytes);
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(LiteralErrorKind::UnterminatedString));
            };
            if c == quote {
                if !is_triple {
                    break;
                }
                if self.src[self.pos - 1..].starts_with(&triple) {
                    self.pos += 2;
                    break;
                }
                out.push_char(c).map_err(|kind| self.error(kind))?;
                continue;
            }
            if (c == '\n' || c == '\r') && !is_triple {
                return Err(self.error(LiteralErrorKind::UnterminatedString));
            }
            if c != '\\' {
                out.push_char(c).map_err(|kind| self.error(kind))?;
                continue;
            }
            let Some(escaped) = self.bump() else {
                return Err(self.error(LiteralErrorKind::UnterminatedString));
            };
            if raw {
                out.push_char('\\').map_err(|kind| self.error(kind))?;
                out.push_char(escaped).map_err(|kind| self.error(kind))?;
                continue;
            }
            self.parse_escape(escaped, &mut out)?;
        }
        Ok(out.finish())
    }

    fn parse_escape(&mut self, escaped: char, out: &mut StringBuilder) -> ParseResult<()> {
        let simple = match escaped {
            '\n' => return Ok(()),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0c'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\x0b'),
            _ => None,
        };
        if let Some(c) = simple {
            return out.push_char(c).map_err(|kind| self.error(kind));
        }
        match escaped {
            '0'..='7' => {
                let mut value = escaped.to_digit(8).unwrap_or_default();
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            self.pos += 1;
                        }
                        None => break,
                    }
                }
                out.push_code(value).map_err(|kind| self.error(kind))
            }
            'x' => {
                let value = self.parse_hex_escape(2, escaped)?;
                out.push_code(value).map_err(|kind| self.error(kind))
            }
            'u' | 'U' if !out.is_bytes() => {
                let len = if escaped == 'u' { 4 } else { 8 };
                let value = self.parse_hex_escape(len, escaped)?;
                out.push_code(value).map_err(|kind| self.error(kind))
            }
            'N' if !out.is_bytes() => Err(self.error(LiteralErrorKind::InvalidEscape(
                "\\N{...} escapes are not supported".to_owned(),
            ))),
            other => {
                // unknown escapes are kept verbatim
                out.push_char('\\').map_err(|kind| self.error(kind))?;
                out.push_char(other).map_err(|kind| self.error(kind))
            }
        }
    }

    fn parse_hex_escape(&mut self, len: usize, kind: char) -> ParseResult<u32> {
        let digits = self.rest().get(..len).unwrap_or_default();
        if digits.len() != len || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(self.error(LiteralErrorKind::InvalidEscape(format!(
                "truncated \\{kind}{digits} escape"
            ))));
        }
        self.pos += len;
        u32::from_str_radix(digits, 16).map_err(|_| {
            self.error(LiteralErrorKind::InvalidEscape(format!("\\{kind}{digits}")))
        })
    }
}

enum StringBuilder {
    Str(String),
    Bytes(Vec<u8>),
}

impl StringBuilder {
    fn new(bytes: bool) -> Self {
        if bytes {
            Self::Bytes(Vec::new())
        } else {
            Self::Str(String::new())
        }
    }

    fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }

    fn push_char(&mut self, c: char) -> Result<(), LiteralErrorKind> {
        match self {
            Self::Str(s) => s.push(c),
            Self::Bytes(b) => {
                if !c.is_ascii() {
                    return Err(LiteralErrorKind::NonAsciiBytes);
                }
                b.push(c as u8);
            }
        }
        Ok(())
    }

    /// Pushes a code point (str) or byte value (bytes) produced by an escape.
    fn push_code(&mut self, value: u32) -> Result<(), LiteralErrorKind> {
        match self {
            Self::Str(s) => {
                let c = char::from_u32(value).ok_or_else(|| {
                    LiteralErrorKind::InvalidEscape(format!(
                        "code point {value:#x} is a surrogate or out of range"
                    ))
                })?;
                s.push(c);
            }
            Self::Bytes(b) => {
                let byte = u8::try_from(value).map_err(|_| {
                    LiteralErrorKind::InvalidEscape(format!("byte value {value:#o} out of range"))
                })?;
                b.push(byte);
            }
        }
        Ok(())
    }

    fn finish(self) -> Literal {
        match self {
            Self::Str(s) => Literal::Str(s),
            Self::Bytes(b) => Literal::Bytes(b),
        }
    }
}

fn is_string_prefix(word: &str) -> bool {
    word.len() <= 2
        && !word.is_empty()
        && word.chars().all(|c| matches!(c, 'r' | 'R' | 'b' | 'B' | 'u' | 'U'))
}

fn negate(value: Literal) -> Literal {
    match value {
        Literal::Int(v) => Literal::Int(-v),
        Literal::Float(v) => Literal::Float(-v),
        Literal::Complex(v) => Literal::Complex(-v),
        other => other,
    }
}

fn bigint_to_f64(value: &BigInt) -> f64 {
    num_traits::ToPrimitive::to_f64(value).unwrap_or(f64::INFINITY)
}
