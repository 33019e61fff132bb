use core::fmt::{self, Write};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash)]
pub enum Quote {
    Single,
    Double,
}

impl Quote {
    #[inline]
    pub const fn swap(self) -> Self {
        match self {
            Self::Single => Self::Double,
            Self::Double => Self::Single,
        }
    }

    #[inline]
    pub const fn to_byte(&self) -> u8 {
        match self {
            Self::Single => b'\'',
            Self::Double => b'"',
        }
    }

    #[inline]
    pub const fn to_char(&self) -> char {
        match self {
            Self::Single => '\'',
            Self::Double => '"',
        }
    }
}

/// Returns the outer quotes to use and the number of quotes that need to be
/// escaped.
pub(crate) const fn choose_quote(
    single_count: usize,
    double_count: usize,
    preferred_quote: Quote,
) -> (Quote, usize) {
    let (primary_count, secondary_count) = match preferred_quote {
        Quote::Single => (single_count, double_count),
        Quote::Double => (double_count, single_count),
    };

    // always use primary unless we have primary but no secondary
    let use_secondary = primary_count > 0 && secondary_count == 0;
    if use_secondary {
        (preferred_quote.swap(), secondary_count)
    } else {
        (preferred_quote, primary_count)
    }
}

fn count_quotes(chars: impl Iterator<Item = char>) -> (usize, usize) {
    chars.fold((0, 0), |(single, double), c| match c {
        '\'' => (single + 1, double),
        '"' => (single, double + 1),
        _ => (single, double),
    })
}

/// Approximates `str.isprintable` without a unicode database: control,
/// separator-like and private-use code points are escaped.
pub fn is_printable(ch: char) -> bool {
    !(ch.is_control()
        || matches!(ch, '\u{2028}' | '\u{2029}' | '\u{00ad}' | '\u{feff}')
        || ('\u{e000}'..='\u{f8ff}').contains(&ch)
        || (ch.is_whitespace() && ch != ' '))
}

fn write_str_char(ch: char, quote: Quote, f: &mut impl Write) -> fmt::Result {
    match ch {
        '\n' => f.write_str("\\n"),
        '\t' => f.write_str("\\t"),
        '\r' => f.write_str("\\r"),
        '\x20'..='\x7e' => {
            // printable ascii range
            if ch == quote.to_char() || ch == '\\' {
                f.write_char('\\')?;
            }
            f.write_char(ch)
        }
        ch if ch.is_ascii() => write!(f, "\\x{:02x}", ch as u8),
        ch if is_printable(ch) => f.write_char(ch),
        '\0'..='\u{ff}' => write!(f, "\\x{:02x}", ch as u32),
        '\0'..='\u{ffff}' => write!(f, "\\u{:04x}", ch as u32),
        _ => write!(f, "\\U{:08x}", ch as u32),
    }
}

fn write_byte(ch: u8, quote: Quote, f: &mut impl Write) -> fmt::Result {
    match ch {
        b'\t' => f.write_str("\\t"),
        b'\n' => f.write_str("\\n"),
        b'\r' => f.write_str("\\r"),
        0x20..=0x7e => {
            // printable ascii range
            if ch == quote.to_byte() || ch == b'\\' {
                f.write_char('\\')?;
            }
            f.write_char(ch as char)
        }
        ch => write!(f, "\\x{ch:02x}"),
    }
}

/// Writes `source` as Python's `repr(str)` would.
pub fn write_str_repr(source: &str, f: &mut impl Write) -> fmt::Result {
    let (single, double) = count_quotes(source.chars());
    let (quote, _) = choose_quote(single, double, Quote::Single);
    f.write_char(quote.to_char())?;
    for ch in source.chars() {
        write_str_char(ch, quote, f)?;
    }
    f.write_char(quote.to_char())
}

/// Writes `source` as Python's `repr(bytes)` would.
pub fn write_bytes_repr(source: &[u8], f: &mut impl Write) -> fmt::Result {
    let (single, double) = count_quotes(source.iter().map(|&b| b as char));
    let (quote, _) = choose_quote(single, double, Quote::Single);
    f.write_char('b')?;
    f.write_char(quote.to_char())?;
    for &b in source {
        write_byte(b, quote, f)?;
    }
    f.write_char(quote.to_char())
}

pub fn str_repr(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 2);
    // writing into a String cannot fail
    let _ = write_str_repr(source, &mut out);
    out
}
