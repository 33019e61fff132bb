//! Writer for CPython's `marshal` format (version 4 type codes, without
//! back-references) and the `.pyc` container around it.

use crate::{
    PyVersion, VersionError,
    bytecode::{CodeObject, ConstantData},
};
use malachite_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("object of length {0} is too large to serialize")]
    TooLarge(usize),
    #[error(transparent)]
    Version(#[from] VersionError),
}

pub type MarshalResult<T = ()> = Result<T, MarshalError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum Type {
    Null = b'0',
    None = b'N',
    False = b'F',
    True = b'T',
    Ellipsis = b'.',
    Int = b'i',
    Long = b'l',
    Float = b'g',
    Complex = b'y',
    Bytes = b's', // = TYPE_STRING
    Tuple = b'(',
    SmallTuple = b')',
    List = b'[',
    Dict = b'{',
    Code = b'c',
    Unicode = b'u',
    Set = b'<',
    FrozenSet = b'>',
}

pub trait Write {
    fn write_slice(&mut self, slice: &[u8]);

    fn write_u8(&mut self, v: u8) {
        self.write_slice(&v.to_le_bytes())
    }

    fn write_u16(&mut self, v: u16) {
        self.write_slice(&v.to_le_bytes())
    }

    fn write_u32(&mut self, v: u32) {
        self.write_slice(&v.to_le_bytes())
    }

    fn write_i32(&mut self, v: i32) {
        self.write_slice(&v.to_le_bytes())
    }

    fn write_f64(&mut self, v: f64) {
        self.write_slice(&v.to_le_bytes())
    }
}

impl Write for Vec<u8> {
    fn write_slice(&mut self, slice: &[u8]) {
        self.extend_from_slice(slice)
    }
}

fn write_type<W: Write>(buf: &mut W, ty: Type) {
    buf.write_u8(ty as u8)
}

pub fn write_len<W: Write>(buf: &mut W, len: usize) -> MarshalResult {
    let len = u32::try_from(len).map_err(|_| MarshalError::TooLarge(len))?;
    buf.write_u32(len);
    Ok(())
}

pub fn write_vec<W: Write>(buf: &mut W, slice: &[u8]) -> MarshalResult {
    write_len(buf, slice.len())?;
    buf.write_slice(slice);
    Ok(())
}

fn write_bytes<W: Write>(buf: &mut W, bytes: &[u8]) -> MarshalResult {
    write_type(buf, Type::Bytes);
    write_vec(buf, bytes)
}

fn write_str<W: Write>(buf: &mut W, s: &str) -> MarshalResult {
    write_type(buf, Type::Unicode);
    write_vec(buf, s.as_bytes())
}

fn write_tuple_header<W: Write>(buf: &mut W, len: usize) -> MarshalResult {
    match u8::try_from(len) {
        Ok(small) => {
            write_type(buf, Type::SmallTuple);
            buf.write_u8(small);
            Ok(())
        }
        Err(_) => {
            write_type(buf, Type::Tuple);
            write_len(buf, len)
        }
    }
}

fn write_name_tuple<W: Write>(buf: &mut W, names: &[String]) -> MarshalResult {
    write_tuple_header(buf, names.len())?;
    names.iter().try_for_each(|name| write_str(buf, name))
}

/// Integers outside the `i32` range are stored as a signed count of
/// 15-bit digits, least significant first.
fn write_long<W: Write>(buf: &mut W, value: &BigInt) -> MarshalResult {
    const SHIFT: u32 = 15;
    let base = BigInt::from(1u32 << SHIFT);
    let mut rest = value.abs();
    let mut digits = Vec::new();
    while !rest.is_zero() {
        digits.push((&rest % &base).to_u16().unwrap_or_default());
        rest = &rest / &base;
    }
    let count = i32::try_from(digits.len()).map_err(|_| MarshalError::TooLarge(digits.len()))?;
    write_type(buf, Type::Long);
    buf.write_i32(if value.is_negative() { -count } else { count });
    for digit in digits {
        buf.write_u16(digit);
    }
    Ok(())
}

pub fn serialize_constant<W: Write>(
    buf: &mut W,
    constant: &ConstantData,
    version: PyVersion,
) -> MarshalResult {
    match constant {
        ConstantData::Integer { value } => match value.to_i32() {
            Some(small) => {
                write_type(buf, Type::Int);
                buf.write_i32(small);
            }
            None => write_long(buf, value)?,
        },
        ConstantData::Float { value } => {
            write_type(buf, Type::Float);
            buf.write_f64(*value);
        }
        ConstantData::Complex { value } => {
            write_type(buf, Type::Complex);
            buf.write_f64(value.re);
            buf.write_f64(value.im);
        }
        ConstantData::Boolean { value } => {
            write_type(buf, if *value { Type::True } else { Type::False })
        }
        ConstantData::Str { value } => write_str(buf, value)?,
        ConstantData::Bytes { value } => write_bytes(buf, value)?,
        ConstantData::Code { code } => serialize_code(buf, code, version)?,
        ConstantData::Tuple { elements } => {
            write_tuple_header(buf, elements.len())?;
            serialize_all(buf, elements, version)?;
        }
        ConstantData::List { elements } => {
            write_type(buf, Type::List);
            write_len(buf, elements.len())?;
            serialize_all(buf, elements, version)?;
        }
        ConstantData::Set { elements } => {
            write_type(buf, Type::Set);
            write_len(buf, elements.len())?;
            serialize_all(buf, elements, version)?;
        }
        ConstantData::FrozenSet { elements } => {
            write_type(buf, Type::FrozenSet);
            write_len(buf, elements.len())?;
            serialize_all(buf, elements, version)?;
        }
        ConstantData::Dict { entries } => {
            write_type(buf, Type::Dict);
            for (key, value) in entries {
                serialize_constant(buf, key, version)?;
                serialize_constant(buf, value, version)?;
            }
            write_type(buf, Type::Null);
        }
        ConstantData::None => write_type(buf, Type::None),
        ConstantData::Ellipsis => write_type(buf, Type::Ellipsis),
    }
    Ok(())
}

fn serialize_all<W: Write>(
    buf: &mut W,
    elements: &[ConstantData],
    version: PyVersion,
) -> MarshalResult {
    elements
        .iter()
        .try_for_each(|element| serialize_constant(buf, element, version))
}

/// Writes `code` with the field layout `marshal.dumps` uses for `version`.
pub fn serialize_code<W: Write>(
    buf: &mut W,
    code: &CodeObject,
    version: PyVersion,
) -> MarshalResult {
    write_type(buf, Type::Code);
    buf.write_u32(code.arg_count);
    if version.has_posonly_args() {
        buf.write_u32(code.posonlyarg_count);
    }
    buf.write_u32(code.kwonlyarg_count);
    buf.write_u32(code.local_count);
    buf.write_u32(code.max_stackdepth);
    buf.write_u32(code.flags.bits());
    write_bytes(buf, &code.instructions.to_bytes())?;

    write_tuple_header(buf, code.constants.len())?;
    serialize_all(buf, &code.constants, version)?;
    write_name_tuple(buf, &code.names)?;
    write_name_tuple(buf, &code.varnames)?;
    write_name_tuple(buf, &code.freevars)?;
    write_name_tuple(buf, &code.cellvars)?;

    write_str(buf, &code.source_path)?;
    write_str(buf, &code.obj_name)?;
    buf.write_u32(code.first_line_number);
    write_bytes(buf, &code.lnotab)
}

/// The `.pyc` header: magic number, then (from 3.7) a flags word, then the
/// source mtime and size.
pub fn pyc_header<W: Write>(
    buf: &mut W,
    version: PyVersion,
    mtime: u32,
    source_size: u32,
) -> MarshalResult {
    let magic = version
        .magic_number()
        .ok_or(VersionError::Unsupported(version))?;
    buf.write_u16(magic);
    buf.write_slice(b"\r\n");
    if version.has_pyc_flags() {
        buf.write_u32(0);
    }
    buf.write_u32(mtime);
    buf.write_u32(source_size);
    Ok(())
}

/// A complete `.pyc` image holding `code`.
pub fn write_pyc(code: &CodeObject, version: PyVersion, mtime: u32) -> MarshalResult<Vec<u8>> {
    let mut buf = Vec::new();
    pyc_header(&mut buf, version, mtime, 0)?;
    serialize_code(&mut buf, code, version)?;
    Ok(buf)
}
