//! Wire type system for dialect field declarations.
//!
//! Dialect XML declares field types as strings (`uint16_t`, `float[4]`,
//! `char[50]`). This module resolves them into primitive element kinds and
//! byte sizes. All primitives are little-endian on the wire; `float` and
//! `double` are IEEE-754.

use std::fmt;

use crate::protocol::{Error, Result};

/// Suffix carried by versioned primitives such as `uint8_t_mavlink_version`.
///
/// The suffix is wire-transparent but must be stripped when the declared
/// type participates in CRC_EXTRA derivation.
pub(crate) const VERSIONED_SUFFIX: &str = "_mavlink_version";

/// Primitive element kind of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `int8_t`
    I8,
    /// `uint8_t`
    U8,
    /// `int16_t`
    I16,
    /// `uint16_t`
    U16,
    /// `int32_t`
    I32,
    /// `uint32_t`
    U32,
    /// `int64_t`
    I64,
    /// `uint64_t`
    U64,
    /// `float`
    F32,
    /// `double`
    F64,
    /// `char`, one ASCII byte
    Char,
}

impl ElementKind {
    /// Resolve a primitive token, versioned suffix tolerated.
    #[must_use]
    pub fn from_primitive(token: &str) -> Option<Self> {
        let token = token.strip_suffix(VERSIONED_SUFFIX).unwrap_or(token);
        match token {
            "char" => Some(Self::Char),
            "int8_t" => Some(Self::I8),
            "uint8_t" => Some(Self::U8),
            "int16_t" => Some(Self::I16),
            "uint16_t" => Some(Self::U16),
            "int32_t" => Some(Self::I32),
            "uint32_t" => Some(Self::U32),
            "int64_t" => Some(Self::I64),
            "uint64_t" => Some(Self::U64),
            "float" => Some(Self::F32),
            "double" => Some(Self::F64),
            _ => None,
        }
    }

    /// Element size in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Char => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I8 => "int8_t",
            Self::U8 => "uint8_t",
            Self::I16 => "int16_t",
            Self::U16 => "uint16_t",
            Self::I32 => "int32_t",
            Self::U32 => "uint32_t",
            Self::I64 => "int64_t",
            Self::U64 => "uint64_t",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::Char => "char",
        };
        write!(f, "{name}")
    }
}

/// A resolved declared type: element kind plus array length (0 for scalars).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireType {
    /// Primitive element kind.
    pub kind: ElementKind,
    /// Array length; 0 for scalars.
    pub array_len: usize,
    /// Total byte length on the wire.
    pub length: usize,
}

/// Parse a declared type string (`uint16_t`, `float[4]`, `char[50]`).
///
/// `context` names the message and field for diagnostics.
pub fn parse_declared(declared: &str, context: &str) -> Result<WireType> {
    let bad = || Error::BadType {
        context: context.to_string(),
        declared: declared.to_string(),
    };

    let (token, array_len) = match declared.find('[') {
        Some(open) => {
            let close = declared.rfind(']').filter(|&c| c > open).ok_or_else(bad)?;
            if close != declared.len() - 1 {
                return Err(bad());
            }
            let digits = &declared[open + 1..close];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad());
            }
            let len: usize = digits.parse().map_err(|_| bad())?;
            if len == 0 || len > crate::protocol::MAX_PAYLOAD_LEN {
                return Err(bad());
            }
            (&declared[..open], len)
        }
        None => (declared, 0),
    };

    let kind = ElementKind::from_primitive(token).ok_or_else(bad)?;
    let length = kind.size() * array_len.max(1);

    Ok(WireType {
        kind,
        array_len,
        length,
    })
}
