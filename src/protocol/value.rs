//! Tagged payload field values.

use std::fmt;

use crate::dialect::ElementKind;

/// A decoded payload field: one scalar variant per wire primitive, one
/// homogeneous-array variant per numeric primitive, and a raw byte vector
/// for `char[N]` fields.
///
/// Char arrays are presented exactly as they appear on the wire, padding
/// bytes included; use [`FieldValue::as_str`] for a trimmed view.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `uint8_t`
    U8(u8),
    /// `int8_t`
    I8(i8),
    /// `uint16_t`
    U16(u16),
    /// `int16_t`
    I16(i16),
    /// `uint32_t`
    U32(u32),
    /// `int32_t`
    I32(i32),
    /// `uint64_t`
    U64(u64),
    /// `int64_t`
    I64(i64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// `uint8_t[N]`
    U8Array(Vec<u8>),
    /// `int8_t[N]`
    I8Array(Vec<i8>),
    /// `uint16_t[N]`
    U16Array(Vec<u16>),
    /// `int16_t[N]`
    I16Array(Vec<i16>),
    /// `uint32_t[N]`
    U32Array(Vec<u32>),
    /// `int32_t[N]`
    I32Array(Vec<i32>),
    /// `uint64_t[N]`
    U64Array(Vec<u64>),
    /// `int64_t[N]`
    I64Array(Vec<i64>),
    /// `float[N]`
    F32Array(Vec<f32>),
    /// `double[N]`
    F64Array(Vec<f64>),
    /// `char[N]`, ASCII bytes
    Char(Vec<u8>),
}

impl FieldValue {
    /// Element kind this value carries.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::U8(_) | Self::U8Array(_) => ElementKind::U8,
            Self::I8(_) | Self::I8Array(_) => ElementKind::I8,
            Self::U16(_) | Self::U16Array(_) => ElementKind::U16,
            Self::I16(_) | Self::I16Array(_) => ElementKind::I16,
            Self::U32(_) | Self::U32Array(_) => ElementKind::U32,
            Self::I32(_) | Self::I32Array(_) => ElementKind::I32,
            Self::U64(_) | Self::U64Array(_) => ElementKind::U64,
            Self::I64(_) | Self::I64Array(_) => ElementKind::I64,
            Self::F32(_) | Self::F32Array(_) => ElementKind::F32,
            Self::F64(_) | Self::F64Array(_) => ElementKind::F64,
            Self::Char(_) => ElementKind::Char,
        }
    }

    /// Whether this value is an array variant.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            Self::U8Array(_)
                | Self::I8Array(_)
                | Self::U16Array(_)
                | Self::I16Array(_)
                | Self::U32Array(_)
                | Self::I32Array(_)
                | Self::U64Array(_)
                | Self::I64Array(_)
                | Self::F32Array(_)
                | Self::F64Array(_)
                | Self::Char(_)
        )
    }

    /// Scalar value widened to `u64`, if this is an unsigned scalar.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(u64::from(v)),
            Self::U16(v) => Some(u64::from(v)),
            Self::U32(v) => Some(u64::from(v)),
            Self::U64(v) => Some(v),
            _ => None,
        }
    }

    /// Scalar value widened to `i64`, if this is a signed scalar.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(i64::from(v)),
            Self::I16(v) => Some(i64::from(v)),
            Self::I32(v) => Some(i64::from(v)),
            Self::I64(v) => Some(v),
            _ => None,
        }
    }

    /// Scalar value widened to `f64`, if this is a float scalar.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(v) => Some(f64::from(v)),
            Self::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Char-array bytes as a string slice, trailing NULs trimmed.
    ///
    /// Returns `None` for non-char values or non-UTF-8 content.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Char(bytes) => {
                let end = bytes
                    .iter()
                    .position(|&b| b == 0)
                    .unwrap_or(bytes.len());
                std::str::from_utf8(&bytes[..end]).ok()
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{item}")?;
            }
            write!(f, "]")
        }

        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::U8Array(v) => list(f, v),
            Self::I8Array(v) => list(f, v),
            Self::U16Array(v) => list(f, v),
            Self::I16Array(v) => list(f, v),
            Self::U32Array(v) => list(f, v),
            Self::I32Array(v) => list(f, v),
            Self::U64Array(v) => list(f, v),
            Self::I64Array(v) => list(f, v),
            Self::F32Array(v) => list(f, v),
            Self::F64Array(v) => list(f, v),
            Self::Char(_) => write!(f, "{:?}", self.as_str().unwrap_or("<non-utf8>")),
        }
    }
}
