//! Schema-driven payload codec.
//!
//! Reads and writes payload fields at the byte offsets precomputed by the
//! schema compiler. All values are little-endian on the wire; numeric
//! arrays are contiguous runs of little-endian elements; `char[N]` fields
//! are raw ASCII bytes.
//!
//! Readers always operate on a buffer zero-padded to the schema's
//! `max_payload_len`, so fields truncated off the wire (v2 trailing-zero
//! truncation, extensions absent on v1) decode to the zero value of their
//! type.

use std::collections::HashMap;

use crate::dialect::{ElementKind, FieldSchema, MessageSchema};
use crate::protocol::{Error, FieldValue, Result};

/// Decode every field of `schema` from a zero-padded payload buffer.
///
/// The caller guarantees `payload.len() >= schema.max_payload_len`.
pub(crate) fn decode_fields(
    schema: &MessageSchema,
    payload: &[u8],
) -> HashMap<String, FieldValue> {
    schema
        .fields
        .iter()
        .map(|field| (field.name.clone(), read_field(field, payload)))
        .collect()
}

/// Encode a name-keyed value map into a payload buffer of `width` bytes.
///
/// Fields absent from the map encode as zero. Values whose field does not
/// fit the buffer (extension values on a v1 encode) are dropped.
pub(crate) fn encode_fields(
    schema: &MessageSchema,
    values: &HashMap<String, FieldValue>,
    width: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; width];
    for (name, value) in values {
        let field = schema
            .field(name)
            .ok_or_else(|| Error::FieldNameUnknown {
                message: schema.name.clone(),
                field: name.clone(),
            })?;
        if field.offset + field.length > width {
            continue;
        }
        write_field(&schema.name, field, &mut buf, value)?;
    }
    Ok(buf)
}

fn read_scalar(kind: ElementKind, buf: &[u8], offset: usize) -> FieldValue {
    // The buffer is sized from the same schema the offsets came from.
    match kind {
        ElementKind::U8 => FieldValue::U8(buf[offset]),
        ElementKind::I8 => FieldValue::I8(buf[offset] as i8),
        ElementKind::U16 => {
            FieldValue::U16(u16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap()))
        }
        ElementKind::I16 => {
            FieldValue::I16(i16::from_le_bytes(buf[offset..offset + 2].try_into().unwrap()))
        }
        ElementKind::U32 => {
            FieldValue::U32(u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()))
        }
        ElementKind::I32 => {
            FieldValue::I32(i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()))
        }
        ElementKind::U64 => {
            FieldValue::U64(u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap()))
        }
        ElementKind::I64 => {
            FieldValue::I64(i64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap()))
        }
        ElementKind::F32 => {
            FieldValue::F32(f32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()))
        }
        ElementKind::F64 => {
            FieldValue::F64(f64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap()))
        }
        ElementKind::Char => FieldValue::Char(vec![buf[offset]]),
    }
}

macro_rules! read_array {
    ($variant:ident, $ty:ty, $buf:expr, $offset:expr, $len:expr, $size:expr) => {{
        let mut items = Vec::with_capacity($len);
        for i in 0..$len {
            let at = $offset + i * $size;
            items.push(<$ty>::from_le_bytes($buf[at..at + $size].try_into().unwrap()));
        }
        FieldValue::$variant(items)
    }};
}

/// Read one field from a zero-padded payload buffer.
pub(crate) fn read_field(field: &FieldSchema, buf: &[u8]) -> FieldValue {
    if field.array_len == 0 {
        return read_scalar(field.kind, buf, field.offset);
    }
    let (offset, len, size) = (field.offset, field.array_len, field.element_size);
    match field.kind {
        ElementKind::Char => FieldValue::Char(buf[offset..offset + len].to_vec()),
        ElementKind::U8 => FieldValue::U8Array(buf[offset..offset + len].to_vec()),
        ElementKind::I8 => {
            FieldValue::I8Array(buf[offset..offset + len].iter().map(|&b| b as i8).collect())
        }
        ElementKind::U16 => read_array!(U16Array, u16, buf, offset, len, size),
        ElementKind::I16 => read_array!(I16Array, i16, buf, offset, len, size),
        ElementKind::U32 => read_array!(U32Array, u32, buf, offset, len, size),
        ElementKind::I32 => read_array!(I32Array, i32, buf, offset, len, size),
        ElementKind::U64 => read_array!(U64Array, u64, buf, offset, len, size),
        ElementKind::I64 => read_array!(I64Array, i64, buf, offset, len, size),
        ElementKind::F32 => read_array!(F32Array, f32, buf, offset, len, size),
        ElementKind::F64 => read_array!(F64Array, f64, buf, offset, len, size),
    }
}

macro_rules! write_elements {
    ($items:expr, $buf:expr, $field:expr, $mismatch:expr) => {{
        if $items.len() > $field.array_len.max(1) {
            return Err($mismatch);
        }
        for (i, item) in $items.iter().enumerate() {
            let at = $field.offset + i * $field.element_size;
            $buf[at..at + $field.element_size].copy_from_slice(&item.to_le_bytes());
        }
        Ok(())
    }};
}

/// Write one field value into a payload buffer.
///
/// Scalar fields require the exact matching variant. Array fields accept up
/// to `array_len` elements and zero-pad the rest; `char[N]` accepts up to N
/// bytes.
fn write_field(
    message: &str,
    field: &FieldSchema,
    buf: &mut [u8],
    value: &FieldValue,
) -> Result<()> {
    let mismatch = || Error::FieldTypeMismatch {
        message: message.to_string(),
        field: field.name.clone(),
        expected: field.declared_type.clone(),
    };

    if field.array_len == 0 && field.kind != ElementKind::Char {
        let offset = field.offset;
        return match (field.kind, value) {
            (ElementKind::U8, FieldValue::U8(v)) => {
                buf[offset] = *v;
                Ok(())
            }
            (ElementKind::I8, FieldValue::I8(v)) => {
                buf[offset] = *v as u8;
                Ok(())
            }
            (ElementKind::U16, FieldValue::U16(v)) => {
                buf[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            (ElementKind::I16, FieldValue::I16(v)) => {
                buf[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            (ElementKind::U32, FieldValue::U32(v)) => {
                buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            (ElementKind::I32, FieldValue::I32(v)) => {
                buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            (ElementKind::U64, FieldValue::U64(v)) => {
                buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            (ElementKind::I64, FieldValue::I64(v)) => {
                buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            (ElementKind::F32, FieldValue::F32(v)) => {
                buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            (ElementKind::F64, FieldValue::F64(v)) => {
                buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
                Ok(())
            }
            _ => Err(mismatch()),
        };
    }

    match (field.kind, value) {
        (ElementKind::Char, FieldValue::Char(bytes)) => {
            let capacity = field.array_len.max(1);
            if bytes.len() > capacity {
                return Err(mismatch());
            }
            buf[field.offset..field.offset + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
        (ElementKind::U8, FieldValue::U8Array(items)) => {
            if items.len() > field.array_len {
                return Err(mismatch());
            }
            buf[field.offset..field.offset + items.len()].copy_from_slice(items);
            Ok(())
        }
        (ElementKind::I8, FieldValue::I8Array(items)) => {
            if items.len() > field.array_len {
                return Err(mismatch());
            }
            for (i, item) in items.iter().enumerate() {
                buf[field.offset + i] = *item as u8;
            }
            Ok(())
        }
        (ElementKind::U16, FieldValue::U16Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        (ElementKind::I16, FieldValue::I16Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        (ElementKind::U32, FieldValue::U32Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        (ElementKind::I32, FieldValue::I32Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        (ElementKind::U64, FieldValue::U64Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        (ElementKind::I64, FieldValue::I64Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        (ElementKind::F32, FieldValue::F32Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        (ElementKind::F64, FieldValue::F64Array(items)) => {
            write_elements!(items, buf, field, mismatch())
        }
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::loader::{RawField, RawMessage};
    use crate::dialect::schema::compile_message;

    fn schema() -> MessageSchema {
        let raw = RawMessage {
            id: 42,
            name: "MIXED".to_string(),
            fields: vec![
                RawField {
                    declared_type: "uint32_t".to_string(),
                    name: "stamp".to_string(),
                    extended: false,
                },
                RawField {
                    declared_type: "float[3]".to_string(),
                    name: "axes".to_string(),
                    extended: false,
                },
                RawField {
                    declared_type: "char[8]".to_string(),
                    name: "label".to_string(),
                    extended: false,
                },
                RawField {
                    declared_type: "int16_t".to_string(),
                    name: "bias".to_string(),
                    extended: true,
                },
            ],
        };
        compile_message(&raw).unwrap()
    }

    #[test]
    fn test_roundtrip_mixed_fields() {
        let schema = schema();
        let mut values = HashMap::new();
        values.insert("stamp".to_string(), FieldValue::U32(123_456));
        values.insert(
            "axes".to_string(),
            FieldValue::F32Array(vec![1.0, -2.5, 0.25]),
        );
        values.insert("label".to_string(), FieldValue::Char(b"pose".to_vec()));
        values.insert("bias".to_string(), FieldValue::I16(-12));

        let buf = encode_fields(&schema, &values, schema.max_payload_len).unwrap();
        let decoded = decode_fields(&schema, &buf);

        assert_eq!(decoded["stamp"], FieldValue::U32(123_456));
        assert_eq!(
            decoded["axes"],
            FieldValue::F32Array(vec![1.0, -2.5, 0.25])
        );
        assert_eq!(decoded["bias"], FieldValue::I16(-12));
        // Char reads are presented at full width, padding included.
        assert_eq!(decoded["label"].as_str(), Some("pose"));
        assert!(matches!(&decoded["label"], FieldValue::Char(b) if b.len() == 8));
    }

    #[test]
    fn test_truncated_extension_reads_zero() {
        let schema = schema();
        // Wire carried only the base payload; the caller zero-pads.
        let mut buf = vec![0u8; schema.max_payload_len];
        buf[0] = 7;
        let decoded = decode_fields(&schema, &buf);
        assert_eq!(decoded["bias"], FieldValue::I16(0));
    }

    #[test]
    fn test_unknown_field_name() {
        let schema = schema();
        let mut values = HashMap::new();
        values.insert("nope".to_string(), FieldValue::U8(1));
        let err = encode_fields(&schema, &values, schema.max_payload_len).unwrap_err();
        assert!(matches!(err, Error::FieldNameUnknown { field, .. } if field == "nope"));
    }

    #[test]
    fn test_type_mismatch() {
        let schema = schema();
        let mut values = HashMap::new();
        values.insert("stamp".to_string(), FieldValue::F32(1.0));
        let err = encode_fields(&schema, &values, schema.max_payload_len).unwrap_err();
        assert!(matches!(err, Error::FieldTypeMismatch { field, .. } if field == "stamp"));
    }

    #[test]
    fn test_array_too_long_rejected() {
        let schema = schema();
        let mut values = HashMap::new();
        values.insert(
            "axes".to_string(),
            FieldValue::F32Array(vec![0.0, 0.0, 0.0, 0.0]),
        );
        assert!(encode_fields(&schema, &values, schema.max_payload_len).is_err());
    }

    #[test]
    fn test_extension_value_dropped_on_v1_width() {
        let schema = schema();
        let mut values = HashMap::new();
        values.insert("bias".to_string(), FieldValue::I16(99));
        let buf = encode_fields(&schema, &values, schema.base_payload_len).unwrap();
        assert_eq!(buf.len(), schema.base_payload_len);
    }
}
