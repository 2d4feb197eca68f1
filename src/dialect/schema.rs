//! Compiled message and enum schemas.
//!
//! The loader produces raw declarations; this module finalizes them: field
//! types are resolved, fields are put into wire order, byte offsets are
//! assigned, payload lengths are summed, and the schema's `CRC_EXTRA` byte
//! is derived.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::crc;
use crate::dialect::loader::{RawEnum, RawMessage};
use crate::dialect::types::{self, ElementKind, VERSIONED_SUFFIX};
use crate::protocol::{Error, MAX_PAYLOAD_LEN, Result};

/// Parameter metadata attached to an enum entry (`MAV_CMD` style).
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMeta {
    /// Parameter slot, 1..=7.
    pub index: u8,
    /// Human-readable label.
    pub label: Option<String>,
    /// Unit string.
    pub units: Option<String>,
    /// Minimum value.
    pub min: Option<f64>,
    /// Maximum value.
    pub max: Option<f64>,
}

/// One enum entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryValue {
    /// Entry value; 64-bit signed to cover the full range dialects use.
    pub value: i64,
    /// Entry name.
    pub name: String,
    /// Parameter metadata, if declared.
    pub params: Vec<ParamMeta>,
}

/// A compiled enum. Enums are metadata only; the codec never interprets
/// enum values.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumSchema {
    /// Enum name.
    pub name: String,
    /// Whether entries are bit flags.
    pub bitmask: bool,
    /// Entries in declaration order.
    pub entries: Vec<EntryValue>,
}

/// A compiled payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Type string as declared in XML (`uint16_t`, `float[4]`).
    pub declared_type: String,
    /// Field name.
    pub name: String,
    /// Resolved element kind.
    pub kind: ElementKind,
    /// Array length; 0 for scalars.
    pub array_len: usize,
    /// Size of one element in bytes.
    pub element_size: usize,
    /// Total wire length in bytes.
    pub length: usize,
    /// Byte offset within the payload.
    pub offset: usize,
    /// Declared after the `<extensions/>` marker.
    pub extended: bool,
}

/// A compiled message schema.
#[derive(Debug)]
pub struct MessageSchema {
    /// 24-bit wire id.
    pub id: u32,
    /// Message name.
    pub name: String,
    /// Fields in wire order: base fields stably sorted by descending
    /// element size, then extension fields in declaration order.
    pub fields: Vec<FieldSchema>,
    /// Payload length covering base fields only (the v1 payload).
    pub base_payload_len: usize,
    /// Payload length covering all fields (the full v2 payload).
    pub max_payload_len: usize,
    /// Schema drift detection byte folded into every frame checksum.
    pub crc_extra: u8,
    included: AtomicBool,
}

impl MessageSchema {
    /// Look up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Whether frames of this message pass the decode filter.
    #[must_use]
    pub fn is_included(&self) -> bool {
        self.included.load(Ordering::Relaxed)
    }

    pub(crate) fn set_included(&self, included: bool) {
        self.included.store(included, Ordering::Relaxed);
    }
}

/// Compile one raw message into its schema.
pub(crate) fn compile_message(raw: &RawMessage) -> Result<MessageSchema> {
    let mut base = Vec::new();
    let mut extended = Vec::new();

    for field in &raw.fields {
        let context = format!("{}.{}", raw.name, field.name);
        let ty = types::parse_declared(&field.declared_type, &context)?;
        let compiled = FieldSchema {
            declared_type: field.declared_type.clone(),
            name: field.name.clone(),
            kind: ty.kind,
            array_len: ty.array_len,
            element_size: ty.kind.size(),
            length: ty.length,
            offset: 0,
            extended: field.extended,
        };
        if field.extended {
            extended.push(compiled);
        } else {
            base.push(compiled);
        }
    }

    // Wire order: base fields by descending element size (Vec::sort_by is
    // stable, preserving declaration order for equal sizes), then extension
    // fields in declaration order.
    base.sort_by(|a, b| b.element_size.cmp(&a.element_size));

    let mut fields = base;
    fields.extend(extended);

    let mut offset = 0;
    for field in &mut fields {
        field.offset = offset;
        offset += field.length;
    }

    let base_payload_len = fields
        .iter()
        .filter(|f| !f.extended)
        .map(|f| f.length)
        .sum::<usize>();
    let max_payload_len = offset;

    if max_payload_len > MAX_PAYLOAD_LEN {
        return Err(Error::DialectParseError {
            name: raw.name.clone(),
            detail: format!(
                "message payload is {max_payload_len} bytes (max {MAX_PAYLOAD_LEN})"
            ),
        });
    }

    let crc_extra = derive_crc_extra(&raw.name, &fields);

    Ok(MessageSchema {
        id: raw.id,
        name: raw.name.clone(),
        fields,
        base_payload_len,
        max_payload_len,
        crc_extra,
        included: AtomicBool::new(true),
    })
}

/// Strip a trailing `[N]` and the versioned suffix from a declared type.
fn curated_type(declared: &str) -> &str {
    let primitive = match declared.find('[') {
        Some(open) => &declared[..open],
        None => declared,
    };
    primitive.strip_suffix(VERSIONED_SUFFIX).unwrap_or(primitive)
}

/// Derive `CRC_EXTRA`: hash the message name and, for every base field in
/// wire order, the curated type, the field name, and (for arrays) the raw
/// array length byte; then fold the 16-bit result to 8 bits.
fn derive_crc_extra(message_name: &str, fields: &[FieldSchema]) -> u8 {
    let mut crc = crc::CRC_INIT;
    let feed = |bytes: &[u8], crc: u16| -> u16 {
        bytes.iter().fold(crc, |acc, &b| crc::accumulate(b, acc))
    };

    crc = feed(message_name.as_bytes(), crc);
    crc = crc::accumulate(b' ', crc);

    for field in fields.iter().filter(|f| !f.extended) {
        crc = feed(curated_type(&field.declared_type).as_bytes(), crc);
        crc = crc::accumulate(b' ', crc);
        crc = feed(field.name.as_bytes(), crc);
        crc = crc::accumulate(b' ', crc);
        if field.array_len > 0 {
            crc = crc::accumulate(field.array_len as u8, crc);
        }
    }

    ((crc & 0xFF) ^ (crc >> 8)) as u8
}

/// Compile a raw enum, merging is handled by the catalog.
pub(crate) fn compile_enum(raw: &RawEnum) -> EnumSchema {
    EnumSchema {
        name: raw.name.clone(),
        bitmask: raw.bitmask,
        entries: raw
            .entries
            .iter()
            .map(|entry| EntryValue {
                value: entry.value,
                name: entry.name.clone(),
                params: entry.params.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::loader::RawField;

    fn raw_field(declared: &str, name: &str, extended: bool) -> RawField {
        RawField {
            declared_type: declared.to_string(),
            name: name.to_string(),
            extended,
        }
    }

    fn heartbeat() -> RawMessage {
        RawMessage {
            id: 0,
            name: "HEARTBEAT".to_string(),
            fields: vec![
                raw_field("uint8_t", "type", false),
                raw_field("uint8_t", "autopilot", false),
                raw_field("uint8_t", "base_mode", false),
                raw_field("uint32_t", "custom_mode", false),
                raw_field("uint8_t", "system_status", false),
                raw_field("uint8_t_mavlink_version", "mavlink_version", false),
            ],
        }
    }

    #[test]
    fn test_heartbeat_layout_and_crc_extra() {
        let schema = compile_message(&heartbeat()).unwrap();

        // custom_mode (4 bytes) is hoisted to offset 0; the 1-byte fields
        // follow in declaration order.
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "custom_mode",
                "type",
                "autopilot",
                "base_mode",
                "system_status",
                "mavlink_version"
            ]
        );
        assert_eq!(schema.field("custom_mode").unwrap().offset, 0);
        assert_eq!(schema.field("type").unwrap().offset, 4);
        assert_eq!(schema.field("mavlink_version").unwrap().offset, 8);
        assert_eq!(schema.base_payload_len, 9);
        assert_eq!(schema.max_payload_len, 9);

        // Pinned against the published MAVLink value; exercises the
        // `_mavlink_version` suffix curation.
        assert_eq!(schema.crc_extra, 50);
    }

    #[test]
    fn test_attitude_crc_extra() {
        let raw = RawMessage {
            id: 30,
            name: "ATTITUDE".to_string(),
            fields: vec![
                raw_field("uint32_t", "time_boot_ms", false),
                raw_field("float", "roll", false),
                raw_field("float", "pitch", false),
                raw_field("float", "yaw", false),
                raw_field("float", "rollspeed", false),
                raw_field("float", "pitchspeed", false),
                raw_field("float", "yawspeed", false),
            ],
        };
        let schema = compile_message(&raw).unwrap();
        assert_eq!(schema.max_payload_len, 28);
        assert_eq!(schema.crc_extra, 39);
    }

    #[test]
    fn test_extensions_excluded_from_crc_and_base_len() {
        let raw = RawMessage {
            id: 9000,
            name: "WIND_COV_LIKE".to_string(),
            fields: vec![
                raw_field("uint64_t", "time_usec", false),
                raw_field("float", "wind_x", false),
                raw_field("uint8_t", "flags", true),
                raw_field("float", "wind_alt", true),
            ],
        };
        let schema = compile_message(&raw).unwrap();
        assert_eq!(schema.base_payload_len, 12);
        assert_eq!(schema.max_payload_len, 17);

        // Extension fields keep declaration order after the base fields.
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["time_usec", "wind_x", "flags", "wind_alt"]);
        assert_eq!(schema.field("flags").unwrap().offset, 12);
        assert_eq!(schema.field("wind_alt").unwrap().offset, 13);

        // CRC_EXTRA ignores extensions entirely.
        let base_only = RawMessage {
            id: 9000,
            name: "WIND_COV_LIKE".to_string(),
            fields: vec![
                raw_field("uint64_t", "time_usec", false),
                raw_field("float", "wind_x", false),
            ],
        };
        assert_eq!(
            schema.crc_extra,
            compile_message(&base_only).unwrap().crc_extra
        );
    }

    #[test]
    fn test_array_length_feeds_crc() {
        let with_array = RawMessage {
            id: 1,
            name: "M".to_string(),
            fields: vec![raw_field("uint8_t[4]", "data", false)],
        };
        let with_other_array = RawMessage {
            id: 1,
            name: "M".to_string(),
            fields: vec![raw_field("uint8_t[5]", "data", false)],
        };
        assert_ne!(
            compile_message(&with_array).unwrap().crc_extra,
            compile_message(&with_other_array).unwrap().crc_extra
        );
    }

    #[test]
    fn test_stable_order_for_equal_sizes() {
        let raw = RawMessage {
            id: 2,
            name: "EQ".to_string(),
            fields: vec![
                raw_field("uint16_t", "b", false),
                raw_field("int16_t", "a", false),
                raw_field("uint16_t", "c", false),
            ],
        };
        let schema = compile_message(&raw).unwrap();
        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let raw = RawMessage {
            id: 3,
            name: "HUGE".to_string(),
            fields: vec![
                raw_field("uint8_t[200]", "a", false),
                raw_field("uint8_t[100]", "b", false),
            ],
        };
        assert!(matches!(
            compile_message(&raw),
            Err(Error::DialectParseError { .. })
        ));
    }
}
