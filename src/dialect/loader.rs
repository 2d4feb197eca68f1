//! Dialect XML loader.
//!
//! Reads MAVLink dialect documents (root element `mavlink`) into raw,
//! uncompiled message and enum definitions. `<include>` references are
//! resolved recursively through a caller-provided [`DialectResolver`]; each
//! file is loaded at most once, which also makes include cycles safe.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use crate::dialect::schema::ParamMeta;
use crate::protocol::{Error, MAX_MESSAGE_ID, Result};

/// Resolves a dialect file name to its XML text.
///
/// The loader only ever asks for file names (`common.xml`); path semantics
/// belong to the resolver. Implementations may read the file system, embedded
/// resources, or in-memory fixtures.
pub trait DialectResolver {
    /// Return the XML text for `name`, or [`Error::DialectNotFound`].
    fn resolve(&self, name: &str) -> Result<String>;
}

/// File-system resolver rooted at a dialects directory.
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    /// Resolver reading from the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default resolver: a `dialects` directory adjacent to the running
    /// executable, falling back to `./dialects`.
    #[must_use]
    pub fn adjacent_to_executable() -> Self {
        let root = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("dialects")))
            .unwrap_or_else(|| PathBuf::from("dialects"));
        Self { root }
    }
}

impl Default for FsResolver {
    fn default() -> Self {
        Self::adjacent_to_executable()
    }
}

impl DialectResolver for FsResolver {
    fn resolve(&self, name: &str) -> Result<String> {
        std::fs::read_to_string(self.root.join(name)).map_err(|_| Error::DialectNotFound {
            name: name.to_string(),
        })
    }
}

/// In-memory resolver for embedded dialects and test fixtures.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    files: HashMap<String, String>,
}

impl MapResolver {
    /// Empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dialect document under a file name.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.files.insert(name.into(), text.into());
        self
    }
}

impl DialectResolver for MapResolver {
    fn resolve(&self, name: &str) -> Result<String> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DialectNotFound {
                name: name.to_string(),
            })
    }
}

/// Raw message field as declared in XML.
#[derive(Debug, Clone)]
pub(crate) struct RawField {
    pub declared_type: String,
    pub name: String,
    pub extended: bool,
}

/// Raw message definition as declared in XML.
#[derive(Debug, Clone)]
pub(crate) struct RawMessage {
    pub id: u32,
    pub name: String,
    pub fields: Vec<RawField>,
}

/// Raw enum entry as declared in XML.
#[derive(Debug, Clone)]
pub(crate) struct RawEntry {
    pub name: String,
    pub value: i64,
    pub params: Vec<ParamMeta>,
}

/// Raw enum definition as declared in XML.
#[derive(Debug, Clone)]
pub(crate) struct RawEnum {
    pub name: String,
    pub bitmask: bool,
    pub entries: Vec<RawEntry>,
}

/// One parsed dialect document, uncompiled.
#[derive(Debug, Clone)]
pub(crate) struct RawDialect {
    pub name: String,
    pub version: Option<u32>,
    pub includes: Vec<String>,
    pub messages: Vec<RawMessage>,
    pub enums: Vec<RawEnum>,
}

/// All dialects reachable from a root document, includes first.
#[derive(Debug, Clone)]
pub(crate) struct DialectBundle {
    pub root: String,
    pub dialects: Vec<RawDialect>,
}

/// Load `root` and everything it includes, each file exactly once.
pub(crate) fn load(resolver: &dyn DialectResolver, root: &str) -> Result<DialectBundle> {
    let mut loaded = HashSet::new();
    let mut dialects = Vec::new();
    load_recursive(resolver, root, &mut loaded, &mut dialects)?;
    Ok(DialectBundle {
        root: root.to_string(),
        dialects,
    })
}

fn load_recursive(
    resolver: &dyn DialectResolver,
    name: &str,
    loaded: &mut HashSet<String>,
    out: &mut Vec<RawDialect>,
) -> Result<()> {
    // Keying on the file name breaks include cycles.
    if !loaded.insert(name.to_string()) {
        return Ok(());
    }

    let text = resolver.resolve(name)?;
    let dialect = parse_dialect(name, &text)?;
    debug!(
        dialect = name,
        messages = dialect.messages.len(),
        enums = dialect.enums.len(),
        includes = dialect.includes.len(),
        "loaded dialect"
    );

    for include in dialect.includes.clone() {
        load_recursive(resolver, &include, loaded, out)?;
    }
    out.push(dialect);
    Ok(())
}

fn attr_value(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn parse_error(name: &str, detail: impl Into<String>) -> Error {
    Error::DialectParseError {
        name: name.to_string(),
        detail: detail.into(),
    }
}

/// Parse one enum entry value: decimal, `0x` hex, or `2**n` power notation.
fn parse_entry_value(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    if let Some((base, exp)) = text.split_once("**") {
        let base: u32 = base.trim().parse().ok()?;
        let exp: u32 = exp.trim().parse().ok()?;
        return (base as u64).checked_pow(exp).map(|v| v as i64);
    }
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<u64>().ok().map(|v| v as i64))
}

fn parse_param(element: &BytesStart<'_>) -> Option<ParamMeta> {
    let index: u8 = attr_value(element, b"index")?.parse().ok()?;
    if !(1..=7).contains(&index) {
        return None;
    }
    Some(ParamMeta {
        index,
        label: attr_value(element, b"label"),
        units: attr_value(element, b"units"),
        min: attr_value(element, b"minValue").and_then(|v| v.parse().ok()),
        max: attr_value(element, b"maxValue").and_then(|v| v.parse().ok()),
    })
}

fn parse_dialect(name: &str, text: &str) -> Result<RawDialect> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut dialect = RawDialect {
        name: name.to_string(),
        version: None,
        includes: Vec::new(),
        messages: Vec::new(),
        enums: Vec::new(),
    };

    let mut saw_root = false;
    let mut in_enums = false;
    let mut in_messages = false;
    let mut in_extensions = false;
    let mut current_message: Option<RawMessage> = None;
    let mut current_field: Option<RawField> = None;
    let mut current_enum: Option<RawEnum> = None;
    let mut current_entry: Option<RawEntry> = None;
    let mut buf = Vec::new();
    let mut text_buf = String::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(name, e.to_string()))?;
        match event {
            Event::Start(e) => {
                if !saw_root {
                    if e.name().as_ref() != b"mavlink" {
                        return Err(parse_error(name, "root element is not <mavlink>"));
                    }
                    saw_root = true;
                    buf.clear();
                    continue;
                }
                match e.name().as_ref() {
                    b"include" | b"version" | b"dialect" => text_buf.clear(),
                    b"enums" => in_enums = true,
                    b"messages" => in_messages = true,
                    b"extensions" => in_extensions = true,
                    b"enum" if in_enums => {
                        current_enum = Some(RawEnum {
                            name: attr_value(&e, b"name").unwrap_or_default(),
                            bitmask: attr_value(&e, b"bitmask")
                                .is_some_and(|v| v == "true" || v == "1"),
                            entries: Vec::new(),
                        });
                    }
                    b"entry" if current_enum.is_some() => {
                        let value = attr_value(&e, b"value")
                            .as_deref()
                            .and_then(parse_entry_value)
                            .ok_or_else(|| {
                                parse_error(name, "enum entry without a parseable value")
                            })?;
                        current_entry = Some(RawEntry {
                            name: attr_value(&e, b"name").unwrap_or_default(),
                            value,
                            params: Vec::new(),
                        });
                    }
                    b"param" => {
                        if let (Some(entry), Some(param)) =
                            (current_entry.as_mut(), parse_param(&e))
                        {
                            entry.params.push(param);
                        }
                    }
                    b"message" if in_messages => {
                        let id: u32 = attr_value(&e, b"id")
                            .and_then(|v| v.trim().parse().ok())
                            .ok_or_else(|| {
                                parse_error(name, "message without a numeric id")
                            })?;
                        if id > MAX_MESSAGE_ID {
                            return Err(parse_error(
                                name,
                                format!("message id {id} exceeds the 24-bit range"),
                            ));
                        }
                        in_extensions = false;
                        current_message = Some(RawMessage {
                            id,
                            name: attr_value(&e, b"name").unwrap_or_default(),
                            fields: Vec::new(),
                        });
                    }
                    b"field" if current_message.is_some() => {
                        current_field = Some(RawField {
                            declared_type: attr_value(&e, b"type").unwrap_or_default(),
                            name: attr_value(&e, b"name").unwrap_or_default(),
                            extended: in_extensions,
                        });
                    }
                    // <description>, <wip>, <deprecated>, and anything else
                    // are tolerated and skipped.
                    _ => {}
                }
            }

            Event::Empty(e) => match e.name().as_ref() {
                b"extensions" => in_extensions = true,
                b"entry" if current_enum.is_some() => {
                    let value = attr_value(&e, b"value")
                        .as_deref()
                        .and_then(parse_entry_value)
                        .ok_or_else(|| {
                            parse_error(name, "enum entry without a parseable value")
                        })?;
                    let entry = RawEntry {
                        name: attr_value(&e, b"name").unwrap_or_default(),
                        value,
                        params: Vec::new(),
                    };
                    if let Some(enum_def) = current_enum.as_mut() {
                        if !entry.name.is_empty() {
                            enum_def.entries.push(entry);
                        }
                    }
                }
                b"field" if current_message.is_some() => {
                    if let Some(message) = current_message.as_mut() {
                        let field = RawField {
                            declared_type: attr_value(&e, b"type").unwrap_or_default(),
                            name: attr_value(&e, b"name").unwrap_or_default(),
                            extended: in_extensions,
                        };
                        if !field.declared_type.is_empty() && !field.name.is_empty() {
                            message.fields.push(field);
                        }
                    }
                }
                b"param" => {
                    if let (Some(entry), Some(param)) = (current_entry.as_mut(), parse_param(&e))
                    {
                        entry.params.push(param);
                    }
                }
                _ => {}
            },

            Event::Text(e) => {
                text_buf = String::from_utf8_lossy(&e).into_owned();
            }

            Event::End(e) => match e.name().as_ref() {
                b"include" => {
                    let include = text_buf.trim();
                    if !include.is_empty() {
                        dialect.includes.push(include.to_string());
                    }
                    text_buf.clear();
                }
                b"version" => {
                    dialect.version = text_buf.trim().parse().ok();
                    text_buf.clear();
                }
                b"enums" => in_enums = false,
                b"messages" => in_messages = false,
                b"entry" => {
                    if let (Some(entry), Some(enum_def)) =
                        (current_entry.take(), current_enum.as_mut())
                    {
                        if !entry.name.is_empty() {
                            enum_def.entries.push(entry);
                        }
                    }
                }
                b"enum" => {
                    if let Some(enum_def) = current_enum.take() {
                        if !enum_def.name.is_empty() {
                            dialect.enums.push(enum_def);
                        }
                    }
                }
                b"field" => {
                    if let (Some(field), Some(message)) =
                        (current_field.take(), current_message.as_mut())
                    {
                        if !field.declared_type.is_empty() && !field.name.is_empty() {
                            message.fields.push(field);
                        }
                    }
                }
                b"message" => {
                    in_extensions = false;
                    if let Some(message) = current_message.take() {
                        if !message.name.is_empty() {
                            dialect.messages.push(message);
                        }
                    }
                }
                _ => {}
            },

            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(parse_error(name, "document has no <mavlink> root"));
    }
    Ok(dialect)
}
