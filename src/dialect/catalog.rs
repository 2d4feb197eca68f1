//! Message catalog and the process-wide codec state.
//!
//! Compiling a dialect bundle installs every message and enum into a
//! [`Catalog`]. The catalog is held in a process-wide slot: initialized once
//! at startup, replaced wholesale on re-initialization, and read lock-free
//! by every encode/decode call through an [`Arc`] snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::dialect::loader::{self, DialectBundle, DialectResolver, FsResolver};
use crate::dialect::schema::{self, EntryValue, EnumSchema, MessageSchema};
use crate::protocol::{Error, Result};

/// The `MAV_CMD` enum feeding the command table.
const COMMAND_ENUM: &str = "MAV_CMD";

/// Wire id of HEARTBEAT, which is immune to exclusion.
const HEARTBEAT_ID: u32 = 0;

/// Immutable, compiled view of a dialect tree.
#[derive(Debug)]
pub struct Catalog {
    name: String,
    version: Option<u32>,
    messages: HashMap<u32, Arc<MessageSchema>>,
    by_name: HashMap<String, u32>,
    enums: HashMap<String, Arc<EnumSchema>>,
    commands: BTreeMap<i64, EntryValue>,
}

impl Catalog {
    /// Compile a loaded bundle into a catalog.
    pub(crate) fn compile(bundle: DialectBundle) -> Result<Self> {
        let mut messages: HashMap<u32, Arc<MessageSchema>> = HashMap::new();
        let mut by_name = HashMap::new();
        let mut merged_enums: Vec<EnumSchema> = Vec::new();
        let mut version = None;

        for dialect in &bundle.dialects {
            if dialect.name == bundle.root {
                version = dialect.version;
            }
            for raw in &dialect.messages {
                let compiled = schema::compile_message(raw)?;
                if let Some(previous) = messages.get(&compiled.id) {
                    return Err(Error::DuplicateMessageId {
                        id: compiled.id,
                        name: compiled.name,
                        previous: previous.name.clone(),
                    });
                }
                by_name.entry(compiled.name.clone()).or_insert(compiled.id);
                messages.insert(compiled.id, Arc::new(compiled));
            }
            for raw in &dialect.enums {
                let compiled = schema::compile_enum(raw);
                // Dialects may extend an enum declared by an include; the
                // entries merge under the first declaration.
                match merged_enums.iter_mut().find(|e| e.name == compiled.name) {
                    Some(existing) => existing.entries.extend(compiled.entries),
                    None => merged_enums.push(compiled),
                }
            }
        }

        let commands = merged_enums
            .iter()
            .find(|e| e.name == COMMAND_ENUM)
            .map(|e| {
                e.entries
                    .iter()
                    .map(|entry| (entry.value, entry.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let enums = merged_enums
            .into_iter()
            .map(|e| (e.name.clone(), Arc::new(e)))
            .collect();

        Ok(Self {
            name: bundle.root,
            version,
            messages,
            by_name,
            enums,
            commands,
        })
    }

    /// Root dialect file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol version declared by the root dialect.
    #[must_use]
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Message schema by wire id.
    #[must_use]
    pub fn message(&self, id: u32) -> Option<&Arc<MessageSchema>> {
        self.messages.get(&id)
    }

    /// Message schema by name.
    #[must_use]
    pub fn message_by_name(&self, name: &str) -> Option<&Arc<MessageSchema>> {
        self.by_name.get(name).and_then(|id| self.messages.get(id))
    }

    /// All message schemas, ordered by id.
    #[must_use]
    pub fn messages(&self) -> Vec<Arc<MessageSchema>> {
        let mut all: Vec<_> = self.messages.values().cloned().collect();
        all.sort_by_key(|schema| schema.id);
        all
    }

    /// Enum schema by name.
    #[must_use]
    pub fn enum_by_name(&self, name: &str) -> Option<&Arc<EnumSchema>> {
        self.enums.get(name)
    }

    /// All enum schemas, ordered by name.
    #[must_use]
    pub fn enums(&self) -> Vec<Arc<EnumSchema>> {
        let mut all: Vec<_> = self.enums.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// `MAV_CMD` entries keyed by command value.
    #[must_use]
    pub fn commands(&self) -> &BTreeMap<i64, EntryValue> {
        &self.commands
    }

    fn require_known(&self, ids: &[u32]) -> Result<()> {
        for &id in ids {
            if !self.messages.contains_key(&id) {
                return Err(Error::UnknownMessageId { id });
            }
        }
        Ok(())
    }

    /// Turn on exactly the given ids; an empty set means "all".
    pub(crate) fn include_only(&self, ids: &[u32]) -> Result<()> {
        self.require_known(ids)?;
        if ids.is_empty() {
            for schema in self.messages.values() {
                schema.set_included(true);
            }
            return Ok(());
        }
        for schema in self.messages.values() {
            schema.set_included(ids.contains(&schema.id));
        }
        Ok(())
    }

    /// Turn off the given ids. Excluding HEARTBEAT is a silent no-op.
    pub(crate) fn exclude(&self, ids: &[u32]) -> Result<()> {
        self.require_known(ids)?;
        for &id in ids {
            if id == HEARTBEAT_ID {
                continue;
            }
            if let Some(schema) = self.messages.get(&id) {
                schema.set_included(false);
            }
        }
        Ok(())
    }
}

static CATALOG: RwLock<Option<Arc<Catalog>>> = RwLock::new(None);

/// Snapshot of the active catalog, or [`Error::NotInitialized`].
pub(crate) fn current() -> Result<Arc<Catalog>> {
    CATALOG
        .read()
        .expect("catalog lock poisoned")
        .clone()
        .ok_or(Error::NotInitialized)
}

/// The codec facade: initialization, filtering, and catalog views.
///
/// All state lives in a process-wide catalog slot; every method is an
/// associated function.
pub struct Codec;

impl Codec {
    /// Load and compile `root` with the default file-system resolver, then
    /// install the catalog. A non-empty `ids` list restricts decoding to
    /// exactly those messages; an empty list includes everything.
    pub fn initialize(root: &str, ids: &[u32]) -> Result<()> {
        Self::initialize_with(&FsResolver::default(), root, ids)
    }

    /// [`Codec::initialize`] for an explicit file-system path: the parent
    /// directory becomes the resolver root, so includes resolve next to
    /// the root document.
    pub fn initialize_from_path(path: &std::path::Path, ids: &[u32]) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::DialectNotFound {
                name: path.display().to_string(),
            })?;
        let root = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        Self::initialize_with(&FsResolver::new(root), name, ids)
    }

    /// [`Codec::initialize`] with an injected resolver (embedded dialects,
    /// in-memory fixtures, custom directories).
    pub fn initialize_with(
        resolver: &dyn DialectResolver,
        root: &str,
        ids: &[u32],
    ) -> Result<()> {
        let bundle = loader::load(resolver, root)?;
        let catalog = Catalog::compile(bundle)?;
        if !ids.is_empty() {
            catalog.include_only(ids)?;
        }
        info!(
            dialect = root,
            messages = catalog.messages.len(),
            enums = catalog.enums.len(),
            "codec initialized"
        );
        *CATALOG.write().expect("catalog lock poisoned") = Some(Arc::new(catalog));
        Ok(())
    }

    /// Whether [`Codec::initialize`] has completed.
    #[must_use]
    pub fn is_initialized() -> bool {
        CATALOG
            .read()
            .expect("catalog lock poisoned")
            .is_some()
    }

    /// Restrict decoding to the given ids; empty means "all".
    pub fn include_messages(ids: &[u32]) -> Result<()> {
        current()?.include_only(ids)
    }

    /// Exclude the given ids from decoding. Id 0 is silently ignored.
    pub fn exclude_messages(ids: &[u32]) -> Result<()> {
        current()?.exclude(ids)
    }

    /// All known message schemas, ordered by id.
    pub fn messages() -> Result<Vec<Arc<MessageSchema>>> {
        Ok(current()?.messages())
    }

    /// All known enum schemas, ordered by name.
    pub fn enums() -> Result<Vec<Arc<EnumSchema>>> {
        Ok(current()?.enums())
    }

    /// Message schema by wire id.
    pub fn message(id: u32) -> Result<Arc<MessageSchema>> {
        current()?
            .message(id)
            .cloned()
            .ok_or(Error::MessageNotFound { id })
    }

    /// Message schema by name, `None` when the catalog has no such message.
    pub fn message_by_name(name: &str) -> Result<Option<Arc<MessageSchema>>> {
        Ok(current()?.message_by_name(name).cloned())
    }

    /// `MAV_CMD` entries keyed by command value.
    pub fn commands() -> Result<BTreeMap<i64, EntryValue>> {
        Ok(current()?.commands().clone())
    }
}
