//! Dialect layer: XML loading, schema compilation, and the catalog.

mod catalog;
pub(crate) mod loader;
pub(crate) mod schema;
mod types;

pub use catalog::{Catalog, Codec};
pub use loader::{DialectResolver, FsResolver, MapResolver};
pub use schema::{EntryValue, EnumSchema, FieldSchema, MessageSchema, ParamMeta};
pub use types::{ElementKind, WireType, parse_declared};

pub(crate) use catalog::current;
