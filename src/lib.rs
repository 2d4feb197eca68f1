//! mavwire - runtime-configurable MAVLink v1/v2 codec
//!
//! This library loads MAVLink dialect XML into an in-memory catalog at
//! runtime, then encodes and decodes binary frames against the compiled
//! schemas. No code generation: any dialect the catalog knows about can be
//! spoken immediately, including recovery from noisy byte streams.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mavwire::{Codec, FieldValue, Frame};
//!
//! // Compile the dialect tree into the process-wide catalog.
//! Codec::initialize("common.xml", &[])?;
//!
//! // Encode a HEARTBEAT.
//! let frame = Frame::builder()
//!     .system_id(1)
//!     .component_id(1)
//!     .message_id(0)
//!     .field("type", FieldValue::U8(2))
//!     .build();
//! let bytes = frame.to_bytes()?;
//!
//! // Decode from a datagram, junk tolerated on both sides.
//! let mut decoded = Frame::new();
//! if decoded.try_parse(&bytes) {
//!     println!("heartbeat from system {}", decoded.system_id());
//! }
//! # Ok::<(), mavwire::Error>(())
//! ```
//!
//! # Features
//!
//! - **Runtime dialects** - XML schemas compiled on load, recursive
//!   includes resolved through an injectable resolver
//! - **Stream resynchronization** - scanning decoder skips junk and bad
//!   candidates with guaranteed forward progress
//! - **Schema-agnostic values** - payload fields as tagged variants, no
//!   generated types required
//! - **CRC-16/MCRF4XX** - table-driven checksum with `CRC_EXTRA` schema
//!   drift detection

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod crc;
pub mod dialect;
pub mod protocol;

pub use dialect::{
    Codec, DialectResolver, ElementKind, EntryValue, EnumSchema, FieldSchema, FsResolver,
    MapResolver, MessageSchema, ParamMeta,
};
pub use protocol::{
    Error, FieldValue, Frame, FrameBuilder, ProtocolVersion, Result, ScanStatus,
};
