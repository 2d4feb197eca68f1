//! MAVLink wire protocol core.
//!
//! This module provides the frame format constants, the error taxonomy, the
//! schema-driven payload codec, and the [`Frame`] scanner/serializer.

mod codec;
mod error;
mod frame;
mod value;

pub use error::{Error, Result};
pub use frame::{Frame, FrameBuilder, ProtocolVersion, ScanStatus};
pub use value::FieldValue;

/// MAVLink v1 start marker.
pub const STX_V1: u8 = 0xFE;

/// MAVLink v2 start marker.
pub const STX_V2: u8 = 0xFD;

/// MAVLink v1 header length, start marker included.
pub const HEADER_LEN_V1: usize = 6;

/// MAVLink v2 header length, start marker included.
pub const HEADER_LEN_V2: usize = 10;

/// Checksum length, both protocol versions.
pub const CHECKSUM_LEN: usize = 2;

/// MAVLink v2 signature length.
pub const SIGNATURE_LEN: usize = 13;

/// Maximum payload length, both protocol versions.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Minimum v1 packet: header plus empty payload plus checksum.
pub const MIN_PACKET_V1: usize = HEADER_LEN_V1 + CHECKSUM_LEN;

/// Minimum v2 packet: header plus empty payload plus checksum.
pub const MIN_PACKET_V2: usize = HEADER_LEN_V2 + CHECKSUM_LEN;

/// Maximum v1 packet length.
pub const MAX_PACKET_V1: usize = HEADER_LEN_V1 + MAX_PAYLOAD_LEN + CHECKSUM_LEN;

/// Maximum v2 packet length, signature included.
pub const MAX_PACKET_V2: usize =
    HEADER_LEN_V2 + MAX_PAYLOAD_LEN + CHECKSUM_LEN + SIGNATURE_LEN;

/// Incompatibility flag bit marking a signed v2 frame.
pub const IFLAG_SIGNED: u8 = 0x01;

/// Highest message id encodable in the 24-bit v2 id field.
pub const MAX_MESSAGE_ID: u32 = 0x00FF_FFFF;
