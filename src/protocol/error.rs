//! Codec error types.

use thiserror::Error;

/// Errors raised while loading dialects, filtering the catalog, and
/// encoding or decoding frames.
///
/// Decode failures are reported per frame through
/// [`Frame::error_reason`](crate::Frame::error_reason); the scanner never
/// panics on malformed input. Initialization and encode failures propagate
/// as `Err` values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Codec call before [`Codec::initialize`](crate::Codec::initialize)
    #[error("codec is not initialized")]
    NotInitialized,

    /// Dialect file could not be resolved
    #[error("dialect `{name}` not found")]
    DialectNotFound {
        /// Requested dialect file name
        name: String,
    },

    /// Dialect XML could not be parsed
    #[error("failed to parse dialect `{name}`: {detail}")]
    DialectParseError {
        /// Dialect file name
        name: String,
        /// Parser diagnostic
        detail: String,
    },

    /// Unrecognized field type string
    #[error("bad field type `{declared}` in `{context}`")]
    BadType {
        /// Message and field the type was declared for
        context: String,
        /// Declared type string
        declared: String,
    },

    /// Two messages compiled to the same wire id
    #[error("duplicate message id {id}: `{name}` collides with `{previous}`")]
    DuplicateMessageId {
        /// Colliding wire id
        id: u32,
        /// Message being installed
        name: String,
        /// Message already installed under the id
        previous: String,
    },

    /// No start marker in the scanned input
    #[error("no start marker found")]
    StartMarkerNotFound,

    /// Candidate frame is truncated
    #[error("frame too short: need {needed} bytes, got {got}")]
    FrameTooShort {
        /// Bytes required by the header
        needed: usize,
        /// Bytes available
        got: usize,
    },

    /// Payload exceeds what a frame can carry
    #[error("frame too long: payload {len} bytes (max {max})")]
    FrameTooLong {
        /// Payload size
        len: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Message id is not present in the catalog
    #[error("message {id} not found in catalog")]
    MessageNotFound {
        /// Wire message id
        id: u32,
    },

    /// Message id is excluded by the active filter
    #[error("message {id} is excluded")]
    MessageExcluded {
        /// Wire message id
        id: u32,
    },

    /// Wire payload length is impossible for the schema
    #[error("invalid payload length {len} for message {id} (max {max})")]
    PayloadLengthInvalid {
        /// Wire message id
        id: u32,
        /// Wire payload length
        len: usize,
        /// Schema payload capacity
        max: usize,
    },

    /// Payload fits the buffer but the checksum bytes do not
    #[error("frame has no checksum")]
    FrameHasNoChecksum,

    /// Checksum verification failed
    #[error("bad checksum: expected {expected:#06x}, got {found:#06x}")]
    BadChecksum {
        /// Computed checksum
        expected: u16,
        /// On-wire checksum
        found: u16,
    },

    /// Signed frame carries fewer than 13 signature bytes
    #[error("invalid signature length: got {got} of 13 bytes")]
    SignatureLengthInvalid {
        /// Signature bytes present
        got: usize,
    },

    /// Include/exclude request named an id the catalog does not know
    #[error("unknown message id {id}")]
    UnknownMessageId {
        /// Requested wire id
        id: u32,
    },

    /// Encode value map names a field the schema does not have
    #[error("message `{message}` has no field `{field}`")]
    FieldNameUnknown {
        /// Message name
        message: String,
        /// Unknown field name
        field: String,
    },

    /// Encode value does not match the field's wire type
    #[error("field `{field}` of `{message}` expects {expected}")]
    FieldTypeMismatch {
        /// Message name
        message: String,
        /// Field name
        field: String,
        /// Expected wire type description
        expected: String,
    },

    /// Message id does not fit the selected protocol version
    #[error("message id {id} does not fit a MAVLink v1 frame")]
    MessageIdOutOfRange {
        /// Wire message id
        id: u32,
    },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
