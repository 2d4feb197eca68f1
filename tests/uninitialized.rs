//! S4: every codec entry point fails with `NotInitialized` before
//! `Codec::initialize` has run.
//!
//! This binary must never initialize the process-wide catalog, which is why
//! these assertions do not live in `codec_scenarios.rs`.

use mavwire::{Codec, Error, FieldValue, Frame};

#[test]
fn every_entry_point_reports_not_initialized() {
    assert!(!Codec::is_initialized());

    let mut frame = Frame::new();
    assert!(!frame.try_parse(&[0xFD, 0x00]));
    assert_eq!(frame.error_reason(), Some(&Error::NotInitialized));

    let status = frame.try_parse_stream(&[0xFD, 0x00]);
    assert!(!status.complete);
    assert_eq!(status.consumed, 0);
    assert_eq!(frame.error_reason(), Some(&Error::NotInitialized));

    let outbound = Frame::builder()
        .message_id(0)
        .field("type", FieldValue::U8(1))
        .build();
    assert_eq!(outbound.to_bytes(), Err(Error::NotInitialized));

    assert!(matches!(Codec::messages(), Err(Error::NotInitialized)));
    assert!(matches!(Codec::enums(), Err(Error::NotInitialized)));
    assert!(matches!(
        Codec::include_messages(&[1]),
        Err(Error::NotInitialized)
    ));
    assert!(matches!(
        Codec::exclude_messages(&[1]),
        Err(Error::NotInitialized)
    ));
}
