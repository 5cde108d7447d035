//! Stream-level length-prefix framing.
//!
//! Framing sits above the message boundary: before a message is decoded,
//! the stream may carry a prefix announcing its length (and, for
//! [`PrefixStyle::Base128`], a field header identifying it). The helpers
//! here peel that prefix off a [`ByteSource`]; the message body itself is
//! then decoded with a [`WireDecoder`](crate::reader::WireDecoder), usually
//! bounded via [`DecoderOptions::initial_end`](crate::reader::DecoderOptions).

use crate::error::{DecodeError, DecodeErrorKind, ErrorContext};
use crate::source::ByteSource;
use crate::wire::{FieldKey, WireType};

/// How messages are framed at the stream level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrefixStyle {
    /// No prefix; the body runs to the end of the stream.
    None,
    /// A varint length, optionally preceded by a field header whose wire
    /// type must be length-delimited.
    Base128,
    /// A little-endian 32-bit length.
    Fixed32,
    /// A big-endian 32-bit length.
    Fixed32BigEndian,
}

/// A decoded stream-level message prefix.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MessagePrefix {
    /// Declared body length; `None` when the body runs to end of stream.
    pub length: Option<u64>,
    /// Field number extracted from a [`PrefixStyle::Base128`] header.
    pub field_number: Option<u32>,
}

/// Read one message prefix from `source`.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first prefix
/// byte: there is no further message. A prefix that starts but does not
/// complete is `Truncated`.
pub fn read_length_prefix<S: ByteSource>(
    source: &mut S,
    style: PrefixStyle,
    expect_header: bool,
) -> Result<Option<MessagePrefix>, DecodeError> {
    match style {
        PrefixStyle::None => Ok(Some(MessagePrefix {
            length: None,
            field_number: None,
        })),
        PrefixStyle::Base128 => {
            if at_end(source)? {
                return Ok(None);
            }
            let mut field_number = None;
            if expect_header {
                let tag = source
                    .read_varint_u32()
                    .map_err(|kind| frame_error(source, kind, 0))?;
                let key =
                    FieldKey::try_from_raw(tag).map_err(|kind| frame_error(source, kind, 0))?;
                let (wire_type, field) = key.into_parts();
                if wire_type != WireType::LengthDelimited {
                    return Err(frame_error(
                        source,
                        DecodeErrorKind::wire_type_mismatch(Some(wire_type)),
                        field,
                    ));
                }
                field_number = Some(field);
            }
            let length = source
                .read_varint_u64()
                .map_err(|kind| frame_error(source, kind, field_number.unwrap_or(0)))?;
            Ok(Some(MessagePrefix {
                length: Some(length),
                field_number,
            }))
        }
        PrefixStyle::Fixed32 => {
            if at_end(source)? {
                return Ok(None);
            }
            let length = source
                .read_fixed32_le()
                .map_err(|kind| frame_error(source, kind, 0))?;
            Ok(Some(MessagePrefix {
                length: Some(u64::from(length)),
                field_number: None,
            }))
        }
        PrefixStyle::Fixed32BigEndian => {
            if at_end(source)? {
                return Ok(None);
            }
            let mut raw = [0u8; 4];
            source
                .read_into(&mut raw)
                .map_err(|kind| frame_error(source, kind, 0))?;
            Ok(Some(MessagePrefix {
                length: Some(u64::from(u32::from_be_bytes(raw))),
                field_number: None,
            }))
        }
    }
}

fn at_end<S: ByteSource>(source: &mut S) -> Result<bool, DecodeError> {
    match source.is_fully_consumed() {
        Ok(consumed) => Ok(consumed),
        Err(kind) => Err(frame_error(source, kind, 0)),
    }
}

fn frame_error<S: ByteSource>(source: &S, kind: DecodeErrorKind, field_number: u32) -> DecodeError {
    DecodeError::new(kind).with_context(ErrorContext {
        field_number,
        wire_type: None,
        offset: source.position(),
        depth: 0,
    })
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn test_base128_with_header() {
        let mut source = MemorySource::new(vec![0x0A, 0x05, 0xFF]);
        let prefix = read_length_prefix(&mut source, PrefixStyle::Base128, true)
            .unwrap()
            .unwrap();
        assert_eq!(prefix.length, Some(5));
        assert_eq!(prefix.field_number, Some(1));
        assert_eq!(source.position(), 2);
    }

    #[test]
    fn test_base128_without_header() {
        let mut source = MemorySource::new(vec![0xAC, 0x02]);
        let prefix = read_length_prefix(&mut source, PrefixStyle::Base128, false)
            .unwrap()
            .unwrap();
        assert_eq!(prefix.length, Some(300));
        assert_eq!(prefix.field_number, None);
    }

    #[test]
    fn test_base128_header_wrong_wire_type() {
        // Field 1 with a varint wire type cannot introduce a message body.
        let mut source = MemorySource::new(vec![0x08, 0x05]);
        let err = read_length_prefix(&mut source, PrefixStyle::Base128, true).unwrap_err();
        assert!(matches!(
            err.kind(),
            DecodeErrorKind::WireTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_fixed32_both_endiannesses() {
        let mut source = MemorySource::new(vec![0x01, 0x02, 0x00, 0x00]);
        let prefix = read_length_prefix(&mut source, PrefixStyle::Fixed32, false)
            .unwrap()
            .unwrap();
        assert_eq!(prefix.length, Some(0x0201));

        let mut source = MemorySource::new(vec![0x00, 0x00, 0x02, 0x01]);
        let prefix = read_length_prefix(&mut source, PrefixStyle::Fixed32BigEndian, false)
            .unwrap()
            .unwrap();
        assert_eq!(prefix.length, Some(0x0201));
    }

    #[test]
    fn test_no_message_at_clean_end() {
        for style in [
            PrefixStyle::Base128,
            PrefixStyle::Fixed32,
            PrefixStyle::Fixed32BigEndian,
        ] {
            let mut source = MemorySource::new(Vec::new());
            assert_eq!(read_length_prefix(&mut source, style, false).unwrap(), None);
        }
    }

    #[test]
    fn test_partial_prefix_is_truncated() {
        let mut source = MemorySource::new(vec![0x01, 0x02]);
        let err = read_length_prefix(&mut source, PrefixStyle::Fixed32, false).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Truncated);

        let mut source = MemorySource::new(vec![0x80]);
        let err = read_length_prefix(&mut source, PrefixStyle::Base128, false).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Truncated);
    }

    #[test]
    fn test_none_style_runs_to_end() {
        let mut source = MemorySource::new(vec![0x08, 0x01]);
        let prefix = read_length_prefix(&mut source, PrefixStyle::None, false)
            .unwrap()
            .unwrap();
        assert_eq!(prefix.length, None);
        assert_eq!(source.position(), 0);
    }
}
