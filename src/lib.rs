//! Streaming pull decoder for the Protocol Buffers wire format.
//!
//! `protopull` reads the protobuf binary format one field at a time: the
//! caller pulls field headers, then asks for the value with the type it
//! wants. The decoder handles varint/fixed/length-delimited/group wire
//! disciplines, wire-type coercions, nested sub-messages, and unknown-field
//! skipping, over either a contiguous buffer ([`MemorySource`]) or a
//! fragmented pull-based pipe ([`PipeSource`]).
//!
//! ```
//! use protopull::{MemorySource, WireDecoder};
//!
//! // Field 2, the string "testing".
//! let payload = vec![0x12, 0x07, 0x74, 0x65, 0x73, 0x74, 0x69, 0x6E, 0x67];
//! let mut decoder = WireDecoder::new(MemorySource::new(payload));
//!
//! assert_eq!(decoder.read_field_header().unwrap(), 2);
//! assert_eq!(&*decoder.read_string().unwrap(), "testing");
//! assert_eq!(decoder.read_field_header().unwrap(), 0);
//! ```

#![no_std]
#![deny(clippy::as_conversions)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod cache;
pub mod error;
pub mod frame;
pub mod leb128;
pub mod reader;
pub mod source;
pub mod strings;
pub mod wire;

mod util;

pub use crate::cache::ObjectCache;
pub use crate::error::{DecodeError, DecodeErrorKind, ErrorContext};
pub use crate::frame::{read_length_prefix, MessagePrefix, PrefixStyle};
pub use crate::reader::{
    DecoderOptions, NoModel, SerializationContext, SubItemToken, TypeModel, WireDecoder,
};
pub use crate::source::{
    ByteSource, MemorySource, PipeSource, PullBytes, SegmentPipe, NO_WINDOW,
};
#[cfg(feature = "std")]
pub use crate::source::{ChannelPipe, IoPipe};
pub use crate::strings::{ProtoString, StringInterner};
pub use crate::wire::{encode_key, FieldKey, WireType};
