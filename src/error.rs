//! Error taxonomy for the streaming decoder.
//!
//! Errors come in two layers. The low layers (the varint codec and the byte
//! sources) produce a bare [`DecodeErrorKind`]. The decoder and the framing
//! helpers wrap a kind into a [`DecodeError`] enriched with the decoder
//! position at the failure site: field number, wire type, absolute offset,
//! and nesting depth.
//!
//! Every error is terminal for the decoder instance that produced it.

use core::fmt;

use crate::wire::WireType;

/// The kind of a decode failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The stream ended in the middle of a primitive.
    Truncated,
    /// A varint or a float narrowing exceeded the target width.
    Overflow { target: &'static str },
    /// A field header carried a field number of zero or out of range.
    InvalidField { value: u32 },
    /// A field header carried a wire type outside the protobuf range.
    InvalidWireType { value: u8 },
    /// The requested operation is incompatible with the current wire type.
    WireTypeMismatch { actual: Option<WireType> },
    /// A boolean field decoded to a varint other than 0 or 1.
    InvalidBoolean { value: u64 },
    /// A sub-message was exited with bytes of it still unread.
    IncompleteSubMessage,
    /// Reads crossed the declared end of a sub-message, or a declared length
    /// crossed an outer boundary.
    OverranSubMessage,
    /// An `EndGroup` tag was read outside of any group.
    UnexpectedEndGroup,
    /// An `EndGroup` field number did not match the opening `StartGroup`.
    GroupMismatch { started: u32, ended: u32 },
    /// A string field contained invalid UTF-8.
    InvalidUtf8,
    /// A sub-message dispatch was requested but no type model is configured.
    NoTypeModel,
    /// The upstream source was cancelled or torn down mid-operation.
    Disposed,
    /// The decoder was driven into a state its API forbids.
    ProgrammingError { reason: &'static str },
}

impl DecodeErrorKind {
    #[inline(always)]
    pub(crate) fn truncated() -> Self {
        DecodeErrorKind::Truncated
    }

    #[inline(always)]
    pub(crate) fn overflow(target: &'static str) -> Self {
        DecodeErrorKind::Overflow { target }
    }

    #[inline(always)]
    pub(crate) fn wire_type_mismatch(actual: Option<WireType>) -> Self {
        DecodeErrorKind::WireTypeMismatch { actual }
    }

    #[inline(always)]
    pub(crate) fn programming_error(reason: &'static str) -> Self {
        DecodeErrorKind::ProgrammingError { reason }
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeErrorKind::Truncated => {
                write!(f, "unexpected end of stream")
            }
            DecodeErrorKind::Overflow { target } => {
                write!(f, "value does not fit in {target}")
            }
            DecodeErrorKind::InvalidField { value } => {
                write!(f, "invalid field number: {value}")
            }
            DecodeErrorKind::InvalidWireType { value } => {
                write!(f, "invalid 'wire type' value: {value}")
            }
            DecodeErrorKind::WireTypeMismatch { actual: Some(wt) } => {
                write!(f, "operation incompatible with wire type {wt:?}")
            }
            DecodeErrorKind::WireTypeMismatch { actual: None } => {
                write!(f, "no field is pending; read a field header first")
            }
            DecodeErrorKind::InvalidBoolean { value } => {
                write!(f, "invalid boolean value: {value}")
            }
            DecodeErrorKind::IncompleteSubMessage => {
                write!(f, "sub-message exited before its declared end")
            }
            DecodeErrorKind::OverranSubMessage => {
                write!(f, "sub-message crossed its declared end")
            }
            DecodeErrorKind::UnexpectedEndGroup => {
                write!(f, "group end marker outside of any group")
            }
            DecodeErrorKind::GroupMismatch { started, ended } => {
                write!(f, "group end field {ended} does not match start field {started}")
            }
            DecodeErrorKind::InvalidUtf8 => {
                write!(f, "invalid UTF-8 in string field")
            }
            DecodeErrorKind::NoTypeModel => {
                write!(f, "no type model configured for sub-message dispatch")
            }
            DecodeErrorKind::Disposed => {
                write!(f, "byte source was cancelled or disposed")
            }
            DecodeErrorKind::ProgrammingError { reason } => {
                write!(f, "programming error: '{reason}'")
            }
        }
    }
}

/// Decoder position captured at the failure site.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field number current when the failure occurred, 0 when none.
    pub field_number: u32,
    /// Wire type current when the failure occurred.
    pub wire_type: Option<WireType>,
    /// Absolute byte offset from the start of the stream.
    pub offset: u64,
    /// Sub-message nesting depth.
    pub depth: u32,
}

/// A decode failure, enriched with the decoder position where available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    context: Option<ErrorContext>,
}

impl DecodeError {
    #[inline]
    pub(crate) fn new(kind: DecodeErrorKind) -> Self {
        DecodeError { kind, context: None }
    }

    #[inline]
    pub(crate) fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// The kind of failure.
    #[inline]
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// The decoder position at the failure site, if one was captured.
    #[inline]
    pub fn context(&self) -> Option<&ErrorContext> {
        self.context.as_ref()
    }
}

impl From<DecodeErrorKind> for DecodeError {
    #[inline]
    fn from(kind: DecodeErrorKind) -> Self {
        DecodeError::new(kind)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(
                f,
                " (field {}, wire type {:?}, offset {}, depth {})",
                ctx.field_number, ctx.wire_type, ctx.offset, ctx.depth
            )?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

#[cfg(feature = "std")]
impl std::error::Error for DecodeErrorKind {}
