//! The wire-level streaming decoder.
//!
//! [`WireDecoder`] drives a [`ByteSource`] through the protobuf message
//! structure: it reads field headers, dispatches typed scalar reads against
//! the current wire type (with the permitted coercions), enters and leaves
//! sub-messages, and skips unknown fields.
//!
//! The decoder is written once against the [`ByteSource`] trait; whether it
//! operates over a contiguous buffer or suspends on a pipe refill is decided
//! entirely by the source implementation. A single instance is
//! single-threaded by construction (`&mut self` throughout), and any error
//! it returns is terminal for that instance.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use crate::cache::ObjectCache;
use crate::error::{DecodeError, DecodeErrorKind, ErrorContext};
use crate::leb128::{zigzag_decode_32, zigzag_decode_64};
use crate::source::{ByteSource, NO_WINDOW};
use crate::strings::{ProtoString, StringInterner};
use crate::wire::{FieldKey, WireType};

/// Opaque user state forwarded to type-model callbacks.
#[derive(Default, Clone)]
pub struct SerializationContext {
    user_state: Option<Rc<dyn Any>>,
}

impl SerializationContext {
    pub fn new() -> Self {
        SerializationContext::default()
    }

    pub fn with_user_state(user_state: Rc<dyn Any>) -> Self {
        SerializationContext {
            user_state: Some(user_state),
        }
    }

    pub fn user_state(&self) -> Option<&Rc<dyn Any>> {
        self.user_state.as_ref()
    }
}

impl fmt::Debug for SerializationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationContext")
            .field("has_user_state", &self.user_state.is_some())
            .finish()
    }
}

/// Collaborator that maps field numbers to message-decoding logic.
///
/// The decoder itself never interprets message contents; when asked to read
/// a sub-message as an object it scopes itself to the message and hands
/// control to the model.
pub trait TypeModel<S: ByteSource>: Sized {
    type Output;

    /// Decode one sub-message body.
    ///
    /// The decoder is already scoped to the message: `read_field_header`
    /// returns 0 at its end, and the model must leave the decoder there.
    fn decode_message(
        &mut self,
        field_number: u32,
        decoder: &mut WireDecoder<S, Self>,
    ) -> Result<Self::Output, DecodeError>;
}

/// Placeholder model for decoders without sub-message dispatch.
#[derive(Debug, Clone, Copy)]
pub enum NoModel {}

impl<S: ByteSource> TypeModel<S> for NoModel {
    type Output = core::convert::Infallible;

    fn decode_message(
        &mut self,
        _field_number: u32,
        _decoder: &mut WireDecoder<S, Self>,
    ) -> Result<Self::Output, DecodeError> {
        match *self {}
    }
}

/// Configuration accepted by [`WireDecoder::with_options`].
pub struct DecoderOptions<M = NoModel> {
    /// Pass decoded strings through an identity-preserving interner.
    pub intern_strings: bool,
    /// Report end-of-stream at this absolute offset instead of running to
    /// the end of the source.
    pub initial_end: Option<u64>,
    /// Type model consulted by [`WireDecoder::read_object`].
    pub model: Option<M>,
    /// Opaque user state forwarded to the model.
    pub context: SerializationContext,
}

impl<M> Default for DecoderOptions<M> {
    fn default() -> Self {
        DecoderOptions {
            intern_strings: true,
            initial_end: None,
            model: None,
            context: SerializationContext::new(),
        }
    }
}

/// Opaque token returned by [`WireDecoder::start_sub_item`]; surrendering it
/// to [`WireDecoder::end_sub_item`] is the only way to leave the scope.
#[derive(Debug)]
#[must_use = "a sub-item scope must be closed with end_sub_item"]
pub struct SubItemToken(TokenKind);

#[derive(Debug)]
enum TokenKind {
    Delimited { prev_end: u64, end: u64 },
    Group { field_number: u32 },
}

/// A stateful reader over the protobuf wire format.
///
/// See the [module docs](self) for the overall shape. Typical use:
///
/// ```
/// use protopull::{MemorySource, WireDecoder};
///
/// // Field 1, varint 150.
/// let mut decoder = WireDecoder::new(MemorySource::new(vec![0x08, 0x96, 0x01]));
/// assert_eq!(decoder.read_field_header().unwrap(), 1);
/// assert_eq!(decoder.read_i32().unwrap(), 150);
/// assert_eq!(decoder.read_field_header().unwrap(), 0);
/// ```
pub struct WireDecoder<S, M = NoModel> {
    source: S,
    wire_type: Option<WireType>,
    field_number: u32,
    /// Visible end of the current length-delimited scope; [`NO_WINDOW`]
    /// outside of one.
    end: u64,
    depth: u32,
    interner: Option<StringInterner>,
    objects: ObjectCache,
    model: Option<M>,
    context: SerializationContext,
}

impl<S: ByteSource> WireDecoder<S> {
    /// Create a decoder with default options and no type model.
    pub fn new(source: S) -> Self {
        WireDecoder::with_options(source, DecoderOptions::default())
    }
}

impl<S: ByteSource, M: TypeModel<S>> WireDecoder<S, M> {
    pub fn with_options(mut source: S, options: DecoderOptions<M>) -> Self {
        let end = options.initial_end.unwrap_or(NO_WINDOW);
        if end != NO_WINDOW {
            source.push_window(end);
        }
        WireDecoder {
            source,
            wire_type: None,
            field_number: 0,
            end,
            depth: 0,
            interner: options.intern_strings.then(StringInterner::new),
            objects: ObjectCache::new(),
            model: options.model,
            context: options.context,
        }
    }

    /// Field number of the current (or most recent) field; 0 before the
    /// first header.
    #[inline]
    pub fn field_number(&self) -> u32 {
        self.field_number
    }

    /// Wire type of the pending field, `None` between fields.
    #[inline]
    pub fn wire_type(&self) -> Option<WireType> {
        self.wire_type
    }

    /// Absolute offset of the next unread byte.
    #[inline]
    pub fn position(&self) -> u64 {
        self.source.position()
    }

    /// Current sub-message nesting depth.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Opaque user state forwarded to the type model.
    #[inline]
    pub fn serialization_context(&self) -> &SerializationContext {
        &self.context
    }

    /// The reference-tracking cache for this decoder.
    #[inline]
    pub fn objects(&self) -> &ObjectCache {
        &self.objects
    }

    #[inline]
    pub fn objects_mut(&mut self) -> &mut ObjectCache {
        &mut self.objects
    }

    /// Tear the decoder down, recovering the source. The source is not
    /// closed.
    pub fn into_source(self) -> S {
        self.source
    }

    #[cold]
    fn fail(&self, kind: DecodeErrorKind) -> DecodeError {
        DecodeError::new(kind).with_context(ErrorContext {
            field_number: self.field_number,
            wire_type: self.wire_type,
            offset: self.source.position(),
            depth: self.depth,
        })
    }

    #[cold]
    fn mismatch(&self) -> DecodeError {
        self.fail(DecodeErrorKind::wire_type_mismatch(self.wire_type))
    }

    fn current_wire(&self) -> Result<WireType, DecodeError> {
        self.wire_type
            .ok_or_else(|| self.fail(DecodeErrorKind::wire_type_mismatch(None)))
    }

    fn read_length(&mut self) -> Result<usize, DecodeError> {
        let len = self
            .source
            .read_varint_u64()
            .map_err(|kind| self.fail(kind))?;
        usize::try_from(len).map_err(|_| self.fail(DecodeErrorKind::overflow("usize")))
    }

    /// Read the next field header.
    ///
    /// Returns the field number, or 0 at the end of the current scope: the
    /// end of a length-delimited sub-message, a group end marker (whose
    /// field number stays available for the end-match check), a zero tag, or
    /// a clean end of stream.
    pub fn read_field_header(&mut self) -> Result<u32, DecodeError> {
        if self.wire_type == Some(WireType::EndGroup) {
            return Ok(0);
        }
        if self.source.position() >= self.end {
            return Ok(0);
        }
        // Only an unbounded scope may end with the stream itself; inside a
        // declared length a missing tag is a truncation.
        if self.end == NO_WINDOW {
            let consumed = self
                .source
                .is_fully_consumed()
                .map_err(|kind| self.fail(kind))?;
            if consumed {
                self.wire_type = None;
                return Ok(0);
            }
        }

        let tag = self
            .source
            .read_varint_u32()
            .map_err(|kind| self.fail(kind))?;
        if tag == 0 {
            self.wire_type = None;
            self.field_number = 0;
            return Ok(0);
        }

        let key = FieldKey::try_from_raw(tag).map_err(|kind| self.fail(kind))?;
        let (wire_type, field_number) = key.into_parts();
        self.field_number = field_number;
        self.wire_type = Some(wire_type);

        if wire_type == WireType::EndGroup {
            if self.depth == 0 {
                return Err(self.fail(DecodeErrorKind::UnexpectedEndGroup));
            }
            return Ok(0);
        }
        Ok(field_number)
    }

    /// Commit the next field header only if it carries `expected`.
    ///
    /// A non-matching, absent, or partial header leaves the decoder
    /// untouched.
    pub fn try_read_field_header(&mut self, expected: u32) -> Result<bool, DecodeError> {
        if self.wire_type == Some(WireType::EndGroup) || self.source.position() >= self.end {
            return Ok(false);
        }
        let peeked = self
            .source
            .try_peek_varint_u32()
            .map_err(|kind| self.fail(kind))?;
        let Some((tag, used)) = peeked else {
            return Ok(false);
        };
        if tag == 0 {
            return Ok(false);
        }
        let Ok(key) = FieldKey::try_from_raw(tag) else {
            return Ok(false);
        };
        let (wire_type, field_number) = key.into_parts();
        if field_number != expected || wire_type == WireType::EndGroup {
            return Ok(false);
        }

        self.source.skip(used).map_err(|kind| self.fail(kind))?;
        self.field_number = field_number;
        self.wire_type = Some(wire_type);
        Ok(true)
    }

    /// Upgrade the current wire type to a compatible extension, e.g.
    /// [`WireType::SignedVarint`] over a varint field. Silent when the hint
    /// does not match what is on the wire.
    pub fn hint(&mut self, wire_type: WireType) {
        let Some(current) = self.wire_type else {
            return;
        };
        if wire_type == current {
            return;
        }
        if wire_type.base_val() == current.into_val() {
            self.wire_type = Some(wire_type);
        }
    }

    /// Like [`hint`](WireDecoder::hint), but fails on an incompatible wire
    /// type.
    pub fn assert_wire_type(&mut self, wire_type: WireType) -> Result<(), DecodeError> {
        let current = self.current_wire()?;
        if wire_type == current {
            return Ok(());
        }
        if wire_type.base_val() == current.into_val() {
            self.wire_type = Some(wire_type);
            return Ok(());
        }
        Err(self.mismatch())
    }

    /// Read the pending field as a `u64`.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let value = match self.current_wire()? {
            WireType::Varint => self
                .source
                .read_varint_u64()
                .map_err(|kind| self.fail(kind))?,
            WireType::Fixed64 => self
                .source
                .read_fixed64_le()
                .map_err(|kind| self.fail(kind))?,
            WireType::Fixed32 => u64::from(
                self.source
                    .read_fixed32_le()
                    .map_err(|kind| self.fail(kind))?,
            ),
            _ => return Err(self.mismatch()),
        };
        self.wire_type = None;
        Ok(value)
    }

    /// Read the pending field as a `u32`, with checked narrowing from the
    /// 64-bit encodings.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let value = match self.current_wire()? {
            WireType::Varint => self
                .source
                .read_varint_u32()
                .map_err(|kind| self.fail(kind))?,
            WireType::Fixed32 => self
                .source
                .read_fixed32_le()
                .map_err(|kind| self.fail(kind))?,
            WireType::Fixed64 => {
                let wide = self
                    .source
                    .read_fixed64_le()
                    .map_err(|kind| self.fail(kind))?;
                u32::try_from(wide).map_err(|_| self.fail(DecodeErrorKind::overflow("u32")))?
            }
            _ => return Err(self.mismatch()),
        };
        self.wire_type = None;
        Ok(value)
    }

    /// Read the pending field as an `i64`.
    ///
    /// `Varint` decodes as two's complement; [`WireType::SignedVarint`]
    /// decodes zig-zag; `Fixed32` sign-extends.
    #[allow(clippy::as_conversions)]
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let value = match self.current_wire()? {
            WireType::Varint => self
                .source
                .read_varint_u64()
                .map_err(|kind| self.fail(kind))? as i64,
            WireType::SignedVarint => zigzag_decode_64(
                self.source
                    .read_varint_u64()
                    .map_err(|kind| self.fail(kind))?,
            ),
            WireType::Fixed64 => self
                .source
                .read_fixed64_le()
                .map_err(|kind| self.fail(kind))? as i64,
            WireType::Fixed32 => i64::from(
                self.source
                    .read_fixed32_le()
                    .map_err(|kind| self.fail(kind))? as i32,
            ),
            _ => return Err(self.mismatch()),
        };
        self.wire_type = None;
        Ok(value)
    }

    /// Read the pending field as an `i32`, with checked narrowing from the
    /// 64-bit encodings.
    ///
    /// Negative `int32` values arrive sign-extended to ten varint bytes, so
    /// the varint path decodes 64 bits and narrows.
    #[allow(clippy::as_conversions)]
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let value = match self.current_wire()? {
            WireType::Varint => {
                let wide = self
                    .source
                    .read_varint_u64()
                    .map_err(|kind| self.fail(kind))? as i64;
                i32::try_from(wide).map_err(|_| self.fail(DecodeErrorKind::overflow("i32")))?
            }
            WireType::SignedVarint => zigzag_decode_32(
                self.source
                    .read_varint_u32()
                    .map_err(|kind| self.fail(kind))?,
            ),
            WireType::Fixed32 => self
                .source
                .read_fixed32_le()
                .map_err(|kind| self.fail(kind))? as i32,
            WireType::Fixed64 => {
                let wide = self
                    .source
                    .read_fixed64_le()
                    .map_err(|kind| self.fail(kind))? as i64;
                i32::try_from(wide).map_err(|_| self.fail(DecodeErrorKind::overflow("i32")))?
            }
            _ => return Err(self.mismatch()),
        };
        self.wire_type = None;
        Ok(value)
    }

    /// Read the pending field as a `u16`.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let value = self.read_u32()?;
        u16::try_from(value).map_err(|_| self.fail(DecodeErrorKind::overflow("u16")))
    }

    /// Read the pending field as a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let value = self.read_u32()?;
        u8::try_from(value).map_err(|_| self.fail(DecodeErrorKind::overflow("u8")))
    }

    /// Read the pending field as an `i16`.
    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        let value = self.read_i32()?;
        i16::try_from(value).map_err(|_| self.fail(DecodeErrorKind::overflow("i16")))
    }

    /// Read the pending field as an `i8`.
    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        let value = self.read_i32()?;
        i8::try_from(value).map_err(|_| self.fail(DecodeErrorKind::overflow("i8")))
    }

    /// Read the pending field as a `bool`. Only 0 and 1 are valid.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        match self.read_u32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.fail(DecodeErrorKind::InvalidBoolean {
                value: u64::from(other),
            })),
        }
    }

    /// Read the pending field as an `f32`.
    ///
    /// `Fixed32` is a bit-cast; `Fixed64` is a bit-cast to `f64` followed by
    /// a narrowing that fails when a finite value leaves the `f32` range.
    #[allow(clippy::as_conversions)]
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let value = match self.current_wire()? {
            WireType::Fixed32 => f32::from_bits(
                self.source
                    .read_fixed32_le()
                    .map_err(|kind| self.fail(kind))?,
            ),
            WireType::Fixed64 => {
                let wide = f64::from_bits(
                    self.source
                        .read_fixed64_le()
                        .map_err(|kind| self.fail(kind))?,
                );
                let narrow = wide as f32;
                if narrow.is_infinite() && wide.is_finite() {
                    return Err(self.fail(DecodeErrorKind::overflow("f32")));
                }
                narrow
            }
            _ => return Err(self.mismatch()),
        };
        self.wire_type = None;
        Ok(value)
    }

    /// Read the pending field as an `f64`. `Fixed32` widens from `f32`.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let value = match self.current_wire()? {
            WireType::Fixed32 => f64::from(f32::from_bits(
                self.source
                    .read_fixed32_le()
                    .map_err(|kind| self.fail(kind))?,
            )),
            WireType::Fixed64 => f64::from_bits(
                self.source
                    .read_fixed64_le()
                    .map_err(|kind| self.fail(kind))?,
            ),
            _ => return Err(self.mismatch()),
        };
        self.wire_type = None;
        Ok(value)
    }

    /// Read the pending length-delimited field as a UTF-8 string.
    pub fn read_string(&mut self) -> Result<ProtoString, DecodeError> {
        if self.current_wire()? != WireType::LengthDelimited {
            return Err(self.mismatch());
        }
        let len = self.read_length()?;
        let value = if len == 0 {
            ProtoString::empty()
        } else {
            let blob = self
                .source
                .read_blob(len)
                .map_err(|kind| self.fail(kind))?;
            ProtoString::from_utf8(blob).map_err(|kind| self.fail(kind))?
        };
        self.wire_type = None;
        let value = match &mut self.interner {
            Some(interner) => interner.intern(value),
            None => value,
        };
        Ok(value)
    }

    /// Read the pending length-delimited field, appending its bytes to
    /// `existing`.
    ///
    /// Historical quirk, preserved as-is: invoked on a `Varint` field this
    /// returns an empty blob and leaves the field unconsumed.
    pub fn append_bytes(&mut self, existing: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
        match self.current_wire()? {
            WireType::Varint => Ok(Vec::new()),
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                let mut buf = existing;
                let start = buf.len();
                buf.resize(start + len, 0);
                self.source
                    .read_into(&mut buf[start..])
                    .map_err(|kind| self.fail(kind))?;
                self.wire_type = None;
                Ok(buf)
            }
            _ => Err(self.mismatch()),
        }
    }

    /// Skip the pending field, whatever its wire type.
    ///
    /// Consumes exactly the bytes a typed read would have consumed. A
    /// `StartGroup` field is skipped by walking its fields recursively up to
    /// the matching end marker.
    pub fn skip_field(&mut self) -> Result<(), DecodeError> {
        match self.current_wire()? {
            WireType::Fixed32 => self.source.skip(4).map_err(|kind| self.fail(kind))?,
            WireType::Fixed64 => self.source.skip(8).map_err(|kind| self.fail(kind))?,
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.source.skip(len).map_err(|kind| self.fail(kind))?;
            }
            WireType::Varint | WireType::SignedVarint => {
                self.source
                    .read_varint_u64()
                    .map_err(|kind| self.fail(kind))?;
            }
            WireType::StartGroup => {
                let token = self.start_sub_item()?;
                while self.read_field_header()? != 0 {
                    self.skip_field()?;
                }
                self.end_sub_item(token)?;
            }
            WireType::EndGroup => return Err(self.mismatch()),
        }
        self.wire_type = None;
        Ok(())
    }

    /// Enter the pending sub-message.
    ///
    /// A length-delimited field shrinks the visible end to its declared
    /// length; a group records its field number for the end-match. The
    /// returned token must be surrendered to
    /// [`end_sub_item`](WireDecoder::end_sub_item).
    pub fn start_sub_item(&mut self) -> Result<SubItemToken, DecodeError> {
        match self.current_wire()? {
            WireType::LengthDelimited => {
                let len = self
                    .source
                    .read_varint_u64()
                    .map_err(|kind| self.fail(kind))?;
                let new_end = self
                    .source
                    .position()
                    .checked_add(len)
                    .ok_or_else(|| self.fail(DecodeErrorKind::OverranSubMessage))?;
                if new_end > self.end {
                    return Err(self.fail(DecodeErrorKind::OverranSubMessage));
                }
                let token = SubItemToken(TokenKind::Delimited {
                    prev_end: self.end,
                    end: new_end,
                });
                self.end = new_end;
                self.source.push_window(new_end);
                self.depth += 1;
                self.wire_type = None;
                Ok(token)
            }
            WireType::StartGroup => {
                // Clearing the wire type prevents a double entry.
                self.wire_type = None;
                self.depth += 1;
                Ok(SubItemToken(TokenKind::Group {
                    field_number: self.field_number,
                }))
            }
            _ => Err(self.mismatch()),
        }
    }

    /// Leave a sub-message entered with
    /// [`start_sub_item`](WireDecoder::start_sub_item).
    ///
    /// A length-delimited scope must sit exactly at its declared end; a
    /// group must sit on the matching end marker.
    pub fn end_sub_item(&mut self, token: SubItemToken) -> Result<(), DecodeError> {
        if self.depth == 0 {
            return Err(self.fail(DecodeErrorKind::programming_error(
                "end_sub_item outside of any sub-item",
            )));
        }
        match token.0 {
            TokenKind::Group { field_number } => match self.wire_type {
                Some(WireType::EndGroup) if self.field_number == field_number => {
                    self.wire_type = None;
                    self.depth -= 1;
                    Ok(())
                }
                Some(WireType::EndGroup) => Err(self.fail(DecodeErrorKind::GroupMismatch {
                    started: field_number,
                    ended: self.field_number,
                })),
                _ => Err(self.fail(DecodeErrorKind::IncompleteSubMessage)),
            },
            TokenKind::Delimited { prev_end, end } => {
                if self.wire_type == Some(WireType::EndGroup) {
                    return Err(self.fail(DecodeErrorKind::programming_error(
                        "group end marker closed with a length-delimited token",
                    )));
                }
                let position = self.source.position();
                if position < end {
                    return Err(self.fail(DecodeErrorKind::IncompleteSubMessage));
                }
                if position > end {
                    return Err(self.fail(DecodeErrorKind::OverranSubMessage));
                }
                self.end = prev_end;
                self.source.pop_window(prev_end);
                self.depth -= 1;
                Ok(())
            }
        }
    }

    /// Enter the pending sub-message, run `body`, and verify the exit.
    pub fn read_sub_message<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        let token = self.start_sub_item()?;
        let value = body(self)?;
        self.end_sub_item(token)?;
        Ok(value)
    }

    /// Dispatch the pending sub-message through the configured type model.
    pub fn read_object(&mut self) -> Result<M::Output, DecodeError> {
        let Some(mut model) = self.model.take() else {
            return Err(self.fail(DecodeErrorKind::NoTypeModel));
        };
        let field_number = self.field_number;
        let token = match self.start_sub_item() {
            Ok(token) => token,
            Err(err) => {
                self.model = Some(model);
                return Err(err);
            }
        };
        let result = model.decode_message(field_number, self);
        self.model = Some(model);
        let value = result?;
        self.end_sub_item(token)?;
        Ok(value)
    }
}

impl<S: ByteSource + fmt::Debug, M> fmt::Debug for WireDecoder<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireDecoder")
            .field("source", &self.source)
            .field("wire_type", &self.wire_type)
            .field("field_number", &self.field_number)
            .field("end", &self.end)
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::source::MemorySource;

    fn decoder(data: &[u8]) -> WireDecoder<MemorySource> {
        WireDecoder::new(MemorySource::new(Vec::from(data)))
    }

    #[test]
    fn test_hint_upgrades_varint() {
        let mut dec = decoder(&[0x08, 0x03]);
        assert_eq!(dec.read_field_header().unwrap(), 1);
        assert_eq!(dec.wire_type(), Some(WireType::Varint));

        dec.hint(WireType::SignedVarint);
        assert_eq!(dec.wire_type(), Some(WireType::SignedVarint));
        assert_eq!(dec.read_i32().unwrap(), -2);
    }

    #[test]
    fn test_hint_silent_on_mismatch() {
        let mut dec = decoder(&[0x08, 0x03]);
        dec.read_field_header().unwrap();
        dec.hint(WireType::Fixed32);
        assert_eq!(dec.wire_type(), Some(WireType::Varint));
    }

    #[test]
    fn test_assert_wire_type() {
        let mut dec = decoder(&[0x08, 0x03]);
        dec.read_field_header().unwrap();
        assert!(dec.assert_wire_type(WireType::Varint).is_ok());
        assert!(dec.assert_wire_type(WireType::SignedVarint).is_ok());

        let err = dec.assert_wire_type(WireType::Fixed64).unwrap_err();
        assert!(matches!(
            err.kind(),
            DecodeErrorKind::WireTypeMismatch { .. }
        ));
    }

    #[test]
    fn test_read_without_header_fails() {
        let mut dec = decoder(&[0x08, 0x03]);
        let err = dec.read_u32().unwrap_err();
        assert_eq!(
            err.kind(),
            DecodeErrorKind::WireTypeMismatch { actual: None }
        );
    }

    #[test]
    fn test_bool_values() {
        // field 1 = 1, field 1 = 0, field 1 = 2.
        let mut dec = decoder(&[0x08, 0x01, 0x08, 0x00, 0x08, 0x02]);
        dec.read_field_header().unwrap();
        assert!(dec.read_bool().unwrap());
        dec.read_field_header().unwrap();
        assert!(!dec.read_bool().unwrap());
        dec.read_field_header().unwrap();
        let err = dec.read_bool().unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidBoolean { value: 2 });
    }

    #[test]
    fn test_narrowing_reads() {
        // field 1 varint 300, field 2 varint 7.
        let mut dec = decoder(&[0x08, 0xAC, 0x02, 0x10, 0x07]);
        dec.read_field_header().unwrap();
        let err = dec.read_u8().unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Overflow { target: "u8" });

        dec.read_field_header().unwrap();
        assert_eq!(dec.read_u8().unwrap(), 7);
    }

    #[test]
    fn test_signed_varint_roundtrip_values() {
        // sint64 -1 encodes as 0x01.
        let mut dec = decoder(&[0x08, 0x01]);
        dec.read_field_header().unwrap();
        dec.hint(WireType::SignedVarint);
        assert_eq!(dec.read_i64().unwrap(), -1);
    }

    #[test]
    fn test_fixed_coercions() {
        // field 1 fixed32 = 42, field 2 fixed64 = 7.
        let mut dec = decoder(&[
            0x0D, 42, 0, 0, 0, //
            0x11, 7, 0, 0, 0, 0, 0, 0, 0,
        ]);
        dec.read_field_header().unwrap();
        assert_eq!(dec.read_u64().unwrap(), 42);
        dec.read_field_header().unwrap();
        assert_eq!(dec.read_u32().unwrap(), 7);
    }

    #[test]
    fn test_fixed64_narrowing_overflow() {
        let mut dec = decoder(&[0x09, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        dec.read_field_header().unwrap();
        let err = dec.read_u32().unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Overflow { target: "u32" });
    }

    #[test]
    fn test_f32_from_fixed64_overflow() {
        let mut bytes = vec![0x09];
        bytes.extend_from_slice(&f64::MAX.to_bits().to_le_bytes());
        let mut dec = decoder(&bytes);
        dec.read_field_header().unwrap();
        let err = dec.read_f32().unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Overflow { target: "f32" });
    }

    #[test]
    fn test_f32_widening_and_bitcast() {
        let mut bytes = vec![0x0D];
        bytes.extend_from_slice(&1.5f32.to_bits().to_le_bytes());
        bytes.push(0x11);
        bytes.extend_from_slice(&(-2.5f64).to_bits().to_le_bytes());

        let mut dec = decoder(&bytes);
        dec.read_field_header().unwrap();
        assert_eq!(dec.read_f64().unwrap(), 1.5);
        dec.read_field_header().unwrap();
        assert_eq!(dec.read_f64().unwrap(), -2.5);
    }

    #[test]
    fn test_append_bytes_quirk_on_varint() {
        let mut dec = decoder(&[0x08, 0x96, 0x01]);
        dec.read_field_header().unwrap();

        let blob = dec.append_bytes(vec![1, 2, 3]).unwrap();
        assert!(blob.is_empty());
        // The field is left unconsumed.
        assert_eq!(dec.wire_type(), Some(WireType::Varint));
        assert_eq!(dec.read_u32().unwrap(), 150);
    }

    #[test]
    fn test_append_bytes_appends() {
        // field 1, bytes [4, 5].
        let mut dec = decoder(&[0x0A, 0x02, 0x04, 0x05]);
        dec.read_field_header().unwrap();
        let blob = dec.append_bytes(vec![1, 2, 3]).unwrap();
        assert_eq!(blob, vec![1, 2, 3, 4, 5]);
        assert_eq!(dec.wire_type(), None);
    }

    #[test]
    fn test_read_object_without_model() {
        let mut dec = decoder(&[0x0A, 0x00]);
        dec.read_field_header().unwrap();
        let err = dec.read_object().unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::NoTypeModel);
    }

    #[test]
    fn test_end_sub_item_at_depth_zero() {
        let mut dec = decoder(&[0x0A, 0x00]);
        dec.read_field_header().unwrap();
        let token = dec.start_sub_item().unwrap();
        dec.end_sub_item(token).unwrap();

        let stray = SubItemToken(TokenKind::Delimited { prev_end: 0, end: 0 });
        let err = dec.end_sub_item(stray).unwrap_err();
        assert!(matches!(
            err.kind(),
            DecodeErrorKind::ProgrammingError { .. }
        ));
    }

    #[test]
    fn test_error_context_enrichment() {
        let mut dec = decoder(&[0x08, 0x96]);
        assert_eq!(dec.read_field_header().unwrap(), 1);
        let err = dec.read_i32().unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Truncated);

        let ctx = err.context().unwrap();
        assert_eq!(ctx.field_number, 1);
        assert_eq!(ctx.wire_type, Some(WireType::Varint));
        assert_eq!(ctx.offset, 2);
        assert_eq!(ctx.depth, 0);
    }

    #[test]
    fn test_interning_can_be_disabled() {
        let payload = &[0x0A, 0x03, b'a', b'b', b'c', 0x12, 0x03, b'a', b'b', b'c'];

        let options: DecoderOptions = DecoderOptions {
            intern_strings: false,
            ..DecoderOptions::default()
        };
        let mut dec = WireDecoder::with_options(MemorySource::new(payload.to_vec()), options);
        dec.read_field_header().unwrap();
        let first = dec.read_string().unwrap();
        dec.read_field_header().unwrap();
        let second = dec.read_string().unwrap();
        assert_eq!(first, second);
        assert_ne!(first.as_bytes().as_ptr(), second.as_bytes().as_ptr());
    }

    #[test]
    fn test_interning_shares_storage() {
        let payload = &[0x0A, 0x03, b'a', b'b', b'c', 0x12, 0x03, b'a', b'b', b'c'];
        let mut dec = decoder(payload);
        dec.read_field_header().unwrap();
        let first = dec.read_string().unwrap();
        dec.read_field_header().unwrap();
        let second = dec.read_string().unwrap();
        assert_eq!(first.as_bytes().as_ptr(), second.as_bytes().as_ptr());
    }

    #[test]
    fn test_initial_end_bounds_stream() {
        // Two varint fields, but the decoder is told the message ends at
        // offset 2.
        let options: DecoderOptions = DecoderOptions {
            initial_end: Some(2),
            ..DecoderOptions::default()
        };
        let mut dec =
            WireDecoder::with_options(MemorySource::new(vec![0x08, 0x01, 0x10, 0x02]), options);
        assert_eq!(dec.read_field_header().unwrap(), 1);
        assert_eq!(dec.read_u32().unwrap(), 1);
        assert_eq!(dec.read_field_header().unwrap(), 0);
    }
}
