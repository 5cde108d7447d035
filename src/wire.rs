//! Wire format primitives for Google's Protocol Buffers, aka
//! [protobuf](https://protobuf.dev).

use core::num::NonZeroU64;

use crate::error::DecodeErrorKind;
use crate::leb128::LebCodec;
use crate::util::unlikely;

/// Minimum value of a protobuf field number.
pub const MINIMUM_FIELD_NUMBER: u32 = 1;
/// Maximum value of a protobuf field number.
pub const MAXIMUM_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Denotes how the payload of a field is encoded.
///
/// The first six variants are the wire types defined by the protobuf
/// encoding; their discriminants are the on-wire values. [`WireType::SignedVarint`]
/// never appears in a tag: it is installed by the caller through
/// [`hint`](crate::reader::WireDecoder::hint) or
/// [`assert_wire_type`](crate::reader::WireDecoder::assert_wire_type) after a
/// field header, and switches varint decoding to zig-zag.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable length integer: `int32`, `int64`, `uint32`, `uint64`,
    /// `sint32`, `sint64`, `bool`, `enum`.
    Varint = 0,
    /// 64-bit integer: `fixed64`, `sfixed64`, `double`.
    Fixed64 = 1,
    /// Length-delimited payload: `string`, `bytes`, `message`, packed
    /// `repeated` fields.
    LengthDelimited = 2,
    /// Group start (deprecated encoding, still decoded).
    StartGroup = 3,
    /// Group end.
    EndGroup = 4,
    /// 32-bit integer: `fixed32`, `sfixed32`, `float`.
    Fixed32 = 5,
    /// Zig-zag hinted form of [`WireType::Varint`]; indistinguishable on the
    /// wire (its low three bits are 0).
    SignedVarint = 8,
}

#[allow(clippy::as_conversions)]
impl WireType {
    /// Maximum raw value a tag-carried wire type can be.
    pub(crate) const MAX_WIRE_VAL: u8 = WireType::Fixed32 as u8;

    // Compile-time check that the discriminants match the wire format. The
    // `base_val` arithmetic below relies on these exact values.
    const _DISCRIMINANT_CHECK: () = {
        assert!(WireType::Varint as u8 == 0);
        assert!(WireType::Fixed64 as u8 == 1);
        assert!(WireType::LengthDelimited as u8 == 2);
        assert!(WireType::StartGroup as u8 == 3);
        assert!(WireType::EndGroup as u8 == 4);
        assert!(WireType::Fixed32 as u8 == 5);
        assert!(WireType::SignedVarint as u8 & 0b111 == 0);
    };

    /// Try to decode a tag-carried [`WireType`] from its raw value.
    #[inline(always)]
    pub(crate) fn try_from_val(value: u8) -> Result<Self, DecodeErrorKind> {
        if value <= Self::MAX_WIRE_VAL {
            // SAFETY: 0..=5 are valid discriminants of WireType, and value
            // is within that range.
            #[allow(clippy::as_conversions)]
            let wire_type: WireType = unsafe { core::mem::transmute::<u8, WireType>(value) };
            Ok(wire_type)
        } else {
            Err(DecodeErrorKind::InvalidWireType { value })
        }
    }

    /// Return the raw value for this [`WireType`].
    #[inline(always)]
    #[allow(clippy::as_conversions)]
    pub const fn into_val(self) -> u8 {
        self as u8
    }

    /// The on-wire discipline this wire type decodes with: hint variants
    /// share the low three bits of the wire type they extend.
    #[inline(always)]
    pub const fn base_val(self) -> u8 {
        self.into_val() & 0b111
    }
}

impl TryFrom<u8> for WireType {
    type Error = DecodeErrorKind;

    #[inline(always)]
    fn try_from(value: u8) -> Result<Self, DecodeErrorKind> {
        WireType::try_from_val(value)
    }
}

/// A decoded protobuf field header containing a wire type and field number.
///
/// Packed into a [`NonZeroU64`] so `Result<FieldKey, _>` returns stay in
/// registers on the hot header-reading path. The layout mirrors the wire
/// format: bits 0-2 hold the wire type, bits 3-31 the field number. Field
/// numbers start at 1, so the raw value is always at least 8 and the
/// non-zero niche is free.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct FieldKey(NonZeroU64);

#[allow(clippy::as_conversions)]
impl FieldKey {
    /// Creates a [`FieldKey`] from a raw tag, validating the wire type and
    /// field number.
    #[inline(always)]
    pub(crate) fn try_from_raw(raw_tag: u32) -> Result<Self, DecodeErrorKind> {
        #[allow(clippy::as_conversions)]
        let wire_type_raw = (raw_tag & 0b111) as u8;
        if unlikely(wire_type_raw > WireType::MAX_WIRE_VAL) {
            return Err(DecodeErrorKind::InvalidWireType {
                value: wire_type_raw,
            });
        }

        let field_number = raw_tag >> 3;
        if unlikely(field_number < MINIMUM_FIELD_NUMBER) {
            return Err(DecodeErrorKind::InvalidField {
                value: field_number,
            });
        }

        // SAFETY: field_number >= 1 was validated above, so raw_tag >= 8.
        Ok(Self(unsafe { NonZeroU64::new_unchecked(u64::from(raw_tag)) }))
    }

    /// Returns the [`WireType`] component of this key.
    #[inline(always)]
    pub fn wire_type(self) -> WireType {
        #[allow(clippy::as_conversions)]
        let raw = (self.0.get() & 0b111) as u8;
        // SAFETY: the wire type was validated during construction.
        #[allow(clippy::as_conversions)]
        unsafe {
            core::mem::transmute::<u8, WireType>(raw)
        }
    }

    /// Returns the field number component of this key.
    #[inline(always)]
    #[allow(clippy::as_conversions)]
    pub const fn field_number(self) -> u32 {
        (self.0.get() >> 3) as u32
    }

    /// Decomposes this key into its [`WireType`] and field number.
    #[inline(always)]
    pub fn into_parts(self) -> (WireType, u32) {
        (self.wire_type(), self.field_number())
    }
}

impl core::fmt::Debug for FieldKey {
    #[cold]
    #[inline(never)]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldKey")
            .field("wire_type", &self.wire_type())
            .field("field_number", &self.field_number())
            .finish()
    }
}

crate::util::assert_eq_size!(FieldKey, u64);

/// Encodes a field number and wire type as a protobuf field key.
///
/// The key always fits a `u32`: the maximum field number is `2^29 - 1`, so
/// the maximum raw key is `u32::MAX`.
#[inline(always)]
pub fn encode_key<B: bytes::BufMut>(wire_type: WireType, field_number: u32, buf: &mut B) {
    debug_assert!(wire_type.into_val() <= WireType::MAX_WIRE_VAL);
    let key = (field_number << 3) | u32::from(wire_type.into_val());
    key.encode_leb128(buf);
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use proptest::prelude::*;

    use super::*;
    use crate::error::DecodeErrorKind;

    #[test]
    fn proptest_key_roundtrips() {
        fn arb_field() -> impl Strategy<Value = u32> {
            MINIMUM_FIELD_NUMBER..=MAXIMUM_FIELD_NUMBER
        }

        fn arb_wiretype() -> impl Strategy<Value = WireType> {
            (0..=5u8).prop_map(|val| WireType::try_from_val(val).expect("known valid"))
        }

        fn test(field_number: u32, wire_type: WireType) {
            let mut buf = Vec::with_capacity(8);
            encode_key(wire_type, field_number, &mut buf);

            let (raw, _) = u32::decode_leb128(&buf).unwrap();
            let (rnd_wire_type, rnd_field) = FieldKey::try_from_raw(raw).unwrap().into_parts();

            assert_eq!(field_number, rnd_field);
            assert_eq!(wire_type, rnd_wire_type);
        }

        let strat = (arb_field(), arb_wiretype());
        proptest!(|((field_number, wire_type) in strat)| test(field_number, wire_type))
    }

    #[test]
    fn test_all_wire_type_values() {
        for i in u8::MIN..u8::MAX {
            let wire_type = WireType::try_from_val(i);
            match (i, wire_type) {
                (0, Ok(WireType::Varint))
                | (1, Ok(WireType::Fixed64))
                | (2, Ok(WireType::LengthDelimited))
                | (3, Ok(WireType::StartGroup))
                | (4, Ok(WireType::EndGroup))
                | (5, Ok(WireType::Fixed32)) => (),
                (_, Err(DecodeErrorKind::InvalidWireType { .. })) => (),
                other => panic!("unexpected value {other:?}"),
            }
        }
    }

    #[test]
    fn test_invalid_keys() {
        // Field number 0 is reserved.
        assert_eq!(
            FieldKey::try_from_raw(0b0000_0010).unwrap_err(),
            DecodeErrorKind::InvalidField { value: 0 }
        );
        // Wire types 6 and 7 do not exist.
        assert_eq!(
            FieldKey::try_from_raw((1 << 3) | 6).unwrap_err(),
            DecodeErrorKind::InvalidWireType { value: 6 }
        );
        assert_eq!(
            FieldKey::try_from_raw((1 << 3) | 7).unwrap_err(),
            DecodeErrorKind::InvalidWireType { value: 7 }
        );
    }

    #[test]
    fn test_signed_varint_shares_base() {
        assert_eq!(WireType::SignedVarint.base_val(), WireType::Varint.base_val());
        assert_ne!(WireType::SignedVarint, WireType::Varint);
    }
}
