//! LEB128 variable-length integer encoding/decoding.

// This module uses `as` casts which have been reviewed for correctness.
#![allow(clippy::as_conversions)]

use crate::error::DecodeErrorKind;

/// Types that can be decoded from a LEB128 encoded integer.
///
/// `decode_leb128` reads from the front of a slice without consuming it; the
/// returned byte count is what the caller advances by. This doubles as the
/// peek primitive used for field-header look-ahead.
pub trait LebCodec: Sized + Copy {
    /// Longest valid encoding of this type.
    const MAX_LEB_BYTES: usize;

    /// Decode a LEB128 integer from the front of `data`.
    ///
    /// Returns the value and the number of bytes it occupied. Fails with
    /// `Truncated` when the slice ends with the continuation bit still set,
    /// and with `Overflow` when the encoding carries bits the target width
    /// cannot hold. Non-minimal encodings (e.g. `0x80 0x00` for zero) are
    /// accepted.
    fn decode_leb128(data: &[u8]) -> Result<(Self, usize), DecodeErrorKind>;

    /// Encode `self` into `buf`, returning the number of bytes written.
    fn encode_leb128<B: bytes::BufMut>(self, buf: &mut B) -> usize;
}

impl LebCodec for u32 {
    const MAX_LEB_BYTES: usize = 5;

    #[inline]
    fn decode_leb128(data: &[u8]) -> Result<(Self, usize), DecodeErrorKind> {
        let mut value: u32 = 0;
        for (i, &b) in data.iter().take(Self::MAX_LEB_BYTES).enumerate() {
            if i == 4 {
                // Fifth byte: the continuation bit must be clear and only
                // bits 28..=31 of the result may be populated.
                if b & 0xF0 != 0 {
                    return Err(DecodeErrorKind::overflow("u32"));
                }
                value |= u32::from(b) << 28;
                return Ok((value, 5));
            }
            value |= u32::from(b & 0x7F) << (7 * i);
            if b < 0x80 {
                return Ok((value, i + 1));
            }
        }
        Err(DecodeErrorKind::truncated())
    }

    #[inline]
    fn encode_leb128<B: bytes::BufMut>(self, buf: &mut B) -> usize {
        let mut value = self;
        let mut written = 0;
        loop {
            written += 1;
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                buf.put_u8(byte);
                return written;
            }
            buf.put_u8(byte | 0x80);
        }
    }
}

impl LebCodec for u64 {
    const MAX_LEB_BYTES: usize = 10;

    #[inline]
    fn decode_leb128(data: &[u8]) -> Result<(Self, usize), DecodeErrorKind> {
        let mut value: u64 = 0;
        for (i, &b) in data.iter().take(Self::MAX_LEB_BYTES).enumerate() {
            if i == 9 {
                // Tenth byte: the continuation bit must be clear and only
                // bit 63 of the result may be populated.
                if b > 1 {
                    return Err(DecodeErrorKind::overflow("u64"));
                }
                value |= u64::from(b) << 63;
                return Ok((value, 10));
            }
            value |= u64::from(b & 0x7F) << (7 * i);
            if b < 0x80 {
                return Ok((value, i + 1));
            }
        }
        Err(DecodeErrorKind::truncated())
    }

    #[inline]
    fn encode_leb128<B: bytes::BufMut>(self, buf: &mut B) -> usize {
        let mut value = self;
        let mut written = 0;
        loop {
            written += 1;
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                buf.put_u8(byte);
                return written;
            }
            buf.put_u8(byte | 0x80);
        }
    }
}

/// Zig-zag encode a signed 32-bit integer.
#[inline]
pub const fn zigzag_encode_32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Zig-zag decode into a signed 32-bit integer.
#[inline]
pub const fn zigzag_decode_32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ (-((n & 1) as i32))
}

/// Zig-zag encode a signed 64-bit integer.
#[inline]
pub const fn zigzag_encode_64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Zig-zag decode into a signed 64-bit integer.
#[inline]
pub const fn zigzag_decode_64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
