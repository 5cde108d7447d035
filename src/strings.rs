//! Validated UTF-8 strings and the decoder-local interner.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::fmt;

use bytes::Bytes;

use crate::error::DecodeErrorKind;

/// A protobuf `string` value: UTF-8, backed by a ref-counted byte buffer.
///
/// Validation happens once at construction; clones share the underlying
/// storage, which is what makes interning identity-preserving.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProtoString(Bytes);

impl ProtoString {
    /// The shared empty string. Does not allocate.
    #[inline]
    pub fn empty() -> Self {
        ProtoString(Bytes::new())
    }

    /// Validate `data` as UTF-8 and wrap it.
    pub fn from_utf8(data: Bytes) -> Result<Self, DecodeErrorKind> {
        if core::str::from_utf8(&data).is_err() {
            return Err(DecodeErrorKind::InvalidUtf8);
        }
        Ok(ProtoString(data))
    }

    /// Returns the string as a `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: the bytes were validated as UTF-8 at construction.
        unsafe { core::str::from_utf8_unchecked(&self.0) }
    }

    /// Returns the underlying bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the string and returns the underlying buffer.
    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl core::ops::Deref for ProtoString {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl From<&str> for ProtoString {
    fn from(s: &str) -> Self {
        ProtoString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for ProtoString {
    fn from(s: String) -> Self {
        ProtoString(Bytes::from(s))
    }
}

impl fmt::Display for ProtoString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity-preserving lookup of decoded strings, keyed by content.
///
/// On a hit the canonical instance is returned and the fresh decode is
/// dropped; on a miss the fresh string becomes the canonical instance.
/// The interner lives and dies with its decoder; it is never shared between
/// decoders or with the host process.
#[derive(Debug, Default)]
pub struct StringInterner {
    entries: BTreeMap<ProtoString, ()>,
}

impl StringInterner {
    pub(crate) fn new() -> Self {
        StringInterner::default()
    }

    /// Resolve `s` to its canonical instance, inserting it on a miss.
    pub fn intern(&mut self, s: ProtoString) -> ProtoString {
        if s.is_empty() {
            return ProtoString::empty();
        }
        if let Some((canonical, ())) = self.entries.get_key_value(&s) {
            return canonical.clone();
        }
        self.entries.insert(s.clone(), ());
        s
    }

    /// Number of distinct strings seen so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
