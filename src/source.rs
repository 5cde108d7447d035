//! Byte source abstractions for the decoder.
//!
//! A [`ByteSource`] is the window of bytes the decoder can currently see.
//! Two implementations exist: [`MemorySource`] over a contiguous buffer, and
//! [`PipeSource`] over a pull-based pipe of byte segments supplied by an
//! upstream [`PullBytes`] producer. The decoder itself is written once
//! against the trait; only `refill` differs between the two.
//!
//! Every provided combinator first tries to satisfy the request from the
//! current contiguous span and only falls back to the refill path when the
//! span runs out. This split is the main throughput optimization of the
//! decoder and must be preserved when adding primitives.

// This module uses `as` casts which have been reviewed for correctness.
#![allow(clippy::as_conversions)]

use alloc::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::DecodeErrorKind;
use crate::leb128::LebCodec;
use crate::util::likely;

/// Sentinel for "no window applied": reads run to the end of the stream.
pub const NO_WINDOW: u64 = u64::MAX;

/// A window of bytes the decoder can currently see.
///
/// Offsets are absolute from the start of the stream. The visible end can be
/// constrained with [`push_window`](ByteSource::push_window) while inside a
/// length-delimited sub-message; reads never cross the window.
pub trait ByteSource {
    /// Absolute offset of the next unread byte.
    fn position(&self) -> u64;

    /// The current contiguous span, already bounded by the window.
    fn chunk(&self) -> &[u8];

    /// Advance past `n` bytes of the current span.
    ///
    /// `n` must not exceed `chunk().len()`.
    fn consume(&mut self, n: usize);

    /// Make more bytes visible.
    ///
    /// Returns `false` when no more bytes can become visible, either because
    /// the stream ended or because the window was reached. A `true` return
    /// guarantees `chunk()` is non-empty.
    fn refill(&mut self) -> Result<bool, DecodeErrorKind>;

    /// Copy up to `buf.len()` upcoming bytes into `buf` without consuming
    /// them, returning how many were available.
    fn peek_into(&mut self, buf: &mut [u8]) -> Result<usize, DecodeErrorKind>;

    /// Read `n` bytes as a blob, zero-copy when they are contiguous.
    fn read_blob(&mut self, n: usize) -> Result<Bytes, DecodeErrorKind>;

    /// Constrain visibility to the absolute offset `end`.
    fn push_window(&mut self, end: u64);

    /// Restore visibility to the absolute offset `end` ([`NO_WINDOW`] for
    /// unbounded).
    fn pop_window(&mut self, end: u64);

    /// Bytes immediately available without a refill.
    #[inline]
    fn remaining_in_current(&self) -> usize {
        self.chunk().len()
    }

    /// True when no further bytes are visible even after a refill.
    #[inline]
    fn is_fully_consumed(&mut self) -> Result<bool, DecodeErrorKind> {
        if !self.chunk().is_empty() {
            return Ok(false);
        }
        Ok(!self.refill()?)
    }

    /// Decode an unsigned 32-bit varint, advancing past it.
    #[inline]
    fn read_varint_u32(&mut self) -> Result<u32, DecodeErrorKind>
    where
        Self: Sized,
    {
        read_varint::<Self, u32>(self)
    }

    /// Decode an unsigned 64-bit varint, advancing past it.
    #[inline]
    fn read_varint_u64(&mut self) -> Result<u64, DecodeErrorKind>
    where
        Self: Sized,
    {
        read_varint::<Self, u64>(self)
    }

    /// Consume exactly 4 bytes as a little-endian `u32`.
    #[inline]
    fn read_fixed32_le(&mut self) -> Result<u32, DecodeErrorKind>
    where
        Self: Sized,
    {
        let chunk = self.chunk();
        if likely(chunk.len() >= 4) {
            let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.consume(4);
            return Ok(value);
        }
        let mut raw = [0u8; 4];
        self.read_into(&mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Consume exactly 8 bytes as a little-endian `u64`.
    #[inline]
    fn read_fixed64_le(&mut self) -> Result<u64, DecodeErrorKind>
    where
        Self: Sized,
    {
        let chunk = self.chunk();
        if likely(chunk.len() >= 8) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&chunk[..8]);
            self.consume(8);
            return Ok(u64::from_le_bytes(raw));
        }
        let mut raw = [0u8; 8];
        self.read_into(&mut raw)?;
        Ok(u64::from_le_bytes(raw))
    }

    /// Fill `buf` completely or fail with `Truncated`.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), DecodeErrorKind>
    where
        Self: Sized,
    {
        let mut filled = 0;
        while filled < buf.len() {
            let chunk = self.chunk();
            if chunk.is_empty() {
                if !self.refill()? {
                    return Err(DecodeErrorKind::truncated());
                }
                continue;
            }
            let take = chunk.len().min(buf.len() - filled);
            buf[filled..filled + take].copy_from_slice(&chunk[..take]);
            filled += take;
            self.consume(take);
        }
        Ok(())
    }

    /// Advance past `n` bytes without materializing them.
    fn skip(&mut self, n: usize) -> Result<(), DecodeErrorKind>
    where
        Self: Sized,
    {
        let mut remaining = n;
        while remaining > 0 {
            let available = self.chunk().len();
            if available == 0 {
                if !self.refill()? {
                    return Err(DecodeErrorKind::truncated());
                }
                continue;
            }
            let take = available.min(remaining);
            self.consume(take);
            remaining -= take;
        }
        Ok(())
    }

    /// Peek the next unsigned 32-bit varint without consuming it.
    ///
    /// Returns `None` when the stream (or window) ends before the varint
    /// completes; used for field-header look-ahead where an absent or
    /// partial tag means "no match".
    fn try_peek_varint_u32(&mut self) -> Result<Option<(u32, usize)>, DecodeErrorKind>
    where
        Self: Sized,
    {
        let mut buffer = [0u8; 5];
        let have = self.peek_into(&mut buffer)?;
        if have == 0 {
            return Ok(None);
        }
        match u32::decode_leb128(&buffer[..have]) {
            Ok((value, used)) => Ok(Some((value, used))),
            Err(DecodeErrorKind::Truncated) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Decode one varint, preferring the current span and falling back to a
/// byte-at-a-time assembly across refills.
fn read_varint<S: ByteSource, V: LebCodec>(source: &mut S) -> Result<V, DecodeErrorKind> {
    let chunk = source.chunk();
    if !chunk.is_empty() {
        match V::decode_leb128(chunk) {
            Ok((value, used)) => {
                source.consume(used);
                return Ok(value);
            }
            // The span ended mid-varint; assemble across refills below.
            Err(DecodeErrorKind::Truncated) => {}
            Err(err) => return Err(err),
        }
    }

    let mut buffer = [0u8; 10];
    let mut have = 0;
    loop {
        let chunk = source.chunk();
        if chunk.is_empty() {
            if !source.refill()? {
                return Err(DecodeErrorKind::truncated());
            }
            continue;
        }
        let byte = chunk[0];
        buffer[have] = byte;
        have += 1;
        source.consume(1);
        if byte < 0x80 || have == V::MAX_LEB_BYTES {
            break;
        }
    }
    let (value, used) = V::decode_leb128(&buffer[..have])?;
    debug_assert_eq!(used, have);
    Ok(value)
}

/// A [`ByteSource`] over a contiguous in-memory buffer.
///
/// `refill` never yields more bytes; everything the source will ever see is
/// present up front. Blob reads are ref-counted slices of the backing
/// buffer.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    pos: usize,
    limit: usize,
}

impl MemorySource {
    /// Create a source over `data`. The decoder origin is offset 0.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let limit = data.len();
        MemorySource { data, pos: 0, limit }
    }

    #[inline]
    fn clamp(&self, end: u64) -> usize {
        end.min(self.data.len() as u64) as usize
    }
}

impl From<Bytes> for MemorySource {
    fn from(data: Bytes) -> Self {
        MemorySource::new(data)
    }
}

impl ByteSource for MemorySource {
    #[inline]
    fn position(&self) -> u64 {
        self.pos as u64
    }

    #[inline]
    fn chunk(&self) -> &[u8] {
        &self.data[self.pos..self.limit]
    }

    #[inline]
    fn consume(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.limit, "consumed past the window");
        self.pos += n;
    }

    #[inline]
    fn refill(&mut self) -> Result<bool, DecodeErrorKind> {
        Ok(false)
    }

    fn peek_into(&mut self, buf: &mut [u8]) -> Result<usize, DecodeErrorKind> {
        let chunk = self.chunk();
        let take = chunk.len().min(buf.len());
        buf[..take].copy_from_slice(&chunk[..take]);
        Ok(take)
    }

    fn read_blob(&mut self, n: usize) -> Result<Bytes, DecodeErrorKind> {
        if self.limit - self.pos < n {
            return Err(DecodeErrorKind::truncated());
        }
        let blob = self.data.slice(self.pos..self.pos + n);
        self.pos += n;
        Ok(blob)
    }

    fn push_window(&mut self, end: u64) {
        debug_assert!(end >= self.pos as u64, "window behind the cursor");
        self.limit = self.clamp(end);
    }

    fn pop_window(&mut self, end: u64) {
        self.limit = self.clamp(end);
    }
}

/// Upstream producer for a [`PipeSource`]: a pull-based pipe of byte
/// segments.
///
/// `pull` blocks (or otherwise suspends the reading task) until the next
/// segment is available; returning `Ok(None)` signals end-of-stream. A
/// cancelled or failed upstream reports [`DecodeErrorKind::Disposed`].
pub trait PullBytes {
    /// Pull the next segment from the upstream.
    fn pull(&mut self) -> Result<Option<Bytes>, DecodeErrorKind>;
}

/// A [`PullBytes`] over any iterator of segments.
#[derive(Debug)]
pub struct SegmentPipe<I> {
    segments: I,
}

impl<I> SegmentPipe<I> {
    pub fn new(segments: I) -> Self {
        SegmentPipe { segments }
    }
}

impl<I: Iterator<Item = Bytes>> PullBytes for SegmentPipe<I> {
    #[inline]
    fn pull(&mut self) -> Result<Option<Bytes>, DecodeErrorKind> {
        Ok(self.segments.next())
    }
}

/// A [`PullBytes`] over an [`std::io::Read`], pulling fixed-size blocks.
///
/// An I/O failure other than `Interrupted` surfaces as `Disposed`: the
/// stream cannot be resumed mid-primitive.
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct IoPipe<R> {
    reader: R,
    block_size: usize,
}

#[cfg(feature = "std")]
impl<R: std::io::Read> IoPipe<R> {
    const DEFAULT_BLOCK_SIZE: usize = 8 * 1024;

    pub fn new(reader: R) -> Self {
        IoPipe {
            reader,
            block_size: Self::DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn with_block_size(reader: R, block_size: usize) -> Self {
        debug_assert!(block_size > 0);
        IoPipe { reader, block_size }
    }
}

#[cfg(feature = "std")]
impl<R: std::io::Read> PullBytes for IoPipe<R> {
    fn pull(&mut self) -> Result<Option<Bytes>, DecodeErrorKind> {
        let mut block = alloc::vec![0u8; self.block_size];
        loop {
            match self.reader.read(&mut block) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    block.truncate(n);
                    return Ok(Some(Bytes::from(block)));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(DecodeErrorKind::Disposed),
            }
        }
    }
}

/// A [`PullBytes`] over an [`std::sync::mpsc::Receiver`].
///
/// The reading task suspends inside `recv` while the upstream produces the
/// next segment. Dropping the sender signals end-of-stream.
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct ChannelPipe {
    receiver: std::sync::mpsc::Receiver<Bytes>,
}

#[cfg(feature = "std")]
impl ChannelPipe {
    pub fn new(receiver: std::sync::mpsc::Receiver<Bytes>) -> Self {
        ChannelPipe { receiver }
    }
}

#[cfg(feature = "std")]
impl PullBytes for ChannelPipe {
    fn pull(&mut self) -> Result<Option<Bytes>, DecodeErrorKind> {
        match self.receiver.recv() {
            Ok(segment) => Ok(Some(segment)),
            Err(std::sync::mpsc::RecvError) => Ok(None),
        }
    }
}

/// A [`ByteSource`] refilled from an upstream [`PullBytes`] producer.
///
/// Segments are held in arrival order; the front segment always begins at
/// the cursor. A primitive may span several segments, in which case the
/// provided combinators of [`ByteSource`] assemble it across refills.
#[derive(Debug)]
pub struct PipeSource<P> {
    producer: P,
    segments: VecDeque<Bytes>,
    pos: u64,
    limit: u64,
    exhausted: bool,
}

impl<P: PullBytes> PipeSource<P> {
    /// Create a source pulling from `producer`. The decoder origin is the
    /// producer's first byte.
    pub fn new(producer: P) -> Self {
        PipeSource {
            producer,
            segments: VecDeque::new(),
            pos: 0,
            limit: NO_WINDOW,
            exhausted: false,
        }
    }

    /// Pull one non-empty segment into the queue.
    ///
    /// Returns `false` on end-of-stream. Empty segments are discarded: a
    /// refill must deliver strictly more visible bytes or signal the end.
    fn pull_segment(&mut self) -> Result<bool, DecodeErrorKind> {
        if self.exhausted {
            return Ok(false);
        }
        loop {
            match self.producer.pull()? {
                Some(segment) if segment.is_empty() => continue,
                Some(segment) => {
                    self.segments.push_back(segment);
                    return Ok(true);
                }
                None => {
                    self.exhausted = true;
                    return Ok(false);
                }
            }
        }
    }

    #[inline]
    fn window_remaining(&self) -> u64 {
        self.limit.saturating_sub(self.pos)
    }
}

impl<I: Iterator<Item = Bytes>> PipeSource<SegmentPipe<I>> {
    /// Convenience constructor over an iterator of segments.
    pub fn from_segments<T>(segments: T) -> Self
    where
        T: IntoIterator<IntoIter = I, Item = Bytes>,
    {
        PipeSource::new(SegmentPipe::new(segments.into_iter()))
    }
}

impl<P: PullBytes> ByteSource for PipeSource<P> {
    #[inline]
    fn position(&self) -> u64 {
        self.pos
    }

    #[inline]
    fn chunk(&self) -> &[u8] {
        match self.segments.front() {
            Some(front) => {
                let visible = (front.len() as u64).min(self.window_remaining()) as usize;
                &front[..visible]
            }
            None => &[],
        }
    }

    fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let Some(front) = self.segments.front_mut() else {
            debug_assert!(false, "consumed past end of visible span");
            return;
        };
        front.advance(n);
        self.pos += n as u64;
        if front.is_empty() {
            self.segments.pop_front();
        }
    }

    fn refill(&mut self) -> Result<bool, DecodeErrorKind> {
        if !self.chunk().is_empty() {
            return Ok(true);
        }
        if self.window_remaining() == 0 {
            return Ok(false);
        }
        self.pull_segment()
    }

    fn peek_into(&mut self, buf: &mut [u8]) -> Result<usize, DecodeErrorKind> {
        let want = (buf.len() as u64).min(self.window_remaining()) as usize;
        let mut filled = 0;
        let mut index = 0;
        while filled < want {
            if index == self.segments.len() && !self.pull_segment()? {
                break;
            }
            let segment = &self.segments[index];
            let take = segment.len().min(want - filled);
            buf[filled..filled + take].copy_from_slice(&segment[..take]);
            filled += take;
            index += 1;
        }
        Ok(filled)
    }

    fn read_blob(&mut self, n: usize) -> Result<Bytes, DecodeErrorKind> {
        if self.window_remaining() < n as u64 {
            return Err(DecodeErrorKind::truncated());
        }

        // Fast path: the blob is contiguous in the front segment.
        if let Some(front) = self.segments.front_mut() {
            if front.len() >= n {
                let blob = front.split_to(n);
                self.pos += n as u64;
                if front.is_empty() {
                    self.segments.pop_front();
                }
                return Ok(blob);
            }
        }

        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let chunk = self.chunk();
            if chunk.is_empty() {
                if !self.refill()? {
                    return Err(DecodeErrorKind::truncated());
                }
                continue;
            }
            let take = chunk.len().min(remaining);
            out.extend_from_slice(&chunk[..take]);
            self.consume(take);
            remaining -= take;
        }
        Ok(out.freeze())
    }

    fn push_window(&mut self, end: u64) {
        debug_assert!(end >= self.pos, "window behind the cursor");
        self.limit = end;
    }

    fn pop_window(&mut self, end: u64) {
        self.limit = end;
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    fn one_byte_segments(data: &[u8]) -> PipeSource<SegmentPipe<alloc::vec::IntoIter<Bytes>>> {
        let segments: Vec<Bytes> = data.iter().map(|b| Bytes::copy_from_slice(&[*b])).collect();
        PipeSource::from_segments(segments)
    }

    #[test]
    fn test_memory_basics() {
        let mut source = MemorySource::new(vec![0x96, 0x01, 0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(source.position(), 0);
        assert_eq!(source.remaining_in_current(), 6);

        assert_eq!(source.read_varint_u32().unwrap(), 150);
        assert_eq!(source.position(), 2);

        assert_eq!(source.read_fixed32_le().unwrap(), 0xDDCCBBAA);
        assert!(source.is_fully_consumed().unwrap());
    }

    #[test]
    fn test_memory_blob_shares_storage() {
        let data = Bytes::from_static(b"hello world");
        let mut source = MemorySource::new(data.clone());
        let blob = source.read_blob(5).unwrap();
        assert_eq!(&blob[..], b"hello");
        // Zero-copy: the blob points into the original allocation.
        assert_eq!(blob.as_ptr(), data.as_ptr());
    }

    #[test]
    fn test_memory_window() {
        let mut source = MemorySource::new(vec![1u8, 2, 3, 4, 5]);
        source.push_window(3);
        assert_eq!(source.chunk(), &[1, 2, 3]);
        source.skip(3).unwrap();
        assert_eq!(source.read_blob(1).unwrap_err(), DecodeErrorKind::Truncated);
        source.pop_window(NO_WINDOW);
        assert_eq!(source.read_blob(2).unwrap().as_ref(), &[4, 5]);
    }

    #[test]
    fn test_pipe_varint_spans_segments() {
        let mut source = one_byte_segments(&[0x96, 0x01, 0x2A]);
        assert_eq!(source.read_varint_u32().unwrap(), 150);
        assert_eq!(source.read_varint_u64().unwrap(), 42);
        assert!(source.is_fully_consumed().unwrap());
    }

    #[test]
    fn test_pipe_fixed_spans_segments() {
        let mut source = one_byte_segments(&[0xAA, 0xBB, 0xCC, 0xDD, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(source.read_fixed32_le().unwrap(), 0xDDCCBBAA);
        assert_eq!(source.read_fixed64_le().unwrap(), 0x0807060504030201);
    }

    #[test]
    fn test_pipe_peek() {
        let mut source = one_byte_segments(&[0x96, 0x01, 0x07]);
        let mut buf = [0u8; 5];
        assert_eq!(source.peek_into(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[0x96, 0x01, 0x07]);
        assert_eq!(source.position(), 0);

        assert_eq!(source.try_peek_varint_u32().unwrap(), Some((150, 2)));
        assert_eq!(source.read_varint_u32().unwrap(), 150);
    }

    #[test]
    fn test_pipe_window_bounds_reads() {
        let mut source = one_byte_segments(&[1, 2, 3, 4, 5]);
        source.push_window(2);
        assert_eq!(source.read_blob(3).unwrap_err(), DecodeErrorKind::Truncated);
        assert_eq!(source.read_blob(2).unwrap().as_ref(), &[1, 2]);
        assert!(source.is_fully_consumed().unwrap());
        source.pop_window(NO_WINDOW);
        assert_eq!(source.read_blob(3).unwrap().as_ref(), &[3, 4, 5]);
    }

    #[test]
    fn test_pipe_empty_segments_skipped() {
        let segments = vec![
            Bytes::new(),
            Bytes::copy_from_slice(&[0x96]),
            Bytes::new(),
            Bytes::copy_from_slice(&[0x01]),
        ];
        let mut source = PipeSource::from_segments(segments);
        assert_eq!(source.read_varint_u32().unwrap(), 150);
        assert!(source.is_fully_consumed().unwrap());
    }

    #[test]
    fn test_pipe_truncated_varint() {
        let mut source = one_byte_segments(&[0x96]);
        assert_eq!(
            source.read_varint_u32().unwrap_err(),
            DecodeErrorKind::Truncated
        );
    }

    #[test]
    fn test_pipe_blob_gathers_segments() {
        let segments = vec![
            Bytes::copy_from_slice(b"he"),
            Bytes::copy_from_slice(b"llo"),
            Bytes::copy_from_slice(b"!"),
        ];
        let mut source = PipeSource::from_segments(segments);
        assert_eq!(source.read_blob(6).unwrap().as_ref(), b"hello!");
        assert_eq!(source.position(), 6);
    }

    #[test]
    fn test_disposed_producer() {
        struct Cancelled;
        impl PullBytes for Cancelled {
            fn pull(&mut self) -> Result<Option<Bytes>, DecodeErrorKind> {
                Err(DecodeErrorKind::Disposed)
            }
        }

        let mut source = PipeSource::new(Cancelled);
        assert_eq!(
            source.read_varint_u32().unwrap_err(),
            DecodeErrorKind::Disposed
        );
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_io_pipe() {
        let data: &[u8] = &[0x96, 0x01, 0xFF];
        let mut source = PipeSource::new(IoPipe::with_block_size(data, 2));
        assert_eq!(source.read_varint_u32().unwrap(), 150);
        assert_eq!(source.read_blob(1).unwrap().as_ref(), &[0xFF]);
        assert!(source.is_fully_consumed().unwrap());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_channel_pipe() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = std::thread::spawn(move || {
            tx.send(Bytes::copy_from_slice(&[0x96])).unwrap();
            tx.send(Bytes::copy_from_slice(&[0x01])).unwrap();
        });

        let mut source = PipeSource::new(ChannelPipe::new(rx));
        assert_eq!(source.read_varint_u32().unwrap(), 150);
        assert!(source.is_fully_consumed().unwrap());
        handle.join().unwrap();
    }
}
