//! Outbound message buffer.
//!
//! A frame is a 1-byte tag followed by a 4-byte big-endian length that counts
//! itself and the payload but not the tag. The length is written as a
//! placeholder by [`WriteBuf::start_msg`] and patched by
//! [`WriteBuf::close_msg`].

use bytes::{BufMut, BytesMut};

/// Growable buffer holding zero or more framed frontend messages.
#[derive(Debug, Default)]
pub struct WriteBuf {
    buf: BytesMut,
    /// Offset of the length field of the message being written.
    open: Option<usize>,
}

impl WriteBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            open: None,
        }
    }

    /// Begin a tagged message, closing any message still open.
    pub fn start_msg(&mut self, tag: u8) {
        self.close_msg();
        self.buf.put_u8(tag);
        self.open = Some(self.buf.len());
        self.buf.put_i32(0);
    }

    /// Begin a message without a tag byte (StartupMessage).
    pub fn start_untagged(&mut self) {
        self.close_msg();
        self.open = Some(self.buf.len());
        self.buf.put_i32(0);
    }

    /// Patch the length of the open message. No-op when none is open.
    pub fn close_msg(&mut self) {
        if let Some(start) = self.open.take() {
            let len = (self.buf.len() - start) as i32;
            self.buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
        }
    }

    /// Whether a message has been started and not yet closed.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Close the open message and return every byte written so far.
    pub fn finish(&mut self) -> &[u8] {
        self.close_msg();
        &self.buf
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16(v);
    }

    #[inline]
    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    #[inline]
    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    #[inline]
    pub fn put_slice(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    /// Write a null-terminated string.
    pub fn put_cstr(&mut self, v: &str) {
        self.buf.put_slice(v.as_bytes());
        self.buf.put_u8(0);
    }

    /// Number of bytes written, including any unpatched length placeholder.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Raw contents without closing the open message.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes written after `offset`.
    pub(crate) fn since(&self, offset: usize) -> &[u8] {
        &self.buf[offset..]
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.open = None;
    }
}
