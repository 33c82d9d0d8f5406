//! Field cursor and the sticky decode error it reports into.
//!
//! A [`ValueReader`] views the payload of exactly one field; the enclosing
//! frame has already consumed the length prefix. Every reader created for
//! one row shares a single [`DecodeContext`]. The first decode failure is
//! latched there and every later decode against the same context returns
//! the type's default value without touching its bytes, until the caller
//! drains the error with [`DecodeContext::take_err`].

use super::decode::Decode;
use super::error::DecodeError;
use super::types::WireType;

/// The shared error slot for one message-processing cycle.
#[derive(Debug, Default)]
pub struct DecodeContext {
    err: Option<DecodeError>,
}

impl DecodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor over one field. `None` is a NULL field.
    pub fn reader<'a>(&'a mut self, data: Option<&'a [u8]>) -> ValueReader<'a> {
        ValueReader::new(data, self)
    }

    pub fn err(&self) -> Option<&DecodeError> {
        self.err.as_ref()
    }

    pub fn has_err(&self) -> bool {
        self.err.is_some()
    }

    /// Drain the latched error.
    pub fn take_err(&mut self) -> Option<DecodeError> {
        self.err.take()
    }

    /// Drain the latched error into a `Result`.
    pub fn finish(&mut self) -> Result<(), DecodeError> {
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Latch `err` unless an earlier error is already held.
    pub(crate) fn fail(&mut self, err: DecodeError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }
}

/// Byte cursor over one field value.
#[derive(Debug)]
pub struct ValueReader<'a> {
    data: Option<&'a [u8]>,
    pos: usize,
    ctx: &'a mut DecodeContext,
}

impl<'a> ValueReader<'a> {
    pub fn new(data: Option<&'a [u8]>, ctx: &'a mut DecodeContext) -> Self {
        Self { data, pos: 0, ctx }
    }

    /// Decode the next value, leaving any error latched on the context.
    pub fn read<T: Decode>(&mut self) -> T {
        T::decode(self)
    }

    /// Decode the next value and drain the context's error immediately.
    ///
    /// Decodes exactly as [`read`](Self::read) does. An error latched by an
    /// earlier `read` on the same context is returned here as well.
    pub fn decode<T: Decode>(&mut self) -> Result<T, DecodeError> {
        let v = T::decode(self);
        match self.ctx.take_err() {
            Some(e) => Err(e),
            None => Ok(v),
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_none()
    }

    /// Declared field length, -1 for NULL.
    pub fn len(&self) -> i32 {
        self.data.map_or(-1, |d| d.len() as i32)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.map_or(0, |d| d.len() - self.pos)
    }

    pub fn err(&self) -> Option<&DecodeError> {
        self.ctx.err()
    }

    pub fn has_err(&self) -> bool {
        self.ctx.has_err()
    }

    pub fn take_err(&mut self) -> Option<DecodeError> {
        self.ctx.take_err()
    }

    /// Latch an error on the shared context.
    pub fn fail(&mut self, err: DecodeError) {
        self.ctx.fail(err);
    }

    /// Bytes of a NULL-checked field, or `None` once an error is latched.
    fn payload(&mut self, ty: WireType) -> Option<&'a [u8]> {
        if self.ctx.has_err() {
            return None;
        }
        match self.data {
            Some(data) => Some(&data[self.pos..]),
            None => {
                self.ctx.fail(DecodeError::UnexpectedNull(ty));
                None
            }
        }
    }

    /// Consume the whole field, which must be exactly `N` bytes.
    pub(crate) fn fixed<const N: usize>(&mut self, ty: WireType) -> Option<[u8; N]> {
        let rest = self.payload(ty)?;
        let Ok(bytes) = <[u8; N]>::try_from(rest) else {
            self.ctx.fail(DecodeError::InvalidLength {
                ty,
                expected: N,
                actual: rest.len(),
            });
            return None;
        };
        self.pos += N;
        Some(bytes)
    }

    /// Consume every remaining byte.
    pub(crate) fn rest(&mut self, ty: WireType) -> Option<&'a [u8]> {
        let rest = self.payload(ty)?;
        self.pos += rest.len();
        Some(rest)
    }

    /// Consume the next `n` bytes.
    pub(crate) fn take(&mut self, ty: WireType, n: usize) -> Option<&'a [u8]> {
        let rest = self.payload(ty)?;
        if rest.len() < n {
            self.ctx.fail(DecodeError::Truncated {
                ty,
                needed: n,
                remaining: rest.len(),
            });
            return None;
        }
        self.pos += n;
        Some(&rest[..n])
    }

    pub(crate) fn read_i32(&mut self, ty: WireType) -> Option<i32> {
        let bytes = self.take(ty, 4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Some(i32::from_be_bytes(raw))
    }

    /// Cursor over the next length-prefixed element, sharing this context.
    /// NULL elements are rejected.
    pub(crate) fn element(&mut self, ty: WireType) -> Option<ValueReader<'_>> {
        let len = self.read_i32(ty)?;
        if len < 0 {
            self.ctx.fail(DecodeError::NullElement(ty));
            return None;
        }
        let data = self.take(ty, len as usize)?;
        Some(ValueReader::new(Some(data), self.ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_checks_declared_length() {
        let mut ctx = DecodeContext::new();
        let data = [0u8, 1, 2];
        let mut vr = ctx.reader(Some(&data));
        assert_eq!(vr.fixed::<4>(WireType::Int4), None);
        assert_eq!(
            ctx.take_err(),
            Some(DecodeError::InvalidLength {
                ty: WireType::Int4,
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn test_sticky_error_blocks_later_reads() {
        let mut ctx = DecodeContext::new();
        ctx.fail(DecodeError::OutOfRange(WireType::Date));

        let data = [0u8, 0, 0, 7];
        let mut vr = ctx.reader(Some(&data));
        assert_eq!(vr.fixed::<4>(WireType::Int4), None);
        // nothing consumed
        assert_eq!(vr.remaining(), 4);
        assert_eq!(ctx.take_err(), Some(DecodeError::OutOfRange(WireType::Date)));
    }

    #[test]
    fn test_first_error_wins() {
        let mut ctx = DecodeContext::new();
        ctx.fail(DecodeError::OutOfRange(WireType::Date));
        ctx.fail(DecodeError::ColumnOutOfRange(3));
        assert_eq!(ctx.finish(), Err(DecodeError::OutOfRange(WireType::Date)));
        assert_eq!(ctx.finish(), Ok(()));
    }

    #[test]
    fn test_null_field() {
        let mut ctx = DecodeContext::new();
        let mut vr = ctx.reader(None);
        assert!(vr.is_null());
        assert_eq!(vr.len(), -1);
        assert_eq!(vr.rest(WireType::Text), None);
        assert_eq!(ctx.take_err(), Some(DecodeError::UnexpectedNull(WireType::Text)));
    }

    #[test]
    fn test_element_rejects_truncation() {
        let mut ctx = DecodeContext::new();
        let data = [0u8, 0, 0, 8, 1, 2];
        let mut vr = ctx.reader(Some(&data));
        assert!(vr.element(WireType::Int8Array).is_none());
        assert!(matches!(
            ctx.take_err(),
            Some(DecodeError::Truncated { needed: 8, remaining: 2, .. })
        ));
    }
}
