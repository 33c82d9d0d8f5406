//! Binary encoders, one per wire type.
//!
//! Every encoder appends one framed field: a 4-byte big-endian payload
//! length followed by the payload. Encoding cannot fail for a well-formed
//! native value.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

use super::array;
use super::buffer::WriteBuf;
use super::types::{Oid, WireType, DAYS_FROM_CE_TO_Y2K, MICROS_FROM_UNIX_EPOCH_TO_Y2K};

/// A native value that can be written as a binary field.
pub trait Encode {
    /// Type identifier the value is sent as.
    fn wire_type(&self) -> WireType;

    /// Payload length, excluding the 4-byte length prefix.
    fn encoded_len(&self) -> usize;

    /// Append the framed field.
    fn encode(&self, buf: &mut WriteBuf);
}

pub fn bool(buf: &mut WriteBuf, v: bool) {
    buf.put_i32(1);
    buf.put_u8(v as u8);
}

pub fn int2(buf: &mut WriteBuf, v: i16) {
    buf.put_i32(2);
    buf.put_i16(v);
}

pub fn int4(buf: &mut WriteBuf, v: i32) {
    buf.put_i32(4);
    buf.put_i32(v);
}

pub fn int8(buf: &mut WriteBuf, v: i64) {
    buf.put_i32(8);
    buf.put_i64(v);
}

pub fn oid(buf: &mut WriteBuf, v: Oid) {
    buf.put_i32(4);
    buf.put_u32(v.0);
}

/// IEEE-754 bits are sent as-is, so NaN payloads and -0.0 survive.
pub fn float4(buf: &mut WriteBuf, v: f32) {
    buf.put_i32(4);
    buf.put_u32(v.to_bits());
}

pub fn float8(buf: &mut WriteBuf, v: f64) {
    buf.put_i32(8);
    buf.put_slice(&v.to_bits().to_be_bytes());
}

pub fn bytea(buf: &mut WriteBuf, v: &[u8]) {
    buf.put_i32(v.len() as i32);
    buf.put_slice(v);
}

pub fn text(buf: &mut WriteBuf, v: &str) {
    bytea(buf, v.as_bytes());
}

/// varchar shares text's wire representation.
pub fn varchar(buf: &mut WriteBuf, v: &str) {
    text(buf, v);
}

/// Days since 2000-01-01 as a 4-byte signed integer.
pub fn date(buf: &mut WriteBuf, v: NaiveDate) {
    buf.put_i32(4);
    buf.put_i32(v.num_days_from_ce() - DAYS_FROM_CE_TO_Y2K);
}

pub fn timestamp(buf: &mut WriteBuf, v: NaiveDateTime) {
    timestamptz(buf, v.and_utc());
}

/// Microseconds since 2000-01-01 00:00:00 UTC. Sub-microsecond precision is
/// truncated.
pub fn timestamptz(buf: &mut WriteBuf, v: DateTime<Utc>) {
    buf.put_i32(8);
    buf.put_i64(v.timestamp_micros() - MICROS_FROM_UNIX_EPOCH_TO_Y2K);
}

macro_rules! encode_scalar {
    ($($ty:ty => $wire:ident, $len:expr, $f:ident;)*) => {
        $(
            impl Encode for $ty {
                #[inline]
                fn wire_type(&self) -> WireType {
                    WireType::$wire
                }

                #[inline]
                fn encoded_len(&self) -> usize {
                    $len
                }

                #[inline]
                fn encode(&self, buf: &mut WriteBuf) {
                    $f(buf, *self)
                }
            }
        )*
    };
}

encode_scalar! {
    bool => Bool, 1, bool;
    i16 => Int2, 2, int2;
    i32 => Int4, 4, int4;
    i64 => Int8, 8, int8;
    Oid => Oid, 4, oid;
    f32 => Float4, 4, float4;
    f64 => Float8, 8, float8;
    NaiveDate => Date, 4, date;
    NaiveDateTime => Timestamp, 8, timestamp;
    DateTime<Utc> => TimestampTz, 8, timestamptz;
}

impl Encode for [u8] {
    fn wire_type(&self) -> WireType {
        WireType::Bytea
    }

    fn encoded_len(&self) -> usize {
        self.len()
    }

    fn encode(&self, buf: &mut WriteBuf) {
        bytea(buf, self)
    }
}

impl Encode for str {
    fn wire_type(&self) -> WireType {
        WireType::Text
    }

    fn encoded_len(&self) -> usize {
        self.len()
    }

    fn encode(&self, buf: &mut WriteBuf) {
        text(buf, self)
    }
}

impl Encode for String {
    fn wire_type(&self) -> WireType {
        WireType::Text
    }

    fn encoded_len(&self) -> usize {
        self.len()
    }

    fn encode(&self, buf: &mut WriteBuf) {
        text(buf, self)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn wire_type(&self) -> WireType {
        (**self).wire_type()
    }

    fn encoded_len(&self) -> usize {
        (**self).encoded_len()
    }

    fn encode(&self, buf: &mut WriteBuf) {
        (**self).encode(buf)
    }
}

macro_rules! encode_array {
    ($($elem:ty => $wire:ident, $element:ident;)*) => {
        $(
            impl Encode for [$elem] {
                fn wire_type(&self) -> WireType {
                    WireType::$wire
                }

                fn encoded_len(&self) -> usize {
                    array::payload_len(self)
                }

                fn encode(&self, buf: &mut WriteBuf) {
                    array::encode_array(buf, WireType::$element, self)
                }
            }

            impl Encode for Vec<$elem> {
                fn wire_type(&self) -> WireType {
                    WireType::$wire
                }

                fn encoded_len(&self) -> usize {
                    array::payload_len(self)
                }

                fn encode(&self, buf: &mut WriteBuf) {
                    array::encode_array(buf, WireType::$element, self)
                }
            }
        )*
    };
}

encode_array! {
    bool => BoolArray, Bool;
    i16 => Int2Array, Int2;
    i32 => Int4Array, Int4;
    i64 => Int8Array, Int8;
    f32 => Float4Array, Float4;
    f64 => Float8Array, Float8;
    String => TextArray, Text;
    &str => TextArray, Text;
    NaiveDateTime => TimestampArray, Timestamp;
    DateTime<Utc> => TimestampTzArray, TimestampTz;
}

impl Encode for Vec<u8> {
    fn wire_type(&self) -> WireType {
        WireType::Bytea
    }

    fn encoded_len(&self) -> usize {
        self.len()
    }

    fn encode(&self, buf: &mut WriteBuf) {
        bytea(buf, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: Encode + ?Sized>(v: &T) -> Vec<u8> {
        let mut buf = WriteBuf::new();
        v.encode(&mut buf);
        assert_eq!(buf.len(), 4 + v.encoded_len());
        buf.as_slice().to_vec()
    }

    #[test]
    fn test_int4_minus_one() {
        assert_eq!(encoded(&-1i32), [0, 0, 0, 4, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encoded(&0x01020304i32), [0, 0, 0, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn test_fixed_width_prefixes() {
        assert_eq!(encoded(&true), [0, 0, 0, 1, 1]);
        assert_eq!(encoded(&false), [0, 0, 0, 1, 0]);
        assert_eq!(encoded(&-2i16), [0, 0, 0, 2, 0xFF, 0xFE]);
        assert_eq!(
            encoded(&i64::MIN),
            [0, 0, 0, 8, 0x80, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(encoded(&Oid::VARCHAR), [0, 0, 0, 4, 0, 0, 0x04, 0x13]);
    }

    #[test]
    fn test_float_bits_preserved() {
        let neg_zero = encoded(&-0.0f32);
        assert_eq!(neg_zero, [0, 0, 0, 4, 0x80, 0, 0, 0]);

        let nan = f64::from_bits(0x7FF8_0000_0000_0001);
        assert_eq!(&encoded(&nan)[4..], &0x7FF8_0000_0000_0001u64.to_be_bytes());

        // float8 must keep the high word, not just the low 32 bits
        assert_eq!(
            encoded(&1.0f64),
            [0, 0, 0, 8, 0x3F, 0xF0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_variable_width() {
        assert_eq!(encoded("hi"), [0, 0, 0, 2, b'h', b'i']);
        assert_eq!(encoded(""), [0, 0, 0, 0]);
        assert_eq!(encoded(&[0xAAu8, 0xBB][..]), [0, 0, 0, 2, 0xAA, 0xBB]);

        let mut a = WriteBuf::new();
        let mut b = WriteBuf::new();
        text(&mut a, "same");
        varchar(&mut b, "same");
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_timestamp_y2k_is_zero() {
        let y2k = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(encoded(&y2k), [0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0]);

        let before = y2k - chrono::Duration::microseconds(1);
        assert_eq!(
            encoded(&before.and_utc()),
            [0, 0, 0, 8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_date_is_day_count() {
        let d = NaiveDate::from_ymd_opt(2000, 1, 2).unwrap();
        assert_eq!(encoded(&d), [0, 0, 0, 4, 0, 0, 0, 1]);

        let d = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(&encoded(&d)[4..], &(-10957i32).to_be_bytes());
    }
}
