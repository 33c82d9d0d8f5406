//! One-dimensional array codec shared by every array type.
//!
//! Encoded layout, all fields 32-bit big-endian:
//!
//! | bytes   | field                                              |
//! |---------|----------------------------------------------------|
//! | 0..4    | field length: 20 + sum of element frame sizes      |
//! | 4..8    | dimension count, always 1                          |
//! | 8..12   | null flag, always 0                                |
//! | 12..16  | element type identifier                            |
//! | 16..20  | element count                                      |
//! | 20..24  | lower bound, always 1                              |
//!
//! followed by one length-prefixed frame per element. The first field is
//! the ordinary field length prefix, so a decoder sees the 20 bytes after it.
//!
//! The element type identifier is not cross-checked when decoding, and NULL
//! elements and multi-dimensional arrays are rejected as decode errors.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::buffer::WriteBuf;
use super::decode::{self, Decode};
use super::encode::Encode;
use super::error::DecodeError;
use super::reader::ValueReader;
use super::types::WireType;

/// Header bytes following the length prefix.
pub const ARRAY_HEADER_LEN: usize = 20;

/// Payload length of an array: header plus every element frame.
pub fn payload_len<T: Encode>(values: &[T]) -> usize {
    ARRAY_HEADER_LEN + values.iter().map(|v| 4 + v.encoded_len()).sum::<usize>()
}

pub fn encode_array<T: Encode>(buf: &mut WriteBuf, element: WireType, values: &[T]) {
    buf.put_i32(payload_len(values) as i32);
    buf.put_i32(1); // number of dimensions
    buf.put_i32(0); // no nulls
    buf.put_u32(element.oid().0);
    buf.put_i32(values.len() as i32);
    buf.put_i32(1); // index of first element
    for v in values {
        v.encode(buf);
    }
}

/// Decode with `element` decoding each element's payload.
///
/// Any failure latches on the reader and yields an empty vector.
pub fn decode_array<T: Default>(
    vr: &mut ValueReader<'_>,
    ty: WireType,
    element: fn(&mut ValueReader<'_>) -> T,
) -> Vec<T> {
    let Some(count) = read_header(vr, ty) else {
        return Vec::new();
    };

    // element frames are at least 4 bytes; don't trust the count for capacity
    let mut out = Vec::with_capacity(count.min(vr.remaining() / 4));
    for _ in 0..count {
        let Some(mut el) = vr.element(ty) else {
            return Vec::new();
        };
        let v = element(&mut el);
        if vr.has_err() {
            return Vec::new();
        }
        out.push(v);
    }

    if vr.remaining() != 0 {
        let remaining = vr.remaining();
        vr.fail(DecodeError::TrailingBytes { ty, remaining });
        return Vec::new();
    }
    out
}

/// Returns the element count.
fn read_header(vr: &mut ValueReader<'_>, ty: WireType) -> Option<usize> {
    let dims = vr.read_i32(ty)?;
    let _has_nulls = vr.read_i32(ty)?;
    let _element_oid = vr.read_i32(ty)?;

    match dims {
        // servers send empty arrays without dimensions
        0 => Some(0),
        1 => {
            let count = vr.read_i32(ty)?;
            let _lower_bound = vr.read_i32(ty)?;
            if count < 0 {
                vr.fail(DecodeError::InvalidElementCount { ty, count });
                return None;
            }
            Some(count as usize)
        }
        _ => {
            vr.fail(DecodeError::UnsupportedDimensions { ty, dims });
            None
        }
    }
}

fn element<T: Decode>(vr: &mut ValueReader<'_>) -> T {
    T::decode(vr)
}

macro_rules! array_codec {
    ($($encode:ident, $decode:ident: $elem:ty => $array:ident, $element:ident, $f:path;)*) => {
        $(
            pub fn $encode(buf: &mut WriteBuf, values: &[$elem]) {
                encode_array(buf, WireType::$element, values)
            }

            pub fn $decode(vr: &mut ValueReader<'_>) -> Vec<$elem> {
                decode_array(vr, WireType::$array, $f)
            }
        )*
    };
}

array_codec! {
    encode_bool_array, decode_bool_array: bool => BoolArray, Bool, element::<bool>;
    encode_int2_array, decode_int2_array: i16 => Int2Array, Int2, element::<i16>;
    encode_int4_array, decode_int4_array: i32 => Int4Array, Int4, element::<i32>;
    encode_int8_array, decode_int8_array: i64 => Int8Array, Int8, element::<i64>;
    encode_float4_array, decode_float4_array: f32 => Float4Array, Float4, element::<f32>;
    encode_float8_array, decode_float8_array: f64 => Float8Array, Float8, element::<f64>;
    encode_text_array, decode_text_array: String => TextArray, Text, decode::text;
    encode_timestamp_array, decode_timestamp_array: NaiveDateTime => TimestampArray, Timestamp, element::<NaiveDateTime>;
    encode_timestamptz_array, decode_timestamptz_array: DateTime<Utc> => TimestampTzArray, TimestampTz, element::<DateTime<Utc>>;
}

/// Stamps the varchar element type; elements are encoded as text.
pub fn encode_varchar_array<S: AsRef<str>>(buf: &mut WriteBuf, values: &[S]) {
    let strs: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
    encode_array(buf, WireType::Varchar, &strs)
}

pub fn decode_varchar_array(vr: &mut ValueReader<'_>) -> Vec<String> {
    decode_array(vr, WireType::VarcharArray, decode::varchar)
}

#[cfg(test)]
mod tests {
    use super::super::reader::DecodeContext;
    use super::super::types::Oid;
    use super::*;
    use chrono::NaiveDate;

    fn header(bytes: &[u8]) -> [i32; 6] {
        let mut out = [0i32; 6];
        for (i, v) in out.iter_mut().enumerate() {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[i * 4..i * 4 + 4]);
            *v = i32::from_be_bytes(raw);
        }
        out
    }

    /// Encodes `values`, checks the header arithmetic and returns the
    /// decoded copy.
    fn check<T>(
        values: &[T],
        element: WireType,
        frame: usize,
        encode: fn(&mut WriteBuf, &[T]),
        decode: fn(&mut ValueReader<'_>) -> Vec<T>,
    ) -> Vec<T> {
        let mut buf = WriteBuf::new();
        encode(&mut buf, values);
        let bytes = buf.as_slice();

        let h = header(bytes);
        assert_eq!(h[0] as usize, 20 + values.len() * frame, "declared length");
        assert_eq!(h[1], 1, "dimensions");
        assert_eq!(h[2], 0, "null flag");
        assert_eq!(h[3] as u32, element.oid().0, "element oid");
        assert_eq!(h[4] as usize, values.len(), "element count");
        assert_eq!(h[5], 1, "lower bound");
        assert_eq!(bytes.len(), 24 + values.len() * frame);

        let mut ctx = DecodeContext::new();
        let decoded = decode(&mut ctx.reader(Some(&bytes[4..])));
        assert!(ctx.finish().is_ok());
        decoded
    }

    #[test]
    fn test_int4_array_header() {
        let values = [1, -1, i32::MAX];
        let decoded = check(&values, WireType::Int4, 8, encode_int4_array, decode_int4_array);
        assert_eq!(decoded, values);

        let mut buf = WriteBuf::new();
        encode_int4_array(&mut buf, &values);
        assert_eq!(header(buf.as_slice())[0], 44);
        assert_eq!(buf.len(), 24 + 3 * 8);
    }

    #[test]
    fn test_fixed_width_arrays() {
        let b = [true, false, true];
        assert_eq!(check(&b, WireType::Bool, 5, encode_bool_array, decode_bool_array), b);

        let s = [i16::MIN, 0, i16::MAX];
        assert_eq!(check(&s, WireType::Int2, 6, encode_int2_array, decode_int2_array), s);

        let l = [i64::MIN, 0, i64::MAX];
        assert_eq!(check(&l, WireType::Int8, 12, encode_int8_array, decode_int8_array), l);

        let f = [1.5f32, -0.0, f32::MAX];
        let got = check(&f, WireType::Float4, 8, encode_float4_array, decode_float4_array);
        assert_eq!(got, f);
        assert!(got[1].is_sign_negative());

        let d = [f64::MIN_POSITIVE, -2.25];
        assert_eq!(check(&d, WireType::Float8, 12, encode_float8_array, decode_float8_array), d);

        let y2k = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_micro_opt(0, 0, 0, 1)
            .unwrap();
        let ts = [y2k, NaiveDateTime::default()];
        assert_eq!(
            check(&ts, WireType::Timestamp, 12, encode_timestamp_array, decode_timestamp_array),
            ts
        );

        let tz = [y2k.and_utc()];
        assert_eq!(
            check(&tz, WireType::TimestampTz, 12, encode_timestamptz_array, decode_timestamptz_array),
            tz
        );
    }

    #[test]
    fn test_text_array_lengths() {
        let values = vec!["a".to_string(), String::new(), "héllo".to_string()];
        let mut buf = WriteBuf::new();
        encode_text_array(&mut buf, &values);
        let h = header(buf.as_slice());
        // 20 + 3 * 4 + (1 + 0 + 6)
        assert_eq!(h[0], 39);
        assert_eq!(h[3] as u32, Oid::TEXT.0);
        assert_eq!(buf.len(), 4 + 39);

        let mut ctx = DecodeContext::new();
        let decoded = decode_text_array(&mut ctx.reader(Some(&buf.as_slice()[4..])));
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_varchar_array_stamps_varchar() {
        let mut buf = WriteBuf::new();
        encode_varchar_array(&mut buf, &["x", "yz"]);
        let h = header(buf.as_slice());
        assert_eq!(h[3] as u32, Oid::VARCHAR.0);
        assert_eq!(h[0], 20 + 2 * 4 + 3);

        let mut ctx = DecodeContext::new();
        let decoded = decode_varchar_array(&mut ctx.reader(Some(&buf.as_slice()[4..])));
        assert_eq!(decoded, ["x", "yz"]);
    }

    #[test]
    fn test_empty_array() {
        let empty: [i64; 0] = [];
        let decoded = check(&empty, WireType::Int8, 12, encode_int8_array, decode_int8_array);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_zero_dimension_array_from_server() {
        let mut body = Vec::new();
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&0i32.to_be_bytes());
        body.extend_from_slice(&23i32.to_be_bytes());

        let mut ctx = DecodeContext::new();
        let decoded = decode_int4_array(&mut ctx.reader(Some(&body)));
        assert!(decoded.is_empty());
        assert!(ctx.finish().is_ok());
    }

    #[test]
    fn test_element_length_mismatch() {
        let mut buf = WriteBuf::new();
        encode_int2_array(&mut buf, &[1, 2]);
        let bytes = &buf.as_slice()[4..];

        // int2 frames read as int4: declared element length 2, expected 4
        let mut ctx = DecodeContext::new();
        let decoded = decode_int4_array(&mut ctx.reader(Some(bytes)));
        assert!(decoded.is_empty());
        assert_eq!(
            ctx.take_err(),
            Some(DecodeError::InvalidLength {
                ty: WireType::Int4,
                expected: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn test_rejects_multiple_dimensions_and_nulls() {
        let mut body = Vec::new();
        for v in [2i32, 0, 23, 1, 1, 1, 1] {
            body.extend_from_slice(&v.to_be_bytes());
        }
        let mut ctx = DecodeContext::new();
        assert!(decode_int4_array(&mut ctx.reader(Some(&body))).is_empty());
        assert!(matches!(
            ctx.take_err(),
            Some(DecodeError::UnsupportedDimensions { dims: 2, .. })
        ));

        let mut body = Vec::new();
        for v in [1i32, 1, 23, 1, 1, -1] {
            body.extend_from_slice(&v.to_be_bytes());
        }
        assert!(decode_int4_array(&mut ctx.reader(Some(&body))).is_empty());
        assert_eq!(ctx.take_err(), Some(DecodeError::NullElement(WireType::Int4Array)));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let mut buf = WriteBuf::new();
        encode_int4_array(&mut buf, &[7, 8]);
        let bytes = &buf.as_slice()[4..];

        let mut ctx = DecodeContext::new();
        assert!(decode_int4_array(&mut ctx.reader(Some(&bytes[..bytes.len() - 1]))).is_empty());
        assert!(matches!(ctx.take_err(), Some(DecodeError::Truncated { .. })));

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(decode_int4_array(&mut ctx.reader(Some(&long))).is_empty());
        assert_eq!(
            ctx.take_err(),
            Some(DecodeError::TrailingBytes {
                ty: WireType::Int4Array,
                remaining: 1
            })
        );
    }
}
