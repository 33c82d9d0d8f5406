//! Binary decoders, one per wire type.
//!
//! Each decoder consumes a [`ValueReader`] positioned over exactly one field
//! payload. On malformed input it latches a [`DecodeError`] on the reader's
//! context and returns the type's default value; it never reads past the
//! field.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::array;
use super::error::DecodeError;
use super::reader::ValueReader;
use super::types::{Oid, WireType, DAYS_FROM_CE_TO_Y2K, MICROS_FROM_UNIX_EPOCH_TO_Y2K};

/// A native type that can be read from a binary field.
///
/// `Default` supplies the value returned when decoding fails or an earlier
/// error is already latched.
pub trait Decode: Sized + Default {
    fn decode(vr: &mut ValueReader<'_>) -> Self;
}

pub fn bool(vr: &mut ValueReader<'_>) -> bool {
    vr.fixed::<1>(WireType::Bool).is_some_and(|[b]| b != 0)
}

pub fn int2(vr: &mut ValueReader<'_>) -> i16 {
    vr.fixed(WireType::Int2).map_or(0, i16::from_be_bytes)
}

pub fn int4(vr: &mut ValueReader<'_>) -> i32 {
    vr.fixed(WireType::Int4).map_or(0, i32::from_be_bytes)
}

pub fn int8(vr: &mut ValueReader<'_>) -> i64 {
    vr.fixed(WireType::Int8).map_or(0, i64::from_be_bytes)
}

pub fn oid(vr: &mut ValueReader<'_>) -> Oid {
    vr.fixed(WireType::Oid)
        .map_or(Oid(0), |b| Oid(u32::from_be_bytes(b)))
}

pub fn float4(vr: &mut ValueReader<'_>) -> f32 {
    vr.fixed(WireType::Float4)
        .map_or(0.0, |b| f32::from_bits(u32::from_be_bytes(b)))
}

pub fn float8(vr: &mut ValueReader<'_>) -> f64 {
    vr.fixed(WireType::Float8)
        .map_or(0.0, |b| f64::from_bits(u64::from_be_bytes(b)))
}

pub fn bytea(vr: &mut ValueReader<'_>) -> Vec<u8> {
    vr.rest(WireType::Bytea).map(<[u8]>::to_vec).unwrap_or_default()
}

pub fn text(vr: &mut ValueReader<'_>) -> String {
    string(vr, WireType::Text)
}

/// varchar shares text's wire representation.
pub fn varchar(vr: &mut ValueReader<'_>) -> String {
    string(vr, WireType::Varchar)
}

fn string(vr: &mut ValueReader<'_>, ty: WireType) -> String {
    let Some(bytes) = vr.rest(ty) else {
        return String::new();
    };
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(source) => {
            vr.fail(DecodeError::InvalidUtf8 { ty, source });
            String::new()
        }
    }
}

/// Days since 2000-01-01 as a 4-byte signed integer.
pub fn date(vr: &mut ValueReader<'_>) -> NaiveDate {
    let Some(bytes) = vr.fixed(WireType::Date) else {
        return NaiveDate::default();
    };
    i32::from_be_bytes(bytes)
        .checked_add(DAYS_FROM_CE_TO_Y2K)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .unwrap_or_else(|| {
            vr.fail(DecodeError::OutOfRange(WireType::Date));
            NaiveDate::default()
        })
}

pub fn timestamp(vr: &mut ValueReader<'_>) -> NaiveDateTime {
    instant(vr, WireType::Timestamp)
        .map(|t| t.naive_utc())
        .unwrap_or_default()
}

pub fn timestamptz(vr: &mut ValueReader<'_>) -> DateTime<Utc> {
    instant(vr, WireType::TimestampTz).unwrap_or_default()
}

/// Microseconds since 2000-01-01 00:00:00 UTC.
fn instant(vr: &mut ValueReader<'_>, ty: WireType) -> Option<DateTime<Utc>> {
    let micros = i64::from_be_bytes(vr.fixed(ty)?);
    let t = micros
        .checked_add(MICROS_FROM_UNIX_EPOCH_TO_Y2K)
        .and_then(DateTime::<Utc>::from_timestamp_micros);
    if t.is_none() {
        vr.fail(DecodeError::OutOfRange(ty));
    }
    t
}

/// Remaining bytes of a field of unknown type.
pub(crate) fn raw(vr: &mut ValueReader<'_>) -> Vec<u8> {
    vr.rest(WireType::Bytea).map(<[u8]>::to_vec).unwrap_or_default()
}

macro_rules! decode_scalar {
    ($($ty:ty => $f:path),* $(,)?) => {
        $(
            impl Decode for $ty {
                #[inline]
                fn decode(vr: &mut ValueReader<'_>) -> Self {
                    $f(vr)
                }
            }
        )*
    };
}

decode_scalar! {
    bool => bool,
    i16 => int2,
    i32 => int4,
    i64 => int8,
    Oid => oid,
    f32 => float4,
    f64 => float8,
    Vec<u8> => bytea,
    String => text,
    NaiveDate => date,
    NaiveDateTime => timestamp,
    DateTime<Utc> => timestamptz,
    Vec<bool> => array::decode_bool_array,
    Vec<i16> => array::decode_int2_array,
    Vec<i32> => array::decode_int4_array,
    Vec<i64> => array::decode_int8_array,
    Vec<f32> => array::decode_float4_array,
    Vec<f64> => array::decode_float8_array,
    Vec<String> => array::decode_text_array,
    Vec<NaiveDateTime> => array::decode_timestamp_array,
    Vec<DateTime<Utc>> => array::decode_timestamptz_array,
}

#[cfg(test)]
mod tests {
    use super::super::reader::DecodeContext;
    use super::*;

    fn decode_one<T: Decode>(data: &[u8]) -> Result<T, DecodeError> {
        let mut ctx = DecodeContext::new();
        let result = ctx.reader(Some(data)).decode();
        result
    }

    #[test]
    fn test_int_decoding_is_big_endian() {
        assert_eq!(decode_one::<i16>(&[0x01, 0x02]), Ok(0x0102));
        assert_eq!(decode_one::<i32>(&[0xFF, 0xFF, 0xFF, 0xFE]), Ok(-2));
        assert_eq!(
            decode_one::<i64>(&[0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]),
            Ok(i64::MAX)
        );
        assert_eq!(decode_one::<Oid>(&[0, 0, 0, 25]), Ok(Oid::TEXT));
    }

    #[test]
    fn test_wrong_width_names_expected_and_actual() {
        let err = decode_one::<i64>(&[0, 0, 0, 1]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::InvalidLength {
                ty: WireType::Int8,
                expected: 8,
                actual: 4
            }
        );
        assert_eq!(
            err.to_string(),
            "invalid length for int8: expected 8 bytes, got 4"
        );
    }

    #[test]
    fn test_bool_rejects_two_bytes() {
        assert!(decode_one::<bool>(&[0, 1]).is_err());
        assert_eq!(decode_one::<bool>(&[1]), Ok(true));
        assert_eq!(decode_one::<bool>(&[0]), Ok(false));
    }

    #[test]
    fn test_float_from_bit_pattern() {
        assert_eq!(decode_one::<f32>(&1.5f32.to_bits().to_be_bytes()), Ok(1.5));
        let v = decode_one::<f64>(&(-0.0f64).to_bits().to_be_bytes()).unwrap();
        assert!(v == 0.0 && v.is_sign_negative());
    }

    #[test]
    fn test_text_and_bytea_copy_verbatim() {
        assert_eq!(decode_one::<String>(b"hello"), Ok("hello".to_string()));
        assert_eq!(decode_one::<String>(b""), Ok(String::new()));
        assert_eq!(decode_one::<Vec<u8>>(&[0, 255, 7]), Ok(vec![0, 255, 7]));
        assert!(matches!(
            decode_one::<String>(&[0xC3, 0x28]),
            Err(DecodeError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_timestamp_epoch() {
        let ts = decode_one::<NaiveDateTime>(&[0; 8]).unwrap();
        assert_eq!(ts.to_string(), "2000-01-01 00:00:00");

        let ts = decode_one::<DateTime<Utc>>(&(-1i64).to_be_bytes()).unwrap();
        assert_eq!(ts.to_rfc3339(), "1999-12-31T23:59:59.999999+00:00");
    }

    #[test]
    fn test_timestamp_out_of_range() {
        // 'infinity'
        let err = decode_one::<NaiveDateTime>(&i64::MAX.to_be_bytes()).unwrap_err();
        assert_eq!(err, DecodeError::OutOfRange(WireType::Timestamp));
    }

    #[test]
    fn test_date_day_count() {
        assert_eq!(
            decode_one::<NaiveDate>(&0i32.to_be_bytes()),
            Ok(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
        );
        assert_eq!(
            decode_one::<NaiveDate>(&(-1i32).to_be_bytes()),
            Ok(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap())
        );
        assert!(decode_one::<NaiveDate>(&i32::MAX.to_be_bytes()).is_err());
    }

    #[test]
    fn test_read_and_decode_agree() {
        let data = 42i32.to_be_bytes();

        let mut ctx = DecodeContext::new();
        let deferred: i32 = ctx.reader(Some(&data)).read();
        assert!(ctx.finish().is_ok());

        let mut ctx = DecodeContext::new();
        let immediate: i32 = ctx.reader(Some(&data)).decode().unwrap();

        assert_eq!(deferred, immediate);
    }

    #[test]
    fn test_sticky_error_returns_zero_values() {
        let mut ctx = DecodeContext::new();
        let bad = [1u8, 2, 3];
        let good = 7i32.to_be_bytes();

        assert_eq!(ctx.reader(Some(&bad)).read::<i32>(), 0);
        assert_eq!(ctx.reader(Some(&good)).read::<i32>(), 0);
        assert_eq!(ctx.reader(Some(b"abc")).read::<String>(), "");
        assert!(ctx.has_err());

        ctx.take_err();
        assert_eq!(ctx.reader(Some(&good)).read::<i32>(), 7);
        assert!(!ctx.has_err());
    }
}
