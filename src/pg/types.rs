//! PostgreSQL type identifiers and dynamic values.
//!
//! Reference: https://www.postgresql.org/docs/current/protocol-overview.html#PROTOCOL-FORMAT-CODES

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::buffer::WriteBuf;
use super::decode;
use super::encode::Encode;
use super::reader::ValueReader;

/// Microseconds between 1970-01-01 and 2000-01-01 (the Postgres epoch).
pub const MICROS_FROM_UNIX_EPOCH_TO_Y2K: i64 = 946_684_800_000_000;

/// Days between 0001-01-01 (CE day 1) and 2000-01-01.
pub(crate) const DAYS_FROM_CE_TO_Y2K: i32 = 730_120;

// ============================================================================
// Type OIDs
// ============================================================================

/// PostgreSQL type object identifier as carried on the wire.
///
/// Row descriptions may name any server type, so this stays open; the types
/// this crate can encode and decode are enumerated by [`WireType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Oid(pub u32);

impl Oid {
    pub const BOOL: Oid = Oid(16);
    pub const BYTEA: Oid = Oid(17);
    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);
    pub const TEXT: Oid = Oid(25);
    pub const OID: Oid = Oid(26);
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);
    pub const VARCHAR: Oid = Oid(1043);
    pub const DATE: Oid = Oid(1082);
    pub const TIMESTAMP: Oid = Oid(1114);
    pub const TIMESTAMPTZ: Oid = Oid(1184);

    // One-dimensional array types
    pub const BOOL_ARRAY: Oid = Oid(1000);
    pub const INT2_ARRAY: Oid = Oid(1005);
    pub const INT4_ARRAY: Oid = Oid(1007);
    pub const TEXT_ARRAY: Oid = Oid(1009);
    pub const VARCHAR_ARRAY: Oid = Oid(1015);
    pub const INT8_ARRAY: Oid = Oid(1016);
    pub const FLOAT4_ARRAY: Oid = Oid(1021);
    pub const FLOAT8_ARRAY: Oid = Oid(1022);
    pub const TIMESTAMP_ARRAY: Oid = Oid(1115);
    pub const TIMESTAMPTZ_ARRAY: Oid = Oid(1185);

    /// Get the raw value
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// The closed set of types with a binary codec in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Bool,
    Bytea,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Text,
    Varchar,
    Date,
    Timestamp,
    TimestampTz,
    BoolArray,
    Int2Array,
    Int4Array,
    Int8Array,
    Float4Array,
    Float8Array,
    TextArray,
    VarcharArray,
    TimestampArray,
    TimestampTzArray,
}

impl WireType {
    pub fn oid(self) -> Oid {
        match self {
            WireType::Bool => Oid::BOOL,
            WireType::Bytea => Oid::BYTEA,
            WireType::Int2 => Oid::INT2,
            WireType::Int4 => Oid::INT4,
            WireType::Int8 => Oid::INT8,
            WireType::Oid => Oid::OID,
            WireType::Float4 => Oid::FLOAT4,
            WireType::Float8 => Oid::FLOAT8,
            WireType::Text => Oid::TEXT,
            WireType::Varchar => Oid::VARCHAR,
            WireType::Date => Oid::DATE,
            WireType::Timestamp => Oid::TIMESTAMP,
            WireType::TimestampTz => Oid::TIMESTAMPTZ,
            WireType::BoolArray => Oid::BOOL_ARRAY,
            WireType::Int2Array => Oid::INT2_ARRAY,
            WireType::Int4Array => Oid::INT4_ARRAY,
            WireType::Int8Array => Oid::INT8_ARRAY,
            WireType::Float4Array => Oid::FLOAT4_ARRAY,
            WireType::Float8Array => Oid::FLOAT8_ARRAY,
            WireType::TextArray => Oid::TEXT_ARRAY,
            WireType::VarcharArray => Oid::VARCHAR_ARRAY,
            WireType::TimestampArray => Oid::TIMESTAMP_ARRAY,
            WireType::TimestampTzArray => Oid::TIMESTAMPTZ_ARRAY,
        }
    }

    pub fn from_oid(oid: Oid) -> Option<Self> {
        let ty = match oid {
            Oid::BOOL => WireType::Bool,
            Oid::BYTEA => WireType::Bytea,
            Oid::INT2 => WireType::Int2,
            Oid::INT4 => WireType::Int4,
            Oid::INT8 => WireType::Int8,
            Oid::OID => WireType::Oid,
            Oid::FLOAT4 => WireType::Float4,
            Oid::FLOAT8 => WireType::Float8,
            Oid::TEXT => WireType::Text,
            Oid::VARCHAR => WireType::Varchar,
            Oid::DATE => WireType::Date,
            Oid::TIMESTAMP => WireType::Timestamp,
            Oid::TIMESTAMPTZ => WireType::TimestampTz,
            Oid::BOOL_ARRAY => WireType::BoolArray,
            Oid::INT2_ARRAY => WireType::Int2Array,
            Oid::INT4_ARRAY => WireType::Int4Array,
            Oid::INT8_ARRAY => WireType::Int8Array,
            Oid::FLOAT4_ARRAY => WireType::Float4Array,
            Oid::FLOAT8_ARRAY => WireType::Float8Array,
            Oid::TEXT_ARRAY => WireType::TextArray,
            Oid::VARCHAR_ARRAY => WireType::VarcharArray,
            Oid::TIMESTAMP_ARRAY => WireType::TimestampArray,
            Oid::TIMESTAMPTZ_ARRAY => WireType::TimestampTzArray,
            _ => return None,
        };
        Some(ty)
    }

    /// Payload width for fixed-width scalars, `None` for everything else.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            WireType::Bool => Some(1),
            WireType::Int2 => Some(2),
            WireType::Int4 | WireType::Oid | WireType::Float4 | WireType::Date => Some(4),
            WireType::Int8 | WireType::Float8 | WireType::Timestamp | WireType::TimestampTz => {
                Some(8)
            }
            _ => None,
        }
    }

    /// Element type of an array type.
    pub fn element(self) -> Option<WireType> {
        match self {
            WireType::BoolArray => Some(WireType::Bool),
            WireType::Int2Array => Some(WireType::Int2),
            WireType::Int4Array => Some(WireType::Int4),
            WireType::Int8Array => Some(WireType::Int8),
            WireType::Float4Array => Some(WireType::Float4),
            WireType::Float8Array => Some(WireType::Float8),
            WireType::TextArray => Some(WireType::Text),
            WireType::VarcharArray => Some(WireType::Varchar),
            WireType::TimestampArray => Some(WireType::Timestamp),
            WireType::TimestampTzArray => Some(WireType::TimestampTz),
            _ => None,
        }
    }

    pub fn is_array(self) -> bool {
        self.element().is_some()
    }

    pub fn name(self) -> &'static str {
        match self {
            WireType::Bool => "bool",
            WireType::Bytea => "bytea",
            WireType::Int2 => "int2",
            WireType::Int4 => "int4",
            WireType::Int8 => "int8",
            WireType::Oid => "oid",
            WireType::Float4 => "float4",
            WireType::Float8 => "float8",
            WireType::Text => "text",
            WireType::Varchar => "varchar",
            WireType::Date => "date",
            WireType::Timestamp => "timestamp",
            WireType::TimestampTz => "timestamptz",
            WireType::BoolArray => "bool[]",
            WireType::Int2Array => "int2[]",
            WireType::Int4Array => "int4[]",
            WireType::Int8Array => "int8[]",
            WireType::Float4Array => "float4[]",
            WireType::Float8Array => "float8[]",
            WireType::TextArray => "text[]",
            WireType::VarcharArray => "varchar[]",
            WireType::TimestampArray => "timestamp[]",
            WireType::TimestampTzArray => "timestamptz[]",
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<WireType> for Oid {
    fn from(ty: WireType) -> Self {
        ty.oid()
    }
}

// ============================================================================
// PostgreSQL Values
// ============================================================================

/// A PostgreSQL value with type information.
///
/// Used by the default type-switch parameter path and for decoding columns
/// whose type is only known at runtime.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PgValue {
    #[default]
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Oid(Oid),
    Float4(f32),
    Float8(f64),
    Text(String),
    Bytea(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    BoolArray(Vec<bool>),
    Int2Array(Vec<i16>),
    Int4Array(Vec<i32>),
    Int8Array(Vec<i64>),
    Float4Array(Vec<f32>),
    Float8Array(Vec<f64>),
    TextArray(Vec<String>),
    TimestampArray(Vec<NaiveDateTime>),
    TimestampTzArray(Vec<DateTime<Utc>>),
    // For types we don't handle specially - store raw bytes
    Raw { oid: Oid, data: Vec<u8> },
}

impl PgValue {
    /// Check if this value is NULL
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    /// Get the OID for this value's type
    pub fn type_oid(&self) -> Oid {
        match self {
            PgValue::Null => Oid(0), // unspecified, the server infers it
            PgValue::Bool(_) => Oid::BOOL,
            PgValue::Int2(_) => Oid::INT2,
            PgValue::Int4(_) => Oid::INT4,
            PgValue::Int8(_) => Oid::INT8,
            PgValue::Oid(_) => Oid::OID,
            PgValue::Float4(_) => Oid::FLOAT4,
            PgValue::Float8(_) => Oid::FLOAT8,
            PgValue::Text(_) => Oid::TEXT,
            PgValue::Bytea(_) => Oid::BYTEA,
            PgValue::Date(_) => Oid::DATE,
            PgValue::Timestamp(_) => Oid::TIMESTAMP,
            PgValue::TimestampTz(_) => Oid::TIMESTAMPTZ,
            PgValue::BoolArray(_) => Oid::BOOL_ARRAY,
            PgValue::Int2Array(_) => Oid::INT2_ARRAY,
            PgValue::Int4Array(_) => Oid::INT4_ARRAY,
            PgValue::Int8Array(_) => Oid::INT8_ARRAY,
            PgValue::Float4Array(_) => Oid::FLOAT4_ARRAY,
            PgValue::Float8Array(_) => Oid::FLOAT8_ARRAY,
            PgValue::TextArray(_) => Oid::TEXT_ARRAY,
            PgValue::TimestampArray(_) => Oid::TIMESTAMP_ARRAY,
            PgValue::TimestampTzArray(_) => Oid::TIMESTAMPTZ_ARRAY,
            PgValue::Raw { oid, .. } => *oid,
        }
    }

    /// Append this value as one framed binary field. `Null` is written as
    /// length -1 with no payload.
    pub fn encode(&self, buf: &mut WriteBuf) {
        match self {
            PgValue::Null => buf.put_i32(-1),
            PgValue::Bool(v) => v.encode(buf),
            PgValue::Int2(v) => v.encode(buf),
            PgValue::Int4(v) => v.encode(buf),
            PgValue::Int8(v) => v.encode(buf),
            PgValue::Oid(v) => v.encode(buf),
            PgValue::Float4(v) => v.encode(buf),
            PgValue::Float8(v) => v.encode(buf),
            PgValue::Text(v) => v.encode(buf),
            PgValue::Bytea(v) => v.as_slice().encode(buf),
            PgValue::Date(v) => v.encode(buf),
            PgValue::Timestamp(v) => v.encode(buf),
            PgValue::TimestampTz(v) => v.encode(buf),
            PgValue::BoolArray(v) => v.encode(buf),
            PgValue::Int2Array(v) => v.encode(buf),
            PgValue::Int4Array(v) => v.encode(buf),
            PgValue::Int8Array(v) => v.encode(buf),
            PgValue::Float4Array(v) => v.encode(buf),
            PgValue::Float8Array(v) => v.encode(buf),
            PgValue::TextArray(v) => v.encode(buf),
            PgValue::TimestampArray(v) => v.encode(buf),
            PgValue::TimestampTzArray(v) => v.encode(buf),
            PgValue::Raw { data, .. } => data.as_slice().encode(buf),
        }
    }

    /// Decode a binary field whose type is given by `oid`.
    ///
    /// A NULL field decodes to `Null`; unknown types keep their raw bytes.
    /// Decode failures are latched on the reader like any other decode.
    pub fn decode(oid: Oid, vr: &mut ValueReader<'_>) -> Self {
        if vr.is_null() {
            return PgValue::Null;
        }
        let Some(ty) = WireType::from_oid(oid) else {
            return PgValue::Raw {
                oid,
                data: decode::raw(vr),
            };
        };

        match ty {
            WireType::Bool => PgValue::Bool(vr.read()),
            WireType::Bytea => PgValue::Bytea(vr.read()),
            WireType::Int2 => PgValue::Int2(vr.read()),
            WireType::Int4 => PgValue::Int4(vr.read()),
            WireType::Int8 => PgValue::Int8(vr.read()),
            WireType::Oid => PgValue::Oid(vr.read()),
            WireType::Float4 => PgValue::Float4(vr.read()),
            WireType::Float8 => PgValue::Float8(vr.read()),
            WireType::Text | WireType::Varchar => PgValue::Text(vr.read()),
            WireType::Date => PgValue::Date(vr.read()),
            WireType::Timestamp => PgValue::Timestamp(vr.read()),
            WireType::TimestampTz => PgValue::TimestampTz(vr.read()),
            WireType::BoolArray => PgValue::BoolArray(vr.read()),
            WireType::Int2Array => PgValue::Int2Array(vr.read()),
            WireType::Int4Array => PgValue::Int4Array(vr.read()),
            WireType::Int8Array => PgValue::Int8Array(vr.read()),
            WireType::Float4Array => PgValue::Float4Array(vr.read()),
            WireType::Float8Array => PgValue::Float8Array(vr.read()),
            WireType::TextArray | WireType::VarcharArray => PgValue::TextArray(vr.read()),
            WireType::TimestampArray => PgValue::TimestampArray(vr.read()),
            WireType::TimestampTzArray => PgValue::TimestampTzArray(vr.read()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_wire_type_mapping() {
        assert_eq!(WireType::from_oid(Oid::INT4), Some(WireType::Int4));
        assert_eq!(WireType::from_oid(Oid::VARCHAR_ARRAY), Some(WireType::VarcharArray));
        assert_eq!(WireType::from_oid(Oid(2950)), None);

        assert_eq!(WireType::Float4Array.oid(), Oid::FLOAT4_ARRAY);
        assert_eq!(WireType::Float4Array.element(), Some(WireType::Float4));
        assert!(!WireType::Bytea.is_array());
        assert_eq!(WireType::TimestampTz.fixed_width(), Some(8));
        assert_eq!(WireType::Text.fixed_width(), None);
    }

    #[test]
    fn test_y2k_offset_matches_calendar() {
        let y2k = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(y2k.timestamp_micros(), MICROS_FROM_UNIX_EPOCH_TO_Y2K);

        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(chrono::Datelike::num_days_from_ce(&date), DAYS_FROM_CE_TO_Y2K);
    }

    #[test]
    fn test_null_encodes_as_minus_one() {
        let mut buf = WriteBuf::new();
        PgValue::Null.encode(&mut buf);
        assert_eq!(buf.as_slice(), &[0xFF, 0xFF, 0xFF, 0xFF]);
    }
}
