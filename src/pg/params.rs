//! Parameter encoders for the Bind message.
//!
//! The driver writes the Bind envelope and the counts; an encoder fills in
//! the per-parameter format codes and the framed values. The driver checks
//! afterwards that exactly one code and one value were written per
//! parameter the statement declares.

use super::buffer::WriteBuf;
use super::error::{PgError, PgResult};
use super::protocol::Format;
use super::statement::PreparedStatement;
use super::types::{Oid, PgValue};

/// Encodes the parameters of one Bind message.
///
/// Encoders are borrowed across the awaits of a request, so they must be
/// `Sync` for the request future to be `Send`.
pub trait ParamEncoder: Sync {
    /// Write one 2-byte format code per parameter.
    fn encode_param_formats(&self, stmt: &PreparedStatement, buf: &mut WriteBuf) -> PgResult<()>;

    /// Write one framed value per parameter.
    fn encode_params(&self, stmt: &PreparedStatement, buf: &mut WriteBuf) -> PgResult<()>;
}

/// Encoder for statements without parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParams;

impl ParamEncoder for NoParams {
    fn encode_param_formats(&self, _: &PreparedStatement, _: &mut WriteBuf) -> PgResult<()> {
        Ok(())
    }

    fn encode_params(&self, _: &PreparedStatement, _: &mut WriteBuf) -> PgResult<()> {
        Ok(())
    }
}

/// The default encoder: every value in binary format, chosen by its variant.
#[derive(Debug, Clone, Copy)]
pub struct ValueParams<'a>(pub &'a [PgValue]);

impl ValueParams<'_> {
    /// One value per parameter, each sent as the type the statement was
    /// prepared with. A statement cached for the same SQL may have been
    /// prepared from values of other types.
    fn check(&self, stmt: &PreparedStatement) -> PgResult<()> {
        if self.0.len() != stmt.param_count() {
            return Err(PgError::Encode(format!(
                "statement {} expects {} parameters, got {}",
                stmt.name,
                stmt.param_count(),
                self.0.len()
            )));
        }
        for (i, (value, &declared)) in self.0.iter().zip(&stmt.param_types).enumerate() {
            if value.is_null() || declared == Oid(0) {
                continue;
            }
            let sent = value.type_oid();
            if !same_representation(sent, declared) {
                return Err(PgError::Encode(format!(
                    "statement {} parameter ${} has type {}, got a value of type {}",
                    stmt.name,
                    i + 1,
                    declared.0,
                    sent.0
                )));
            }
        }
        Ok(())
    }
}

/// Whether a value encoded as `sent` can be bound to a parameter of type
/// `declared`. text and varchar share one binary form.
fn same_representation(sent: Oid, declared: Oid) -> bool {
    let canonical = |oid: Oid| match oid {
        Oid::VARCHAR => Oid::TEXT,
        Oid::VARCHAR_ARRAY => Oid::TEXT_ARRAY,
        other => other,
    };
    canonical(sent) == canonical(declared)
}

impl ParamEncoder for ValueParams<'_> {
    fn encode_param_formats(&self, stmt: &PreparedStatement, buf: &mut WriteBuf) -> PgResult<()> {
        self.check(stmt)?;
        for _ in self.0 {
            buf.put_i16(Format::Binary.code());
        }
        Ok(())
    }

    fn encode_params(&self, stmt: &PreparedStatement, buf: &mut WriteBuf) -> PgResult<()> {
        self.check(stmt)?;
        for value in self.0 {
            value.encode(buf);
        }
        Ok(())
    }
}

impl<T: ParamEncoder + ?Sized> ParamEncoder for &T {
    fn encode_param_formats(&self, stmt: &PreparedStatement, buf: &mut WriteBuf) -> PgResult<()> {
        (**self).encode_param_formats(stmt, buf)
    }

    fn encode_params(&self, stmt: &PreparedStatement, buf: &mut WriteBuf) -> PgResult<()> {
        (**self).encode_params(stmt, buf)
    }
}
