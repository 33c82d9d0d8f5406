//! Streaming row cursor.
//!
//! A [`Rows`] is returned by every query call, even one that failed to
//! start. In that case it holds the error and hands it out from the first
//! [`Rows::next`], so callers check once instead of at every step.
//!
//! Column values are read in order through a [`ValueReader`]. Decode
//! failures within a row latch on the cursor's [`DecodeContext`]; an
//! undrained failure stops the cursor at the next call to `next`.

use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::connection::PgConnection;
use super::decode::Decode;
use super::error::{DecodeError, PgError, PgResult};
use super::protocol::{BackendMessage, FieldDescription, RowValues};
use super::raw::CommandTag;
use super::reader::{DecodeContext, ValueReader};
use super::statement::SharedColumns;
use super::types::{Oid, PgValue};

/// Cursor over the rows of one query.
///
/// Holds the connection exclusively until the server reports
/// ReadyForQuery. Dropping it earlier is allowed: the connection discards
/// the rest of the response before its next request.
pub struct Rows<'c, S = TcpStream> {
    conn: &'c mut PgConnection<S>,
    sql: String,
    fields: SharedColumns,
    err: Option<PgError>,
    values: RowValues,
    column: usize,
    ctx: DecodeContext,
    tag: CommandTag,
    done: bool,
    start: Instant,
    rows: u64,
}

impl<'c, S> Rows<'c, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(super) fn new(
        conn: &'c mut PgConnection<S>,
        sql: &str,
        fields: SharedColumns,
        start: Instant,
    ) -> Self {
        conn.busy = true;
        Self {
            conn,
            sql: sql.to_string(),
            fields,
            err: None,
            values: RowValues::new(),
            column: 0,
            ctx: DecodeContext::new(),
            tag: CommandTag::default(),
            done: false,
            start,
            rows: 0,
        }
    }

    /// A cursor that yields `err` on first access.
    pub(super) fn failed(
        conn: &'c mut PgConnection<S>,
        sql: &str,
        start: Instant,
        err: PgError,
    ) -> Self {
        tracing::error!(sql, error = %err, "query");
        Self {
            conn,
            sql: sql.to_string(),
            fields: SharedColumns::default(),
            err: Some(err),
            values: RowValues::new(),
            column: 0,
            ctx: DecodeContext::new(),
            tag: CommandTag::default(),
            done: true,
            start,
            rows: 0,
        }
    }

    /// Advance to the next row. `Ok(false)` once the result is exhausted.
    ///
    /// A server error reported mid-stream is returned after the remaining
    /// response has been drained. A decode error left undrained on the
    /// previous row ends iteration the same way.
    pub async fn next(&mut self) -> PgResult<bool> {
        if let Some(e) = self.err.take() {
            return Err(e);
        }
        if self.done {
            return Ok(false);
        }

        let mut pending: Option<PgError> = self.ctx.take_err().map(PgError::Decode);
        self.values.clear();
        self.column = 0;

        loop {
            let (tag, body) = match self.conn.receive_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    self.done = true;
                    tracing::error!(sql = %self.sql, error = %e, "query");
                    return Err(e);
                }
            };

            let msg = match BackendMessage::parse(tag, body) {
                Ok(msg) => msg,
                Err(e) => {
                    pending.get_or_insert(e);
                    continue;
                }
            };

            match msg {
                BackendMessage::DataRow { values } => {
                    if pending.is_none() {
                        self.values = values;
                        self.rows += 1;
                        return Ok(true);
                    }
                }
                BackendMessage::CommandComplete { tag } => self.tag = CommandTag::from(tag),
                BackendMessage::ReadyForQuery { status } => {
                    self.conn.transaction_status = status;
                    return self.finish(pending);
                }
                BackendMessage::RowDescription { .. } | BackendMessage::BindComplete => {}
                other => {
                    if let Err(e) = self.conn.handle_context_free(other) {
                        pending.get_or_insert(e);
                    }
                }
            }
        }
    }

    fn finish(&mut self, pending: Option<PgError>) -> PgResult<bool> {
        self.done = true;
        self.conn.busy = false;
        match pending {
            Some(e) => {
                tracing::error!(sql = %self.sql, error = %e, "query");
                Err(e)
            }
            None => {
                tracing::debug!(
                    sql = %self.sql,
                    rows = self.rows,
                    elapsed = ?self.start.elapsed(),
                    command_tag = %self.tag,
                    "query"
                );
                Ok(false)
            }
        }
    }

    /// Cursor over the next column of the current row.
    ///
    /// Past the last column this latches [`DecodeError::ColumnOutOfRange`].
    pub fn next_column(&mut self) -> Option<ValueReader<'_>> {
        let Some(value) = self.values.get(self.column) else {
            self.ctx.fail(DecodeError::ColumnOutOfRange(self.column));
            return None;
        };
        self.column += 1;
        Some(self.ctx.reader(value.as_deref()))
    }

    /// Decode the next column, leaving any error latched on the cursor.
    pub fn read<T: Decode>(&mut self) -> T {
        match self.next_column() {
            Some(mut vr) => vr.read(),
            None => T::default(),
        }
    }

    /// Decode the next column, returning its error (or one latched by an
    /// earlier [`read`](Self::read)) immediately.
    pub fn decode<T: Decode>(&mut self) -> Result<T, DecodeError> {
        let v = self.read();
        match self.ctx.take_err() {
            Some(e) => Err(e),
            None => Ok(v),
        }
    }

    /// Decode the next column by its declared type.
    pub fn read_value(&mut self) -> PgValue {
        let oid = self
            .fields
            .get(self.column)
            .map_or(Oid::TEXT, |f| f.type_oid);
        match self.next_column() {
            Some(mut vr) => PgValue::decode(oid, &mut vr),
            None => PgValue::Null,
        }
    }

    /// Drain the decode error latched while reading the current row.
    pub fn take_decode_error(&mut self) -> Option<DecodeError> {
        self.ctx.take_err()
    }

    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Raw values of the current row.
    pub fn values(&self) -> &RowValues {
        &self.values
    }

    /// Completion tag, available once `next` has returned `Ok(false)`.
    pub fn command_tag(&self) -> &CommandTag {
        &self.tag
    }

    /// The error this cursor will return from its next `next`, if any.
    pub fn err(&self) -> Option<&PgError> {
        self.err.as_ref()
    }

    /// Discard the remaining rows and return the completion tag.
    pub async fn close(&mut self) -> PgResult<CommandTag> {
        self.ctx.take_err();
        while self.next().await? {}
        Ok(self.tag.clone())
    }
}

/// The first row of a query, read with [`scan`](Row::scan).
///
/// Errors from starting the query are held until `scan`.
pub struct Row<'c, S = TcpStream> {
    rows: Rows<'c, S>,
}

impl<'c, S> Row<'c, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(super) fn new(rows: Rows<'c, S>) -> Self {
        Self { rows }
    }

    /// Read the first row with `f`, then discard the rest of the result.
    ///
    /// Returns [`PgError::NoRows`] for an empty result, and any decode error
    /// `f` left latched on the cursor.
    pub async fn scan<T, F>(mut self, f: F) -> PgResult<T>
    where
        F: FnOnce(&mut Rows<'c, S>) -> T,
    {
        if !self.rows.next().await? {
            return Err(PgError::NoRows);
        }
        let value = f(&mut self.rows);
        let decode_err = self.rows.take_decode_error();
        self.rows.close().await?;
        match decode_err {
            Some(e) => Err(e.into()),
            None => Ok(value),
        }
    }
}
