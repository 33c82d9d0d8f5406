//! Query execution with caller-supplied parameter encoders.
//!
//! The `*_raw` entry points take any [`ParamEncoder`], bypassing the default
//! [`ValueParams`] path that [`exec`](PgConnection::exec) and
//! [`query`](PgConnection::query) use.
//!
//! Extended queries go out as one write: Close for any evicted statements,
//! Bind, Execute (no row limit), Sync. Responses are read until
//! ReadyForQuery no matter what fails in between, so the stream stays in
//! step with the server.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};

use super::buffer::WriteBuf;
use super::connection::PgConnection;
use super::error::{PgError, PgResult};
use super::params::{NoParams, ParamEncoder, ValueParams};
use super::protocol::{
    BackendMessage, ExecuteMessage, FrontendMessage, QueryMessage, SyncMessage,
};
use super::rows::{Row, Rows};
use super::statement::PreparedStatement;
use super::types::{Oid, PgValue};

/// Completion string of a command, e.g. `INSERT 0 1`. Empty until the
/// server reports completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTag(String);

impl CommandTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Row count from the tag's last word; 0 for tags without one.
    pub fn rows_affected(&self) -> u64 {
        self.0
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CommandTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

/// Outcome of reading one request's responses up to ReadyForQuery.
#[derive(Debug)]
pub struct Completion {
    /// Tag from the last CommandComplete seen.
    pub tag: CommandTag,
    /// First non-fatal error seen while draining.
    pub soft_error: Option<PgError>,
}

impl Completion {
    pub fn into_result(self) -> PgResult<CommandTag> {
        match self.soft_error {
            Some(e) => Err(e),
            None => Ok(self.tag),
        }
    }
}

impl<S> PgConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Execute `sql`, discarding any rows.
    ///
    /// Without an encoder, SQL that has no prepared statement yet goes out as
    /// a simple query. Otherwise the statement is prepared if needed and bound
    /// with `pe` ([`NoParams`] when `None`).
    pub async fn exec_raw(
        &mut self,
        sql: &str,
        pe: Option<&dyn ParamEncoder>,
    ) -> PgResult<CommandTag> {
        let start = Instant::now();
        self.last_activity = start;

        let result = self.exec_inner(sql, &[], pe).await;
        log_exec(sql, start, &result);
        result
    }

    /// Execute `sql` with `params` in binary format, discarding any rows.
    ///
    /// The statement is prepared with the values' type identifiers; `Null`
    /// leaves its parameter's type to the server.
    pub async fn exec(&mut self, sql: &str, params: &[PgValue]) -> PgResult<CommandTag> {
        let start = Instant::now();
        self.last_activity = start;

        let param_types: Vec<Oid> = params.iter().map(PgValue::type_oid).collect();
        let values = ValueParams(params);
        let pe: Option<&dyn ParamEncoder> = if params.is_empty() {
            None
        } else {
            Some(&values)
        };

        let result = self.exec_inner(sql, &param_types, pe).await;
        log_exec(sql, start, &result);
        result
    }

    async fn exec_inner(
        &mut self,
        sql: &str,
        param_types: &[Oid],
        pe: Option<&dyn ParamEncoder>,
    ) -> PgResult<CommandTag> {
        self.ensure_ready().await?;

        if let Some(stmt) = self.statement_cache.get_and_touch(sql) {
            self.send_prepared(&stmt, pe.unwrap_or(&NoParams)).await?;
        } else if let Some(pe) = pe {
            let stmt = self.prepare(sql, param_types).await?;
            self.send_prepared(&stmt, pe).await?;
        } else {
            self.write_buf.clear();
            QueryMessage { query: sql }.encode(&mut self.write_buf);
            self.send_buffered().await?;
        }

        self.read_until_ready().await?.into_result()
    }

    /// Run `sql` and stream its rows.
    ///
    /// Never fails at call time: if preparing or sending fails, the returned
    /// cursor holds the error and yields it from its first
    /// [`next`](Rows::next).
    pub async fn query_raw(&mut self, sql: &str, pe: &dyn ParamEncoder) -> Rows<'_, S> {
        self.query_inner(sql, &[], pe).await
    }

    /// Run `sql` with `params` in binary format and stream its rows.
    pub async fn query(&mut self, sql: &str, params: &[PgValue]) -> Rows<'_, S> {
        let param_types: Vec<Oid> = params.iter().map(PgValue::type_oid).collect();
        self.query_inner(sql, &param_types, &ValueParams(params)).await
    }

    /// Run `sql` for a single row.
    ///
    /// Like [`query_raw`](Self::query_raw), any failure is deferred to
    /// [`Row::scan`], which also reports [`PgError::NoRows`] for an empty
    /// result.
    pub async fn query_row_raw(&mut self, sql: &str, pe: &dyn ParamEncoder) -> Row<'_, S> {
        Row::new(self.query_inner(sql, &[], pe).await)
    }

    /// [`query_row_raw`](Self::query_row_raw) with `params` in binary format.
    pub async fn query_row(&mut self, sql: &str, params: &[PgValue]) -> Row<'_, S> {
        Row::new(self.query(sql, params).await)
    }

    async fn query_inner(
        &mut self,
        sql: &str,
        param_types: &[Oid],
        pe: &dyn ParamEncoder,
    ) -> Rows<'_, S> {
        let start = Instant::now();
        self.last_activity = start;

        if let Err(e) = self.ensure_ready().await {
            return Rows::failed(self, sql, start, e);
        }

        let stmt = match self.statement_cache.get_and_touch(sql) {
            Some(stmt) => stmt,
            None => match self.prepare(sql, param_types).await {
                Ok(stmt) => stmt,
                Err(e) => return Rows::failed(self, sql, start, e),
            },
        };

        match self.send_prepared(&stmt, pe).await {
            Ok(()) => Rows::new(self, sql, Arc::clone(&stmt.columns), start),
            Err(e) => Rows::failed(self, sql, start, e),
        }
    }

    /// Send Bind, Execute and Sync for `stmt` in one write.
    ///
    /// Encoder failures and count mismatches are reported before anything
    /// is written.
    async fn send_prepared(
        &mut self,
        stmt: &PreparedStatement,
        pe: &dyn ParamEncoder,
    ) -> PgResult<()> {
        self.write_buf.clear();
        self.write_evicted_closes();
        if let Err(e) = write_bind(&mut self.write_buf, stmt, pe) {
            self.write_buf.clear();
            return Err(e);
        }
        ExecuteMessage {
            portal: "",
            max_rows: 0,
        }
        .encode(&mut self.write_buf);
        SyncMessage.encode(&mut self.write_buf);

        self.send_batch().await
    }

    /// Read responses until ReadyForQuery.
    ///
    /// Rows and their descriptions are skipped. The first error from a
    /// message that fails to parse or from the context-free handler becomes
    /// the soft error; reading continues regardless. Only transport failures
    /// end the loop early.
    pub async fn read_until_ready(&mut self) -> PgResult<Completion> {
        let mut tag = CommandTag::default();
        let mut soft_error: Option<PgError> = None;

        loop {
            let (t, body) = self.receive_frame().await?;
            let msg = match BackendMessage::parse(t, body) {
                Ok(msg) => msg,
                Err(e) => {
                    soft_error.get_or_insert(e);
                    continue;
                }
            };

            match msg {
                BackendMessage::ReadyForQuery { status } => {
                    self.transaction_status = status;
                    return Ok(Completion { tag, soft_error });
                }
                BackendMessage::RowDescription { .. }
                | BackendMessage::DataRow { .. }
                | BackendMessage::BindComplete => {}
                BackendMessage::CommandComplete { tag: t } => tag = CommandTag(t),
                other => {
                    if let Err(e) = self.handle_context_free(other) {
                        soft_error.get_or_insert(e);
                    }
                }
            }
        }
    }
}

/// Append a Bind message for `stmt` with parameters from `pe`.
///
/// The encoder must write exactly one format code and one framed value per
/// declared parameter.
pub(crate) fn write_bind(
    buf: &mut WriteBuf,
    stmt: &PreparedStatement,
    pe: &dyn ParamEncoder,
) -> PgResult<()> {
    let argc = stmt.param_count();
    let count = i16::try_from(argc)
        .map_err(|_| PgError::Encode(format!("too many parameters: {}", argc)))?;

    buf.start_msg(b'B');
    buf.put_cstr(""); // unnamed portal
    buf.put_cstr(&stmt.name);

    buf.put_i16(count);
    let start = buf.len();
    pe.encode_param_formats(stmt, buf)?;
    let written = buf.len() - start;
    if written != argc * 2 {
        return Err(PgError::Encode(format!(
            "statement {} has {} parameters but {} bytes of format codes were written",
            stmt.name, argc, written
        )));
    }

    buf.put_i16(count);
    let start = buf.len();
    pe.encode_params(stmt, buf)?;
    match count_fields(buf.since(start)) {
        Some(n) if n == argc => {}
        Some(n) => {
            return Err(PgError::Encode(format!(
                "statement {} has {} parameters but {} values were written",
                stmt.name, argc, n
            )))
        }
        None => {
            return Err(PgError::Encode(format!(
                "malformed parameter values for statement {}",
                stmt.name
            )))
        }
    }

    let columns = i16::try_from(stmt.columns.len()).map_err(|_| {
        PgError::Encode(format!("too many result columns: {}", stmt.columns.len()))
    })?;
    buf.put_i16(columns);
    for format in stmt.result_formats() {
        buf.put_i16(format.code());
    }
    buf.close_msg();
    Ok(())
}

/// Number of length-prefixed fields in `bytes`, or `None` if a declared
/// length runs past the end.
fn count_fields(mut bytes: &[u8]) -> Option<usize> {
    let mut n = 0;
    while !bytes.is_empty() {
        let (len, rest) = bytes.split_first_chunk::<4>()?;
        let len = i32::from_be_bytes(*len);
        bytes = if len < 0 { rest } else { rest.get(len as usize..)? };
        n += 1;
    }
    Some(n)
}

fn log_exec(sql: &str, start: Instant, result: &PgResult<CommandTag>) {
    match result {
        Ok(tag) => tracing::info!(
            sql,
            elapsed = ?start.elapsed(),
            command_tag = %tag,
            "exec"
        ),
        Err(e) => tracing::error!(sql, error = %e, "exec"),
    }
}
