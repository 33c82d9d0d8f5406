//! PostgreSQL wire protocol message encoding and decoding.
//!
//! This module implements the subset of PostgreSQL v3 protocol messages needed
//! to start a session and drive simple and extended queries.
//! Reference: https://www.postgresql.org/docs/current/protocol-message-formats.html

use bytes::{Buf, Bytes};
use smallvec::SmallVec;
use std::collections::HashMap;

use super::buffer::WriteBuf;
use super::error::{PgError, PgResult};
use super::types::Oid;

// ============================================================================
// Protocol Constants
// ============================================================================

/// PostgreSQL protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 196608; // (3 << 16) | 0

/// Format codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum Format {
    Text = 0,
    Binary = 1,
}

impl Format {
    #[inline]
    pub fn code(self) -> i16 {
        self as i16
    }
}

/// Transaction status indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// Idle (not in a transaction block)
    #[default]
    Idle,
    /// In a transaction block
    InTransaction,
    /// In a failed transaction block
    Failed,
}

impl From<u8> for TransactionStatus {
    fn from(b: u8) -> Self {
        match b {
            b'T' => TransactionStatus::InTransaction,
            b'E' => TransactionStatus::Failed,
            _ => TransactionStatus::Idle,
        }
    }
}

// ============================================================================
// Frontend (Client -> Server) Messages
// ============================================================================

/// A message the client sends. Each message frames itself inside `buf`.
pub trait FrontendMessage {
    fn encode(&self, buf: &mut WriteBuf);
}

/// Startup message sent at connection start
#[derive(Debug, Clone)]
pub struct StartupMessage {
    pub user: String,
    pub database: Option<String>,
    pub options: Vec<(String, String)>,
}

impl FrontendMessage for StartupMessage {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_untagged();
        buf.put_i32(PROTOCOL_VERSION);

        buf.put_cstr("user");
        buf.put_cstr(&self.user);

        if let Some(ref db) = self.database {
            buf.put_cstr("database");
            buf.put_cstr(db);
        }

        for (key, value) in &self.options {
            buf.put_cstr(key);
            buf.put_cstr(value);
        }

        buf.put_u8(0);
        buf.close_msg();
    }
}

/// Password message (for MD5 or plaintext auth)
#[derive(Debug, Clone)]
pub struct PasswordMessage {
    pub password: String,
}

impl FrontendMessage for PasswordMessage {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'p');
        buf.put_cstr(&self.password);
        buf.close_msg();
    }
}

/// Simple query message ('Q')
#[derive(Debug, Clone)]
pub struct QueryMessage<'a> {
    pub query: &'a str,
}

impl FrontendMessage for QueryMessage<'_> {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'Q');
        buf.put_cstr(self.query);
        buf.close_msg();
    }
}

/// Parse message ('P') - Creates a prepared statement
#[derive(Debug, Clone)]
pub struct ParseMessage<'a> {
    pub name: &'a str,
    pub query: &'a str,
    pub param_types: &'a [Oid],
}

impl FrontendMessage for ParseMessage<'_> {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'P');
        buf.put_cstr(self.name);
        buf.put_cstr(self.query);
        buf.put_i16(self.param_types.len() as i16);
        for oid in self.param_types {
            buf.put_u32(oid.as_u32());
        }
        buf.close_msg();
    }
}

/// Execute message ('E') - Executes a bound portal
#[derive(Debug, Clone)]
pub struct ExecuteMessage<'a> {
    pub portal: &'a str,
    /// 0 = no limit
    pub max_rows: i32,
}

impl FrontendMessage for ExecuteMessage<'_> {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'E');
        buf.put_cstr(self.portal);
        buf.put_i32(self.max_rows);
        buf.close_msg();
    }
}

/// Describe message ('D') - Request description of statement or portal
#[derive(Debug, Clone)]
pub struct DescribeMessage<'a> {
    /// 'S' for statement, 'P' for portal
    pub kind: u8,
    pub name: &'a str,
}

impl FrontendMessage for DescribeMessage<'_> {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'D');
        buf.put_u8(self.kind);
        buf.put_cstr(self.name);
        buf.close_msg();
    }
}

/// Close message ('C') - Release a prepared statement or portal
#[derive(Debug, Clone)]
pub struct CloseMessage<'a> {
    /// 'S' for statement, 'P' for portal
    pub kind: u8,
    pub name: &'a str,
}

impl FrontendMessage for CloseMessage<'_> {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'C');
        buf.put_u8(self.kind);
        buf.put_cstr(self.name);
        buf.close_msg();
    }
}

/// Sync message ('S') - Marks end of an extended query
#[derive(Debug, Clone, Copy)]
pub struct SyncMessage;

impl FrontendMessage for SyncMessage {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'S');
        buf.close_msg();
    }
}

/// Terminate message ('X') - Close the connection
#[derive(Debug, Clone, Copy)]
pub struct TerminateMessage;

impl FrontendMessage for TerminateMessage {
    fn encode(&self, buf: &mut WriteBuf) {
        buf.start_msg(b'X');
        buf.close_msg();
    }
}

// ============================================================================
// Backend (Server -> Client) Messages
// ============================================================================

/// Field description in a RowDescription message
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: u32,
    pub column_attr: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: Format,
}

/// Column values of one DataRow; `None` is SQL NULL.
pub type RowValues = SmallVec<[Option<Bytes>; 16]>;

/// Backend message types
#[derive(Debug, Clone)]
pub enum BackendMessage {
    // Authentication
    AuthenticationOk,
    AuthenticationCleartextPassword,
    AuthenticationMD5Password {
        salt: [u8; 4],
    },
    AuthenticationSASL {
        mechanisms: Vec<String>,
    },
    /// Any other authentication request (GSS, SSPI, SASL continuation).
    AuthenticationOther {
        code: i32,
    },

    // Query responses
    RowDescription {
        fields: Vec<FieldDescription>,
    },
    DataRow {
        values: RowValues,
    },
    CommandComplete {
        tag: String,
    },
    EmptyQueryResponse,

    // Extended query protocol
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    PortalSuspended,

    // Status
    ReadyForQuery {
        status: TransactionStatus,
    },
    ParameterStatus {
        name: String,
        value: String,
    },
    BackendKeyData {
        process_id: i32,
        secret_key: i32,
    },

    // Errors and notices
    ErrorResponse {
        fields: HashMap<u8, String>,
    },
    NoticeResponse {
        fields: HashMap<u8, String>,
    },

    // Other
    NotificationResponse {
        process_id: i32,
        channel: String,
        payload: String,
    },
    ParameterDescription {
        type_oids: Vec<Oid>,
    },

    /// A well-framed message this client has no parser for.
    Unknown {
        tag: u8,
        body: Bytes,
    },
}

impl BackendMessage {
    /// Parse the body of a message already split off the stream.
    ///
    /// `body` excludes the tag and length. A body that does not match its
    /// tag's layout is a protocol error; the stream itself stays in sync.
    pub fn parse(tag: u8, body: Bytes) -> PgResult<Self> {
        match tag {
            b'R' => Self::decode_auth(body),
            b'T' => Self::decode_row_description(body),
            b'D' => Self::decode_data_row(body),
            b'C' => Self::decode_command_complete(body),
            b'Z' => Self::decode_ready_for_query(body),
            b'E' => Ok(BackendMessage::ErrorResponse {
                fields: read_error_fields(body)?,
            }),
            b'N' => Ok(BackendMessage::NoticeResponse {
                fields: read_error_fields(body)?,
            }),
            b'S' => Self::decode_parameter_status(body),
            b'K' => Self::decode_backend_key_data(body),
            b'1' => Ok(BackendMessage::ParseComplete),
            b'2' => Ok(BackendMessage::BindComplete),
            b'3' => Ok(BackendMessage::CloseComplete),
            b'I' => Ok(BackendMessage::EmptyQueryResponse),
            b'n' => Ok(BackendMessage::NoData),
            b's' => Ok(BackendMessage::PortalSuspended),
            b't' => Self::decode_parameter_description(body),
            b'A' => Self::decode_notification_response(body),
            _ => Ok(BackendMessage::Unknown { tag, body }),
        }
    }

    fn decode_auth(mut body: Bytes) -> PgResult<Self> {
        let auth_type = get_i32(&mut body, "Authentication")?;

        match auth_type {
            0 => Ok(BackendMessage::AuthenticationOk),
            3 => Ok(BackendMessage::AuthenticationCleartextPassword),
            5 => {
                need(&body, 4, "AuthenticationMD5Password")?;
                let mut salt = [0u8; 4];
                body.copy_to_slice(&mut salt);
                Ok(BackendMessage::AuthenticationMD5Password { salt })
            }
            10 => {
                let mut mechanisms = Vec::new();
                while body.has_remaining() {
                    let mech = read_cstring(&mut body)?;
                    if mech.is_empty() {
                        break;
                    }
                    mechanisms.push(mech);
                }
                Ok(BackendMessage::AuthenticationSASL { mechanisms })
            }
            code => Ok(BackendMessage::AuthenticationOther { code }),
        }
    }

    fn decode_row_description(mut body: Bytes) -> PgResult<Self> {
        let num_fields = get_i16(&mut body, "RowDescription")?.max(0) as usize;
        let mut fields = Vec::with_capacity(num_fields);

        for _ in 0..num_fields {
            let name = read_cstring(&mut body)?;
            need(&body, 18, "RowDescription")?;
            let table_oid = body.get_u32();
            let column_attr = body.get_i16();
            let type_oid = Oid(body.get_u32());
            let type_size = body.get_i16();
            let type_modifier = body.get_i32();
            let format = if body.get_i16() == 0 {
                Format::Text
            } else {
                Format::Binary
            };

            fields.push(FieldDescription {
                name,
                table_oid,
                column_attr,
                type_oid,
                type_size,
                type_modifier,
                format,
            });
        }

        Ok(BackendMessage::RowDescription { fields })
    }

    fn decode_data_row(mut body: Bytes) -> PgResult<Self> {
        let num_cols = get_i16(&mut body, "DataRow")?.max(0) as usize;
        let mut values = RowValues::with_capacity(num_cols);

        for _ in 0..num_cols {
            let len = get_i32(&mut body, "DataRow")?;
            if len < 0 {
                values.push(None);
            } else {
                need(&body, len as usize, "DataRow")?;
                values.push(Some(body.split_to(len as usize)));
            }
        }

        Ok(BackendMessage::DataRow { values })
    }

    fn decode_command_complete(mut body: Bytes) -> PgResult<Self> {
        let tag = read_cstring(&mut body)?;
        Ok(BackendMessage::CommandComplete { tag })
    }

    fn decode_ready_for_query(mut body: Bytes) -> PgResult<Self> {
        need(&body, 1, "ReadyForQuery")?;
        let status = TransactionStatus::from(body.get_u8());
        Ok(BackendMessage::ReadyForQuery { status })
    }

    fn decode_parameter_status(mut body: Bytes) -> PgResult<Self> {
        let name = read_cstring(&mut body)?;
        let value = read_cstring(&mut body)?;
        Ok(BackendMessage::ParameterStatus { name, value })
    }

    fn decode_backend_key_data(mut body: Bytes) -> PgResult<Self> {
        let process_id = get_i32(&mut body, "BackendKeyData")?;
        let secret_key = get_i32(&mut body, "BackendKeyData")?;
        Ok(BackendMessage::BackendKeyData {
            process_id,
            secret_key,
        })
    }

    fn decode_parameter_description(mut body: Bytes) -> PgResult<Self> {
        let num_params = get_i16(&mut body, "ParameterDescription")?.max(0) as usize;
        need(&body, num_params * 4, "ParameterDescription")?;
        let type_oids = (0..num_params).map(|_| Oid(body.get_u32())).collect();
        Ok(BackendMessage::ParameterDescription { type_oids })
    }

    fn decode_notification_response(mut body: Bytes) -> PgResult<Self> {
        let process_id = get_i32(&mut body, "NotificationResponse")?;
        let channel = read_cstring(&mut body)?;
        let payload = read_cstring(&mut body)?;

        Ok(BackendMessage::NotificationResponse {
            process_id,
            channel,
            payload,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn need(buf: &Bytes, n: usize, msg: &str) -> PgResult<()> {
    if buf.remaining() < n {
        return Err(PgError::Protocol(format!(
            "{} message truncated: needed {} bytes, {} remaining",
            msg,
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_i16(buf: &mut Bytes, msg: &str) -> PgResult<i16> {
    need(buf, 2, msg)?;
    Ok(buf.get_i16())
}

fn get_i32(buf: &mut Bytes, msg: &str) -> PgResult<i32> {
    need(buf, 4, msg)?;
    Ok(buf.get_i32())
}

/// Read a null-terminated string from the buffer.
/// Tries direct UTF-8 first and falls back to lossy conversion only if invalid.
pub(crate) fn read_cstring(buf: &mut Bytes) -> PgResult<String> {
    let Some(end) = buf.iter().position(|&b| b == 0) else {
        return Err(PgError::Protocol(
            "Missing null terminator in string".to_string(),
        ));
    };

    let s = std::str::from_utf8(&buf[..end])
        .map(|s| s.to_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&buf[..end]).into_owned());

    buf.advance(end + 1);
    Ok(s)
}

/// Read error/notice response fields
pub(crate) fn read_error_fields(mut body: Bytes) -> PgResult<HashMap<u8, String>> {
    let mut fields = HashMap::new();

    while body.has_remaining() {
        let field_type = body.get_u8();
        if field_type == 0 {
            break;
        }
        let value = read_cstring(&mut body)?;
        fields.insert(field_type, value);
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    fn encoded(msg: &impl FrontendMessage) -> Vec<u8> {
        let mut buf = WriteBuf::new();
        msg.encode(&mut buf);
        buf.finish().to_vec()
    }

    #[test]
    fn test_startup_message_structure() {
        let msg = StartupMessage {
            user: "test".to_string(),
            database: Some("testdb".to_string()),
            options: vec![],
        };

        let encoded = encoded(&msg);

        let len = i32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len as usize, encoded.len());
        assert_eq!(&encoded[4..8], &PROTOCOL_VERSION.to_be_bytes());
        assert_eq!(&encoded[8..], b"user\0test\0database\0testdb\0\0");
    }

    #[test]
    fn test_query_message_structure() {
        let encoded = encoded(&QueryMessage { query: "SELECT 1" });

        assert_eq!(encoded[0], b'Q');

        let len = i32::from_be_bytes([encoded[1], encoded[2], encoded[3], encoded[4]]);
        assert_eq!(len as usize, encoded.len() - 1); // -1 for message type
    }

    #[test]
    fn test_parse_message_oids() {
        let encoded = encoded(&ParseMessage {
            name: "s1",
            query: "SELECT $1",
            param_types: &[Oid::INT8],
        });

        assert_eq!(encoded[0], b'P');
        let tail = &encoded[encoded.len() - 6..];
        assert_eq!(tail, &[0, 1, 0, 0, 0, 20]);
    }

    #[test]
    fn test_sync_and_execute() {
        assert_eq!(encoded(&SyncMessage), [b'S', 0, 0, 0, 4]);
        assert_eq!(
            encoded(&ExecuteMessage {
                portal: "",
                max_rows: 0
            }),
            [b'E', 0, 0, 0, 9, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_close_statement() {
        assert_eq!(
            encoded(&CloseMessage {
                kind: b'S',
                name: "s1"
            }),
            [b'C', 0, 0, 0, 8, b'S', b's', b'1', 0]
        );
    }

    #[test]
    fn test_parse_data_row_with_null() {
        let mut body = BytesMut::new();
        body.put_i16(2);
        body.put_i32(-1);
        body.put_i32(2);
        body.put_slice(&[7, 8]);

        match BackendMessage::parse(b'D', body.freeze()).unwrap() {
            BackendMessage::DataRow { values } => {
                assert_eq!(values.len(), 2);
                assert!(values[0].is_none());
                assert_eq!(values[1].as_deref(), Some(&[7u8, 8][..]));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncated_body_is_error_not_panic() {
        let mut body = BytesMut::new();
        body.put_i16(1);
        body.put_i32(10);
        body.put_slice(&[1, 2]);
        assert!(matches!(
            BackendMessage::parse(b'D', body.freeze()),
            Err(PgError::Protocol(_))
        ));

        assert!(BackendMessage::parse(b'Z', Bytes::new()).is_err());
        assert!(BackendMessage::parse(b'C', Bytes::from_static(b"INSERT")).is_err());
    }

    #[test]
    fn test_unknown_tag_is_kept() {
        let msg = BackendMessage::parse(b'W', Bytes::from_static(b"xyz")).unwrap();
        assert!(matches!(msg, BackendMessage::Unknown { tag: b'W', .. }));
    }

    #[test]
    fn test_error_fields() {
        let body = Bytes::from_static(b"SERROR\0C42P01\0Mrelation does not exist\0\0");
        match BackendMessage::parse(b'E', body).unwrap() {
            BackendMessage::ErrorResponse { fields } => {
                assert_eq!(fields.get(&b'C').map(String::as_str), Some("42P01"));
                assert_eq!(fields.get(&b'S').map(String::as_str), Some("ERROR"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
