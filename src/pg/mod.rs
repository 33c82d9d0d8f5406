//! PostgreSQL wire protocol implementation.
//!
//! This module provides:
//! - Binary encoders and decoders for the supported scalar and array types
//! - A raw execution path driven by caller-supplied parameter encoders
//! - Streaming row cursors with deferred errors
//!
//! Architecture:
//! - `buffer`: Outbound message framing
//! - `reader`: Field cursor and sticky decode error
//! - `decode` / `encode` / `array`: Per-type binary codecs
//! - `types`: Type identifiers and dynamic values
//! - `protocol`: Frontend and backend message formats
//! - `statement`: Prepared statement cache
//! - `params`: Parameter encoders for Bind
//! - `connection`: Startup, framing and asynchronous messages
//! - `raw`: Exec and query drivers
//! - `rows`: Row cursor and single-row wrapper

pub mod array;
pub mod buffer;
pub mod connection;
pub mod decode;
pub mod encode;
pub mod error;
pub mod params;
pub mod protocol;
pub mod raw;
pub mod reader;
pub mod rows;
pub mod statement;
pub mod types;


pub use buffer::WriteBuf;
pub use connection::{Notification, PgConfig, PgConnection};
pub use decode::Decode;
pub use encode::Encode;
pub use error::{DecodeError, PgError, PgResult};
pub use params::{NoParams, ParamEncoder, ValueParams};
pub use protocol::{FieldDescription, Format, TransactionStatus};
pub use raw::{CommandTag, Completion};
pub use reader::{DecodeContext, ValueReader};
pub use rows::{Row, Rows};
pub use statement::{PreparedStatement, SharedColumns, StatementCache};
pub use types::{Oid, PgValue, WireType};
