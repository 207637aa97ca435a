//! # tds-wire
//!
//! Pure implementation of the TDS (Tabular Data Stream) wire protocol used
//! by Sybase and Microsoft SQL Server, dialect TDS 7.x.
//!
//! This crate is intentionally IO-free. It defines packet headers, the
//! pre-login and LOGIN7 handshake payloads, request encodings (SQL batch and
//! RPC), and a lazy parser for the server's response token stream. Higher
//! layers supply the transport and framing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_wire::{Token, TokenParser};
//!
//! let mut parser = TokenParser::new(payload);
//! let mut metadata = None;
//! while let Some(token) = parser.next_token_with_metadata(metadata.as_ref())? {
//!     match token {
//!         Token::ColMetaData(meta) => metadata = Some(meta),
//!         Token::Done(done) => println!("rows: {}", done.row_count),
//!         _ => {}
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod login;
pub mod packet;
pub mod prelogin;
pub mod rpc;
pub mod sql_batch;
pub mod token;
pub mod types;
pub mod version;

pub use error::ProtocolError;
pub use login::{Login7, OptionFlags1, OptionFlags2, OptionFlags3};
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus,
    PacketType,
};
pub use prelogin::{EncryptionLevel, PreLogin};
pub use rpc::{ParamFlags, ProcId, RpcOptionFlags, RpcParam, RpcRequest, RpcTypeInfo};
pub use sql_batch::encode_sql_batch;
pub use token::{
    ColMetaData, Collation, ColumnData, Done, DoneStatus, EnvChange, EnvChangeType,
    EnvChangeValue, LoginAck, NbcRow, RawRow, ServerError, ServerInfo, Token, TokenParser,
    TokenType, TypeInfo,
};
pub use types::TypeId;
pub use version::TdsVersion;
