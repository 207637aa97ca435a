//! # tds-client
//!
//! Async TDS client for Sybase and Microsoft SQL Server.
//!
//! A [`Client`] owns one connection and runs one statement at a time:
//! connect and log in, submit a batch or parameterized statement, stream
//! decoded rows from the returned [`QueryStream`], and cancel in-flight
//! work with an out-of-band attention signal.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tds_client::{Client, Config};
//!
//! let config = Config::new("db.example.com")
//!     .credentials("sa", "secret")
//!     .database("inventory");
//!
//! let mut client = Client::connect(config).await?;
//!
//! let mut results = client.query("SELECT id, name FROM parts").await?;
//! while let Some(row) = results.next_row().await? {
//!     println!("{:?} {:?}", row.get(0), row.get(1));
//! }
//! ```
//!
//! A client is not internally concurrent: callers serialize access, or hold
//! one client per worker. The only operation safe to invoke concurrently
//! with a running statement is cancellation through a
//! [`CancelHandle`](tds_frame::CancelHandle) obtained up front.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
mod params;
pub mod row;
pub mod state;

pub use client::Client;
pub use config::{Config, TimeoutConfig};
pub use cursor::QueryStream;
pub use error::{Error, Result, ServerMessage};
pub use row::{Column, Row};
pub use state::SessionState;

pub use tds_frame::CancelHandle;
pub use tds_values::SqlValue;
