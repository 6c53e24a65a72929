//! Client core for the MAPI wire protocol spoken by the MonetDB SQL server.
//!
//! This crate owns the hard, low-level half of a MonetDB client: socket and
//! TLS setup, the chunked block framing, the challenge/response login with
//! its redirect loop, in-band file transfer dispatch, and the mapping of
//! server errors onto an error taxonomy. Result-set decoding and the
//! cursor/pool API are built on top of it and live elsewhere.
//!
//! All I/O is synchronous and blocking. A [`MonetConnection`] is not safe
//! for concurrent use; callers serialize access or open one connection per
//! thread.
//!
//! ```rust,no_run
//! use monetdb_core::{MonetConnectOptions, MonetConnection};
//!
//! # fn main() -> Result<(), monetdb_core::Error> {
//! let mut conn = MonetConnection::establish(
//!     &MonetConnectOptions::new()
//!         .host("localhost")
//!         .user("monetdb")
//!         .password("monetdb")
//!         .database("demo"),
//! )?;
//!
//! let result = conn.cmd("sSELECT 42;")?;
//! # drop(result);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod connection;
mod error;
mod filetransfer;
mod net;
mod options;
mod protocol;

pub use connection::MonetConnection;
pub use error::{BoxDynError, Error, Result};
pub use filetransfer::{FileTransferChannel, FileTransferHandler};
pub use options::{MonetConnectOptions, TlsChecks};
pub use protocol::handshake::HandshakeOption;
pub use protocol::ServerEndian;
