//! Error and Result types.

use std::io;

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Convenience alias for a boxed error cause.
pub type BoxDynError = Box<dyn std::error::Error + Send + Sync + 'static>;

// SQLSTATE prefixes the server is known to emit, and the kind each one maps
// to. Anything else becomes `Operational`.
//
//   42S02  no such table
//   40002  INSERT INTO: UNIQUE constraint violated
//   2D000  COMMIT: failed
//   40000  DROP TABLE: FOREIGN KEY constraint violated
//   M0M29  the code monetdb emitted before Jun2020
const INTEGRITY_STATES: [&[u8; 5]; 4] = [b"40002", b"2D000", b"40000", b"M0M29"];

/// A generic error that represents all the ways a method can fail inside the
/// MAPI client core.
///
/// The variants mirror the classic database-API error taxonomy: server errors
/// are classified by their 5-character SQLSTATE prefix, client-side failures
/// pick the kind that describes who is at fault.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error communicating with the server.
    #[error("error communicating with the server: {0}")]
    Io(#[from] io::Error),

    /// An error occurred while setting up or verifying the TLS session.
    #[error("TLS error: {0}")]
    Tls(#[source] BoxDynError),

    /// The connection was used in a way the transport cannot support, e.g.
    /// the server hung up mid-message.
    #[error("interface error: {0}")]
    Interface(String),

    /// An error related to the operation of the server or the network.
    #[error("operational error: {0}")]
    Operational(String),

    /// An error reported by the server during the login exchange.
    #[error("database error: {0}")]
    Database(String),

    /// The caller or the peer violated the protocol.
    #[error("programming error: {0}")]
    Programming(String),

    /// A constraint violation reported by the server.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// An invariant of this library was broken. This is always a bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// The server requires a feature this client does not implement.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The server sent data the client could not make sense of.
    #[error("data error: {0}")]
    Data(String),

    /// A non-fatal warning.
    #[error("warning: {0}")]
    Warning(String),

    /// The connection options are inconsistent or incomplete.
    #[error("configuration error: {0}")]
    Configuration(#[source] BoxDynError),
}

impl Error {
    /// Classify an error string reported by the server (the text after the
    /// leading `!`) into the matching error kind.
    ///
    /// A `SQLException:` prefix inserted by some server components is
    /// stripped first. The remaining message is matched on its 5-character
    /// SQLSTATE prefix; unknown states are operational errors.
    pub fn from_server(message: &str) -> Error {
        let mut msg = message;

        if msg.starts_with("SQLException:") {
            if let Some(idx) = msg.get(14..).and_then(|s| s.find(':')).map(|i| i + 14) {
                msg = msg.get(idx + 10..).unwrap_or("");
            }
        }

        if msg.len() > 5 {
            let state: &[u8] = &msg.as_bytes()[..5];
            if INTEGRITY_STATES.iter().any(|s| &s[..] == state) {
                return Error::Integrity(msg.to_owned());
            }
        }

        Error::Operational(msg.to_owned())
    }

    pub(crate) fn tls(err: impl Into<BoxDynError>) -> Error {
        Error::Tls(err.into())
    }

    pub(crate) fn config(err: impl Into<BoxDynError>) -> Error {
        Error::Configuration(err.into())
    }
}
