//! Error types for EmberDB
//!
//! One unified error enum covers every layer. The protocol layer translates
//! each variant into its RESP wire form (see `reply_prefix` for the exact
//! first line); everything below the protocol layer propagates variants
//! with `?` and never formats wire text itself.
//!
//! Two variants have special handling rules:
//! - `Wal` is the only class that forces silent in-memory rollback: the
//!   engine never applies a mutation whose WAL append failed.
//! - `Corruption` is recovered transparently during replay (truncate the
//!   log at the last good offset and continue); it never reaches a client.

use std::io;
use thiserror::Error;

/// Result type alias for EmberDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the engine and protocol layers
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed RESP frame; the connection is closed
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Well-formed frame, unrecognized or misused command
    #[error("{0}")]
    Syntax(String),

    /// Operation applied to a key holding the wrong type
    #[error("operation against a key holding the wrong kind of value")]
    WrongType,

    /// Numeric parse failure on an integer argument or stored value
    #[error("value is not an integer or out of range")]
    NotInteger,

    /// Numeric parse failure on a float argument or stored value
    #[error("value is not a valid float")]
    NotFloat,

    /// RENAME/LSET against an absent key
    #[error("no such key")]
    NoSuchKey,

    /// LSET index outside the list bounds
    #[error("index out of range")]
    IndexOutOfRange,

    /// Command issued before authentication on a protected server
    #[error("authentication required")]
    NoAuth,

    /// AUTH with a bad password or unknown/disabled user
    #[error("invalid username-password pair or user is disabled")]
    WrongPass,

    /// Command denied by the client's ACL
    #[error("no permission: {0}")]
    NoPerm(String),

    /// Per-client token bucket exhausted
    #[error("rate limit exceeded")]
    RateLimited,

    /// WAL append or fsync failed; the mutation was not applied
    #[error("wal write failed: {0}")]
    Wal(#[source] io::Error),

    /// Corrupt bytes detected while scanning the WAL
    #[error("corruption: {0}")]
    Corruption(String),

    /// Socket or file I/O failure outside the WAL append path
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// EXEC refused because a queued command failed to parse
    #[error("transaction discarded because of previous errors")]
    ExecAborted,
}

impl Error {
    /// Shorthand for the common arity failure
    pub fn wrong_arity(cmd: &str) -> Self {
        Error::Syntax(format!("wrong number of arguments for '{}' command", cmd))
    }

    /// The full RESP error line for this error, without the leading `-`
    /// or trailing CRLF. Wordings match the conventional Redis replies.
    pub fn reply_line(&self) -> String {
        match self {
            Error::Protocol(msg) => format!("ERR Protocol error: {}", msg),
            Error::Syntax(msg) => format!("ERR {}", msg),
            Error::WrongType => {
                "WRONGTYPE Operation against a key holding the wrong kind of value".to_string()
            }
            Error::NotInteger => "ERR value is not an integer or out of range".to_string(),
            Error::NotFloat => "ERR value is not a valid float".to_string(),
            Error::NoSuchKey => "ERR no such key".to_string(),
            Error::IndexOutOfRange => "ERR index out of range".to_string(),
            Error::NoAuth => "NOAUTH Authentication required.".to_string(),
            Error::WrongPass => {
                "WRONGPASS invalid username-password pair or user is disabled.".to_string()
            }
            Error::NoPerm(msg) => format!("NOPERM {}", msg),
            Error::RateLimited => "ERR rate limit exceeded".to_string(),
            Error::Wal(_) => "ERR internal error".to_string(),
            Error::Corruption(msg) => format!("ERR corrupted state: {}", msg),
            Error::Io(e) => format!("ERR i/o error: {}", e),
            Error::ExecAborted => {
                "EXECABORT Transaction discarded because of previous errors.".to_string()
            }
        }
    }

    /// Whether this error must tear down the connection rather than be
    /// reported as an error reply.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Io(_))
    }
}
