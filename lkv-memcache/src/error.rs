//! Errors surfaced by the sync memcache client.

use thiserror::Error;

/// Result type for the sync client.
pub type MemcacheResult<T> = Result<T, MemcacheError>;

#[derive(Debug, Error)]
pub enum MemcacheError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The server-list configuration is malformed or empty.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// No configured server accepted the connection, or the client is not
    /// connected.
    #[error("connection error: {0}")]
    Connection(String),
    /// `connect()` was called on an already-connected client.
    #[error("client is already connected")]
    AlreadyConnected,
    /// The server sent a response outside the text protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}
