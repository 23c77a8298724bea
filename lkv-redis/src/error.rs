//! # Error Taxonomy
//!
//! Purpose: Define the closed set of failures surfaced by the async client.
//!
//! ## Design Principles
//! 1. **Tagged Variants**: One enum per concern, matched exhaustively by callers.
//! 2. **Typed Failures**: Errors travel through completion handles, never panics.
//! 3. **Fatal vs Recoverable**: Protocol drift is fatal; type mismatches are not.

use thiserror::Error;

/// Result type for the async client.
pub type RedisResult<T> = Result<T, RedisError>;

/// Errors surfaced by the async client.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Socket or connection-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Reply framing the parser does not recognize. Fatal: the wire parser
    /// and the reply model have drifted out of sync and the connection is
    /// torn down.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A typed accessor was invoked on the wrong reply kind. Recoverable.
    #[error("type error: {0}")]
    Type(String),
    /// Subscription lifecycle precondition violation.
    #[error("subscription error: {0}")]
    Subscription(#[from] SubscriptionError),
    /// The operation requires an established connection.
    #[error("not connected")]
    NotConnected,
    /// The connection was torn down while the operation was in flight.
    #[error("connection lost")]
    ConnectionLost,
}

/// Subscription lifecycle errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The handler has already been released.
    #[error("subscription is not active")]
    NotActive,
    /// Another caller already won the stop race.
    #[error("subscription is already stopping")]
    AlreadyStopping,
    /// The connection already hosts a live subscription.
    #[error("connection already hosts a live subscription")]
    AlreadySubscribed,
}

impl RedisError {
    /// True when the error signals an unrecoverable connection state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RedisError::Io(_) | RedisError::Protocol(_) | RedisError::ConnectionLost
        )
    }
}
