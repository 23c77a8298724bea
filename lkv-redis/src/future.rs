//! # Completion Handles
//!
//! Purpose: Single-assignment result slots binding one in-flight operation to
//! the caller that awaits it.
//!
//! The producer side is always the loop thread; the consumer may be any
//! thread, either awaiting the handle as a future or blocking on `wait()`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{RedisError, RedisResult};
use crate::reply::Reply;

/// Resolves with the client handle once the connection is established.
pub type ConnectFuture = CompletionFuture<crate::client::RedisClient>;
/// Resolves with the typed reply for one sent command.
pub type CommandFuture = CompletionFuture<Reply>;
/// Resolves once connection teardown has finished.
pub type DisconnectFuture = CompletionFuture<()>;

/// A single-assignment asynchronous result slot.
///
/// Dropping the handle abandons the result; the underlying operation still
/// runs to completion.
pub struct CompletionFuture<T> {
    rx: oneshot::Receiver<RedisResult<T>>,
}

impl<T> CompletionFuture<T> {
    /// Creates the producer/consumer pair for one operation.
    pub(crate) fn pair() -> (oneshot::Sender<RedisResult<T>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, CompletionFuture { rx })
    }

    /// Creates a handle that is already resolved.
    pub(crate) fn resolved(result: RedisResult<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        CompletionFuture { rx }
    }

    /// Blocks the calling thread until the result is produced.
    ///
    /// Must not be called from the loop thread.
    pub fn wait(self) -> RedisResult<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(RedisError::ConnectionLost))
    }
}

impl<T> Future for CompletionFuture<T> {
    type Output = RedisResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped producer means the connection was torn down before the
        // result could be assigned.
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|recv| recv.unwrap_or(Err(RedisError::ConnectionLost)))
    }
}
