//! # LoopKV Async Redis Client
//!
//! Purpose: Provide a non-blocking Redis client driven by a single
//! cooperative event loop, turning raw socket readiness into typed,
//! asynchronously-resolved command results, with one pub/sub channel
//! multiplexed over the same connection.
//!
//! ## Design Principles
//! 1. **One Loop, One Socket**: All readiness, parsing, and callback dispatch
//!    for a connection happen on its loop thread, strictly serialized.
//! 2. **Completion Handles**: Every command resolves through a
//!    single-assignment future; callers never block the loop.
//! 3. **FIFO Correlation**: Replies pair with commands in send order via
//!    typed pending contexts, never raw pointers.
//! 4. **No Hung Futures**: Teardown resolves every in-flight command with a
//!    connection-lost error.

mod client;
mod conn;
mod error;
mod future;
mod reply;
mod resp;
mod runtime;
mod subscription;

pub use client::{Command, RedisClient};
pub use conn::ConnState;
pub use error::{RedisError, RedisResult, SubscriptionError};
pub use future::{CommandFuture, CompletionFuture, ConnectFuture, DisconnectFuture};
pub use reply::{Kind, Reply};
pub use runtime::{LoopError, LoopHandle, LoopThread};
pub use subscription::{Subscription, SubscriptionHandle, SubscriptionHandler};
