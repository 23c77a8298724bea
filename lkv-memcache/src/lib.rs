//! # LoopKV Sync Memcache Client
//!
//! Purpose: Provide a compact, blocking memcached text-protocol client built
//! from a validated server-list configuration.
//!
//! ## Design Principles
//! 1. **Validate Before Use**: Malformed configuration is rejected before any
//!    socket is opened.
//! 2. **Simple Request/Response**: One connection, one command at a time; no
//!    pooling or pipelining.
//! 3. **Fail Fast**: Protocol violations surface immediately and invalidate
//!    the connection.

mod client;
mod config;
mod error;

pub use client::MemcacheSyncClient;
pub use config::MemcacheConfig;
pub use error::{MemcacheError, MemcacheResult};
