//! # Async Client API
//!
//! Purpose: Expose the non-blocking command surface over one event-loop-bound
//! connection: every call fires and returns a completion handle.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `RedisClient` hides the driver task, framing, and
//!    correlation details.
//! 2. **Fire and Return**: No call blocks the loop thread; results arrive
//!    through single-assignment handles.
//! 3. **Unrepresentable Misuse**: A client handle only exists once `connect`
//!    has resolved, so commands cannot be issued before the connection is up.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::conn::{ConnState, Directive, Driver, Shared};
use crate::error::{RedisError, RedisResult, SubscriptionError};
use crate::future::{CommandFuture, CompletionFuture, ConnectFuture, DisconnectFuture};
use crate::resp::encode_command;
use crate::runtime::LoopHandle;
use crate::subscription::{Subscription, SubscriptionHandler, SubscriptionInner};

/// One wire command: a verb plus positional arguments.
pub struct Command {
    args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(verb: impl AsRef<[u8]>) -> Self {
        Command {
            args: vec![verb.as_ref().to_vec()],
        }
    }

    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    /// Integer arguments travel as their decimal textual form.
    pub fn arg_int(self, value: i64) -> Self {
        self.arg(value.to_string())
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        let refs: Vec<&[u8]> = self.args.iter().map(|a| a.as_slice()).collect();
        encode_command(&refs, out);
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }
}

/// Handle to one event-loop-bound connection.
///
/// Cloning is cheap; all clones share the same underlying socket and pending
/// queue. The connection is torn down when `disconnect` resolves or every
/// clone is dropped.
#[derive(Clone)]
pub struct RedisClient {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Directive>,
    host: String,
    port: u16,
}

impl RedisClient {
    /// Initiates a non-blocking connection attempt on the given loop.
    ///
    /// Address resolution failures resolve the returned future immediately;
    /// otherwise it resolves when the loop reports connect success or
    /// failure.
    pub fn connect(loop_handle: &LoopHandle, host: impl Into<String>, port: u16) -> ConnectFuture {
        let host = host.into();
        let addrs: Vec<SocketAddr> = match (host.as_str(), port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(err) => return CompletionFuture::resolved(Err(RedisError::Io(err))),
        };
        if addrs.is_empty() {
            return CompletionFuture::resolved(Err(RedisError::Io(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no addresses resolved for {host}:{port}"),
            ))));
        }

        let (done, future) = CompletionFuture::pair();
        loop_handle.spawn(async move {
            let result = RedisClient::setup(addrs, host, port).await;
            let _ = done.send(result);
        });
        future
    }

    /// Loop thread: establishes the socket and spawns its driver task.
    async fn setup(addrs: Vec<SocketAddr>, host: String, port: u16) -> RedisResult<RedisClient> {
        let shared = Arc::new(Shared::new(ConnState::Connecting));
        let stream = TcpStream::connect(addrs.as_slice()).await?;
        stream.set_nodelay(true)?;
        debug!(%host, port, "connected");

        let (tx, rx) = mpsc::unbounded_channel();
        shared.set_state(ConnState::Connected);
        tokio::spawn(Driver::new(stream, rx, shared.clone()).run());
        Ok(RedisClient {
            shared,
            tx,
            host,
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ConnState {
        self.shared.state()
    }

    /// Requests asynchronous teardown of the connection.
    ///
    /// Commands still in flight resolve with `ConnectionLost`.
    pub fn disconnect(&self) -> DisconnectFuture {
        if self.shared.state() != ConnState::Connected {
            return CompletionFuture::resolved(Err(RedisError::NotConnected));
        }
        let (done, future) = CompletionFuture::pair();
        self.dispatch(Directive::Disconnect { done });
        future
    }

    /// Sends one command, returning its completion handle immediately.
    ///
    /// Completions are delivered in the order commands were sent.
    pub fn send(&self, command: Command) -> CommandFuture {
        let (done, future) = CompletionFuture::pair();
        if self.shared.state() != ConnState::Connected {
            let _ = done.send(Err(RedisError::NotConnected));
            return future;
        }
        self.dispatch(Directive::Command {
            payload: command.encode(),
            done,
        });
        future
    }

    /// Routes a directive to the driver, resolving it locally when the driver
    /// is already gone.
    fn dispatch(&self, directive: Directive) {
        if let Err(mpsc::error::SendError(directive)) = self.tx.send(directive) {
            match directive {
                Directive::Command { done, .. } => {
                    let _ = done.send(Err(RedisError::ConnectionLost));
                }
                Directive::Disconnect { done } => {
                    let _ = done.send(Err(RedisError::NotConnected));
                }
                Directive::Subscribe { sub, .. } => sub.finalize(),
                Directive::Unsubscribe { .. } => {}
            }
        }
    }

    // Single- and two-argument convenience commands, all built on `send`.

    pub fn get(&self, key: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("GET").arg(key))
    }

    pub fn set(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("SET").arg(key).arg(value))
    }

    pub fn del(&self, key: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("DEL").arg(key))
    }

    pub fn exists(&self, key: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("EXISTS").arg(key))
    }

    pub fn expire(&self, key: impl AsRef<[u8]>, seconds: i64) -> CommandFuture {
        self.send(Command::new("EXPIRE").arg(key).arg_int(seconds))
    }

    pub fn incr(&self, key: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("INCR").arg(key))
    }

    pub fn incr_by(&self, key: impl AsRef<[u8]>, delta: i64) -> CommandFuture {
        self.send(Command::new("INCRBY").arg(key).arg_int(delta))
    }

    pub fn decr(&self, key: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("DECR").arg(key))
    }

    pub fn decr_by(&self, key: impl AsRef<[u8]>, delta: i64) -> CommandFuture {
        self.send(Command::new("DECRBY").arg(key).arg_int(delta))
    }

    pub fn setnx(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("SETNX").arg(key).arg(value))
    }

    pub fn getset(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("GETSET").arg(key).arg(value))
    }

    pub fn strlen(&self, key: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("STRLEN").arg(key))
    }

    pub fn llen(&self, key: impl AsRef<[u8]>) -> CommandFuture {
        self.send(Command::new("LLEN").arg(key))
    }

    /// Sets multiple key/value pairs as one variadic command, in input order.
    pub fn mset<K, V>(&self, pairs: impl IntoIterator<Item = (K, V)>) -> CommandFuture
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut command = Command::new("MSET");
        for (key, value) in pairs {
            command = command.arg(key).arg(value);
        }
        self.send(command)
    }

    /// Fetches multiple keys as one variadic command, in input order.
    pub fn mget<K>(&self, keys: impl IntoIterator<Item = K>) -> CommandFuture
    where
        K: AsRef<[u8]>,
    {
        let mut command = Command::new("MGET");
        for key in keys {
            command = command.arg(key);
        }
        self.send(command)
    }

    /// Subscribes the handler to one channel's message stream.
    ///
    /// Fails with `AlreadySubscribed` while the connection hosts a live
    /// subscription; a stopped or torn-down one may be replaced.
    pub fn subscribe(
        &self,
        handler: Box<dyn SubscriptionHandler>,
        channel: impl Into<String>,
    ) -> RedisResult<Subscription> {
        if self.shared.state() != ConnState::Connected {
            return Err(RedisError::NotConnected);
        }
        let channel = channel.into();

        let mut slot = self
            .shared
            .subscription
            .lock()
            .expect("subscription slot poisoned");
        if let Some(existing) = slot.upgrade() {
            if existing.is_alive() {
                return Err(SubscriptionError::AlreadySubscribed.into());
            }
        }
        let sub = SubscriptionInner::create(handler, channel.clone(), self.tx.clone());
        *slot = Arc::downgrade(&sub);
        drop(slot);

        let payload = Command::new("SUBSCRIBE").arg(&channel).encode();
        self.dispatch(Directive::Subscribe {
            sub: sub.clone(),
            payload,
        });
        debug!(%channel, "subscribed");
        Ok(Subscription::new(sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_encodes_verb_and_args() {
        let mut out = Vec::new();
        Command::new("SET").arg("key").arg("value").encode_into(&mut out);
        assert_eq!(&out, b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n");
    }

    #[test]
    fn integer_args_use_decimal_text() {
        let mut out = Vec::new();
        Command::new("EXPIRE").arg("k").arg_int(-7).encode_into(&mut out);
        assert_eq!(&out, b"*3\r\n$6\r\nEXPIRE\r\n$1\r\nk\r\n$2\r\n-7\r\n");
    }
}
