//! # Connection Driver
//!
//! Purpose: Own the socket and run the per-connection event loop task that
//! turns readiness into parsed replies and routes them to waiting callers.
//!
//! ## Design Principles
//! 1. **Single Writer**: The socket is owned by one task on the loop thread;
//!    callers reach it only through the directive channel.
//! 2. **Typed Correlation**: Each sent command queues a pending entry carrying
//!    its completion sender; FIFO reply order pairs them back up.
//! 3. **No Hung Futures**: Teardown resolves every outstanding pending command
//!    with a connection-lost error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{RedisError, RedisResult};
use crate::reply::Reply;
use crate::resp::RespParser;
use crate::subscription::SubscriptionInner;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Unconnected,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// Requests routed from caller threads to the driver task.
pub(crate) enum Directive {
    Command {
        payload: Vec<u8>,
        done: oneshot::Sender<RedisResult<Reply>>,
    },
    Subscribe {
        sub: Arc<SubscriptionInner>,
        payload: Vec<u8>,
    },
    Unsubscribe {
        payload: Vec<u8>,
    },
    Disconnect {
        done: oneshot::Sender<RedisResult<()>>,
    },
}

/// State visible to caller threads, shared with the driver.
pub(crate) struct Shared {
    state: Mutex<ConnState>,
    /// Weak slot so the subscription's liveness is owned by callers, not by
    /// the connection.
    pub(crate) subscription: Mutex<Weak<SubscriptionInner>>,
}

impl Shared {
    pub(crate) fn new(state: ConnState) -> Self {
        Shared {
            state: Mutex::new(state),
            subscription: Mutex::new(Weak::new()),
        }
    }

    pub(crate) fn state(&self) -> ConnState {
        *self.state.lock().expect("connection state poisoned")
    }

    pub(crate) fn set_state(&self, next: ConnState) {
        *self.state.lock().expect("connection state poisoned") = next;
    }
}

/// One command awaiting its reply, in send order.
struct PendingCommand {
    done: oneshot::Sender<RedisResult<Reply>>,
}

enum PubSubEvent {
    Started,
    Message,
    Stopped,
}

/// Routing decision for one parsed reply.
enum Route {
    /// Not a push for any known channel; pairs with the oldest pending
    /// command.
    Pending,
    /// Subscribe confirmation for the installed subscription.
    Started,
    /// Channel message for the installed subscription.
    Deliver,
    /// Unsubscribe confirmation for the installed subscription.
    FinalizeInstalled,
    /// Unsubscribe confirmation for a displaced subscription, by index.
    FinalizeParting(usize),
    /// Push for a channel that is already stopping; dropped.
    Discard,
}

/// The per-connection driver task.
pub(crate) struct Driver {
    read: OwnedReadHalf,
    write: OwnedWriteHalf,
    rx: mpsc::UnboundedReceiver<Directive>,
    shared: Arc<Shared>,
    buf: BytesMut,
    parser: RespParser,
    pending: VecDeque<PendingCommand>,
    subscription: Option<Arc<SubscriptionInner>>,
    /// Stopped subscriptions displaced by a replacement while their
    /// unsubscribe confirmation is still in flight.
    parting: Vec<Arc<SubscriptionInner>>,
    disconnect_done: Option<oneshot::Sender<RedisResult<()>>>,
}

impl Driver {
    pub(crate) fn new(
        stream: TcpStream,
        rx: mpsc::UnboundedReceiver<Directive>,
        shared: Arc<Shared>,
    ) -> Self {
        let (read, write) = stream.into_split();
        Driver {
            read,
            write,
            rx,
            shared,
            buf: BytesMut::with_capacity(8 * 1024),
            parser: RespParser::new(),
            pending: VecDeque::new(),
            subscription: None,
            parting: Vec::new(),
            disconnect_done: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let reason = self.drive().await;
        match &reason {
            Ok(()) => debug!("connection closing"),
            Err(err) => warn!(error = %err, "connection failed"),
        }
        self.teardown().await;
    }

    /// Runs until an orderly disconnect (`Ok`) or a fatal failure (`Err`).
    async fn drive(&mut self) -> RedisResult<()> {
        loop {
            tokio::select! {
                directive = self.rx.recv() => match directive {
                    Some(Directive::Command { payload, done }) => {
                        self.pending.push_back(PendingCommand { done });
                        self.write.write_all(&payload).await?;
                    }
                    Some(Directive::Subscribe { sub, payload }) => {
                        // A displaced predecessor is always stopping; it is
                        // finalized when its unsubscribe confirmation lands.
                        if let Some(old) = self.subscription.replace(sub) {
                            self.parting.push(old);
                        }
                        self.write.write_all(&payload).await?;
                    }
                    Some(Directive::Unsubscribe { payload }) => {
                        self.write.write_all(&payload).await?;
                    }
                    Some(Directive::Disconnect { done }) => {
                        self.shared.set_state(ConnState::Disconnecting);
                        self.disconnect_done = Some(done);
                        return Ok(());
                    }
                    // Every client handle was dropped.
                    None => return Ok(()),
                },
                read = self.read.read_buf(&mut self.buf) => match read {
                    Ok(0) => return Err(RedisError::ConnectionLost),
                    Ok(_) => self.drain_replies()?,
                    Err(err) => return Err(RedisError::Io(err)),
                },
            }
        }
    }

    fn drain_replies(&mut self) -> RedisResult<()> {
        while let Some(reply) = self.parser.parse(&mut self.buf)? {
            self.route(reply)?;
        }
        Ok(())
    }

    /// Pairs one parsed reply with its consumer: the subscription whose
    /// channel the push names, otherwise the oldest pending command.
    fn route(&mut self, reply: Reply) -> RedisResult<()> {
        match self.classify(&reply) {
            Route::Started => {
                if let Some(sub) = self.subscription.as_ref() {
                    sub.fire_started();
                }
                Ok(())
            }
            Route::Deliver => {
                if let Some(sub) = self.subscription.as_ref() {
                    sub.dispatch_message(reply);
                }
                Ok(())
            }
            Route::FinalizeInstalled => {
                if let Some(sub) = self.subscription.take() {
                    sub.finalize();
                }
                Ok(())
            }
            Route::FinalizeParting(idx) => {
                self.parting.remove(idx).finalize();
                Ok(())
            }
            Route::Discard => Ok(()),
            Route::Pending => match self.pending.pop_front() {
                Some(cmd) => {
                    // The caller may have discarded its future.
                    let _ = cmd.done.send(Ok(reply));
                    Ok(())
                }
                None => Err(RedisError::Protocol(
                    "reply arrived with no command in flight".into(),
                )),
            },
        }
    }

    /// Decides where a reply goes. Pushes are matched by channel; a push for
    /// an unknown channel is treated as an ordinary reply.
    fn classify(&self, reply: &Reply) -> Route {
        let (event, channel) = match pubsub_event(reply) {
            Some(push) => push,
            None => return Route::Pending,
        };
        let installed = self
            .subscription
            .as_ref()
            .is_some_and(|sub| sub.channel().as_bytes() == channel);
        let parting = self
            .parting
            .iter()
            .position(|sub| sub.channel().as_bytes() == channel);
        match event {
            // A displaced predecessor may share the installed channel, and
            // its confirmation always arrives first.
            PubSubEvent::Stopped => match parting {
                Some(idx) => Route::FinalizeParting(idx),
                None if installed => Route::FinalizeInstalled,
                None => Route::Pending,
            },
            PubSubEvent::Started if installed => Route::Started,
            PubSubEvent::Message if installed => Route::Deliver,
            // Stray pushes for a channel that is stopping are dropped.
            _ if parting.is_some() => Route::Discard,
            _ => Route::Pending,
        }
    }

    /// Final transition to `Disconnected`: resolves everything still waiting.
    async fn teardown(mut self) {
        self.rx.close();
        // Directives that raced the teardown still resolve.
        while let Ok(directive) = self.rx.try_recv() {
            match directive {
                Directive::Command { done, .. } => {
                    let _ = done.send(Err(RedisError::ConnectionLost));
                }
                Directive::Disconnect { done } => {
                    let _ = done.send(Ok(()));
                }
                Directive::Subscribe { sub, .. } => sub.finalize(),
                Directive::Unsubscribe { .. } => {}
            }
        }
        for cmd in self.pending.drain(..) {
            let _ = cmd.done.send(Err(RedisError::ConnectionLost));
        }
        if let Some(sub) = self.subscription.take() {
            sub.finalize();
        }
        for sub in self.parting.drain(..) {
            sub.finalize();
        }
        self.shared.set_state(ConnState::Disconnected);
        if let Some(done) = self.disconnect_done.take() {
            let _ = done.send(Ok(()));
        }
        let _ = self.write.shutdown().await;
    }
}

/// Classifies a reply as a pub/sub push if it has the push shape:
/// `[verb, channel, ..]` with a known verb. Returns the event and channel.
fn pubsub_event(reply: &Reply) -> Option<(PubSubEvent, &[u8])> {
    let items = match reply {
        Reply::Array(items) => items,
        _ => return None,
    };
    let verb = match items.first() {
        Some(Reply::Bulk(verb)) => verb,
        _ => return None,
    };
    let channel = match items.get(1) {
        Some(Reply::Bulk(channel)) => channel.as_slice(),
        _ => return None,
    };
    match verb.as_slice() {
        b"subscribe" => Some((PubSubEvent::Started, channel)),
        b"message" => Some((PubSubEvent::Message, channel)),
        b"unsubscribe" => Some((PubSubEvent::Stopped, channel)),
        _ => None,
    }
}
