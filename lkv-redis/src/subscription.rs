//! # Subscription Manager
//!
//! Purpose: Manage the single active pub/sub channel layered on an
//! established connection, including its two-sided stop protocol.
//!
//! ## Design Principles
//! 1. **Exclusive Handler Ownership**: The caller-supplied handler is owned by
//!    the subscription and invoked only from the loop thread.
//! 2. **CAS Stop Protocol**: Exactly one of any number of racing `stop()`
//!    calls wins the `Active -> Stopping` transition.
//! 3. **Weak Back-References**: The handler's route back to its subscription
//!    never contributes to liveness.
//!
//! Lifecycle: `Active -> Stopping -> Stopped`. Once stopping is set, further
//! message dispatches are dropped silently. The handler is released (and
//! `on_stopped` fired) when the unsubscribe confirmation arrives, or when the
//! connection is torn down, whichever comes first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::client::Command;
use crate::conn::Directive;
use crate::error::{RedisError, RedisResult, SubscriptionError};
use crate::reply::Reply;

/// Caller-supplied receiver for pub/sub events.
///
/// All methods run on the loop thread. `on_message` receives the full push
/// reply: an array of `["message", channel, payload]`.
pub trait SubscriptionHandler: Send + 'static {
    /// Called once at attach time with a weak handle back to the owning
    /// subscription, so the handler can request a stop from inside
    /// `on_message`. The default discards it.
    fn attach(&mut self, handle: SubscriptionHandle) {
        let _ = handle;
    }

    /// The server confirmed the channel subscription.
    fn on_started(&mut self);

    /// One message was pushed on the subscribed channel.
    fn on_message(&mut self, message: Reply);

    /// The subscription ended: stop completed or the connection was lost.
    fn on_stopped(&mut self);
}

pub(crate) struct SubscriptionInner {
    channel: String,
    stopping: AtomicBool,
    started: AtomicBool,
    /// Tracks handler presence without taking the handler lock, so `stop()`
    /// stays safe to call re-entrantly from inside `on_message`.
    attached: AtomicBool,
    handler: Mutex<Option<Box<dyn SubscriptionHandler>>>,
    directives: mpsc::UnboundedSender<Directive>,
}

impl SubscriptionInner {
    pub(crate) fn create(
        mut handler: Box<dyn SubscriptionHandler>,
        channel: String,
        directives: mpsc::UnboundedSender<Directive>,
    ) -> Arc<Self> {
        let inner = Arc::new(SubscriptionInner {
            channel,
            stopping: AtomicBool::new(false),
            started: AtomicBool::new(false),
            attached: AtomicBool::new(true),
            handler: Mutex::new(None),
            directives,
        });
        handler.attach(SubscriptionHandle {
            inner: Arc::downgrade(&inner),
        });
        *inner.handler.lock().expect("handler slot poisoned") = Some(handler);
        inner
    }

    pub(crate) fn channel(&self) -> &str {
        &self.channel
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.attached.load(Ordering::Acquire) && !self.stopping.load(Ordering::Acquire)
    }

    /// Requests the `Active -> Stopping` transition.
    pub(crate) fn stop(&self) -> RedisResult<()> {
        if !self.attached.load(Ordering::Acquire) {
            return Err(SubscriptionError::NotActive.into());
        }
        if self
            .stopping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SubscriptionError::AlreadyStopping.into());
        }
        debug!(channel = %self.channel, "subscription stopping");
        let mut payload = Vec::new();
        Command::new("UNSUBSCRIBE")
            .arg(&self.channel)
            .encode_into(&mut payload);
        // The connection may already be gone; its teardown finalizes us.
        let _ = self.directives.send(Directive::Unsubscribe { payload });
        Ok(())
    }

    /// Loop thread only: the server confirmed the subscription.
    pub(crate) fn fire_started(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut guard = self.handler.lock().expect("handler slot poisoned");
        if let Some(handler) = guard.as_mut() {
            handler.on_started();
        }
    }

    /// Loop thread only: one channel message arrived.
    pub(crate) fn dispatch_message(&self, message: Reply) {
        if self.stopping.load(Ordering::Relaxed) {
            // Messages arriving after a stop request are dropped, not queued.
            return;
        }
        let mut guard = self.handler.lock().expect("handler slot poisoned");
        if let Some(handler) = guard.as_mut() {
            handler.on_message(message);
        }
    }

    /// Releases the handler and fires `on_stopped` exactly once.
    pub(crate) fn finalize(&self) {
        let handler = self
            .handler
            .lock()
            .expect("handler slot poisoned")
            .take();
        if let Some(mut handler) = handler {
            self.attached.store(false, Ordering::Release);
            handler.on_stopped();
        }
    }
}

/// A standing, cancelable registration for one channel's message stream.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub(crate) fn new(inner: Arc<SubscriptionInner>) -> Self {
        Subscription { inner }
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// True while the handler is attached and no stop has been requested.
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    /// Requests teardown of the subscription.
    ///
    /// Exactly one of any number of concurrent callers succeeds; the rest
    /// observe `AlreadyStopping`. Calling after the handler has been released
    /// fails with `NotActive`.
    pub fn stop(&self) -> RedisResult<()> {
        self.inner.stop()
    }
}

/// Weak, non-owning route from a handler back to its subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Weak<SubscriptionInner>,
}

impl SubscriptionHandle {
    /// Same contract as [`Subscription::stop`]; a dead subscription reports
    /// `NotActive`.
    pub fn stop(&self) -> RedisResult<()> {
        match self.inner.upgrade() {
            Some(inner) => inner.stop(),
            None => Err(RedisError::Subscription(SubscriptionError::NotActive)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.upgrade().map(|i| i.is_alive()).unwrap_or(false)
    }
}
