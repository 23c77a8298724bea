//! # Event-Loop Thread
//!
//! Purpose: Host the cooperative event loop on a dedicated thread with an
//! explicit start/stop/join lifecycle.
//!
//! The loop is a current-thread tokio runtime parked on a shutdown signal;
//! connections attach to it through cloned [`LoopHandle`]s.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use thiserror::Error;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Errors from the loop thread lifecycle.
#[derive(Debug, Error)]
pub enum LoopError {
    /// `stop()` was called after the loop had already been stopped.
    #[error("event loop thread is not running")]
    NotRunning,
    /// The loop thread or its runtime failed to start.
    #[error("failed to start event loop thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Cheap, cloneable handle for spawning futures onto the loop.
#[derive(Clone)]
pub struct LoopHandle {
    handle: Handle,
}

impl LoopHandle {
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}

/// A dedicated OS thread owning one cooperative event loop.
pub struct LoopThread {
    thread: Option<thread::JoinHandle<()>>,
    handle: LoopHandle,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    running: Arc<AtomicBool>,
}

impl LoopThread {
    /// Starts the loop thread and blocks briefly until its runtime is ready.
    pub fn spawn() -> Result<LoopThread, LoopError> {
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();

        let thread = thread::Builder::new()
            .name("lkv-loop".into())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        let _ = handle_tx.send(Err(err));
                        thread_running.store(false, Ordering::Release);
                        return;
                    }
                };
                if handle_tx.send(Ok(runtime.handle().clone())).is_err() {
                    thread_running.store(false, Ordering::Release);
                    return;
                }
                debug!("event loop running");
                // Parked here while spawned tasks run; resolves on stop().
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                thread_running.store(false, Ordering::Release);
                debug!("event loop stopped");
            })?;

        let handle = match handle_rx.recv() {
            Ok(Ok(handle)) => handle,
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(LoopError::Spawn(err));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(LoopError::Spawn(io::Error::other(
                    "event loop thread exited during startup",
                )));
            }
        };

        Ok(LoopThread {
            thread: Some(thread),
            handle: LoopHandle { handle },
            shutdown: Mutex::new(Some(shutdown_tx)),
            running,
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Asks the loop to exit. Exactly one caller succeeds; later calls get
    /// `NotRunning`.
    pub fn stop(&self) -> Result<(), LoopError> {
        let sender = self
            .shutdown
            .lock()
            .expect("shutdown slot poisoned")
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(LoopError::NotRunning),
        }
    }

    /// Waits for the loop thread to exit. Call `stop()` first.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LoopThread {
    fn drop(&mut self) {
        let _ = self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawn_runs_futures_on_the_loop() {
        let event_loop = LoopThread::spawn().expect("loop");
        assert!(event_loop.is_running());

        let (tx, rx) = std::sync::mpsc::channel();
        event_loop.handle().spawn(async move {
            let _ = tx.send(42);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);

        event_loop.stop().unwrap();
        event_loop.join();
    }

    #[test]
    fn second_stop_reports_not_running() {
        let event_loop = LoopThread::spawn().expect("loop");
        event_loop.stop().unwrap();
        assert!(matches!(event_loop.stop(), Err(LoopError::NotRunning)));
        event_loop.join();
    }
}
