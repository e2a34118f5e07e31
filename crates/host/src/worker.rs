//! Cancellable worker threads
//!
//! Every stream runs on its own named OS thread so blocking bulk transfers
//! never touch the caller's thread or the async runtime. Cancellation is
//! cooperative: loops check their [`CancelToken`] between transfers, and a
//! transfer never blocks longer than the poll timeout.

use common::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// How often teardown checks whether a worker has exited
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A running worker thread with its cancellation token
pub struct Worker {
    name: String,
    token: CancelToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Spawn `body` on a new thread named `name`
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let token = CancelToken::new();
        let thread_token = token.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_token))
            .map_err(Error::Io)?;

        debug!("Started worker {}", name);
        Ok(Self {
            name: name.to_string(),
            token,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Whether the calling thread is this worker
    pub fn is_current(&self) -> bool {
        self.handle.thread().id() == thread::current().id()
    }

    /// Cancel and wait until `deadline` for the thread to exit
    ///
    /// Returns true once the worker acknowledged. Called from the worker's
    /// own thread (a failure callback tearing down its session) it returns
    /// immediately; the thread exits on its own when the callback returns.
    pub fn join_until(self, deadline: Instant) -> bool {
        self.cancel();

        if self.is_current() {
            debug!("Worker {} is tearing itself down, not joining", self.name);
            return false;
        }

        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Worker {} did not stop within the teardown window, detaching",
                    self.name
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        if self.handle.join().is_err() {
            error!("Worker {} panicked", self.name);
        } else {
            debug!("Worker {} stopped", self.name);
        }
        true
    }
}
