//! Bounded concurrency for the two task categories the dispatcher hands
//! out: handshakes ("connect" work) and steady-state read/write loops
//! ("io" work), plus the wakeup signal used to unwind every in-flight
//! task on shutdown.
//!
//! The original dispatcher drew task arguments from a fixed-size memory
//! pool and ran handlers on two `pthread` pools sized at startup; a
//! descriptor that couldn't get a free slot or a free thread failed
//! closed. Tokio's reactor is already an edge-triggered, one-shot epoll/
//! kqueue/poll multiplexer underneath, so this crate doesn't layer a
//! second one on top of it — it reproduces the same bounded-concurrency,
//! fail-closed contract with `Semaphore` permits instead of OS threads
//! and a fixed thread-argument pool. See DESIGN.md's Open Questions for
//! the full rationale.

use crate::config::PoolConfig;
use crate::error::Error;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};

/// One permit per in-flight task of a given category. `try_acquire_owned`
/// is the async analogue of the original's pool-exhaustion check: when no
/// permit is free the caller must fail the connection closed rather than
/// queue unboundedly.
pub struct WorkerPool {
    connect: Arc<Semaphore>,
    io: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            connect: Arc::new(Semaphore::new(config.connect_workers)),
            io: Arc::new(Semaphore::new(config.io_workers)),
        }
    }

    /// Acquires a connect-pool permit, failing closed (instead of queuing)
    /// when the pool is exhausted — equivalent to `WSS_MEMORY_ERROR` on a
    /// depleted `thread_args_pool`.
    pub fn try_acquire_connect(&self) -> Result<tokio::sync::OwnedSemaphorePermit, Error> {
        self.connect.clone().try_acquire_owned().map_err(|_| Error::PoolExhausted)
    }

    pub fn try_acquire_io(&self) -> Result<tokio::sync::OwnedSemaphorePermit, Error> {
        self.io.clone().try_acquire_owned().map_err(|_| Error::PoolExhausted)
    }
}

/// The self-pipe wakeup, reimagined as a broadcast channel: every
/// in-flight connection task holds a receiver and observes it at each
/// `tokio::select!` suspension point, so a shutdown signal interrupts a
/// blocked read or write exactly like writing to the original's wakeup
/// fd would.
#[derive(Clone)]
pub struct Shutdown {
    sender: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Shutdown { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn trigger(&self) {
        let _ = self.sender.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
