//! Cooperative shutdown signal shared by every task of a node.
//!
//! Uses the same mechanism as a closed broadcast channel: nothing is ever sent
//! on the channel, closing it wakes every waiter at once. The atomic flag lets
//! synchronous code check for shutdown without awaiting.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::error::{Error, Result};

/// Process-wide cancellation token.
///
/// Cloning is cheap; all clones observe the same signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    triggered: AtomicBool,
    tx: async_channel::Sender<()>,
    rx: async_channel::Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create a signal that has not fired yet.
    pub fn new() -> Self {
        let (tx, rx) = async_channel::bounded(1);
        Self {
            inner: Arc::new(ShutdownInner {
                triggered: AtomicBool::new(false),
                tx,
                rx,
            }),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        if !self.inner.triggered.swap(true, Ordering::AcqRel) {
            tracing::debug!("shutdown triggered");
        }
        self.inner.tx.close();
    }

    /// Check whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::Acquire)
    }

    /// Wait until the signal fires.
    pub async fn wait(&self) {
        if self.is_triggered() {
            return;
        }
        // Only ever resolves once the channel is closed.
        let _ = self.inner.rx.recv().await;
    }

    /// Sleep for `duration`, returning early with [`Error::Shutdown`] if the
    /// signal fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.wait() => Err(Error::Shutdown),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
